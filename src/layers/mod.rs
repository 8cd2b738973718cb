pub mod conv;
pub mod dense;
pub mod flatten;
pub mod initialization;
pub mod pooling;
pub mod traits;

use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use conv::{Conv2DLayer, Padding};
pub use dense::DenseLayer;
pub use flatten::FlattenLayer;
pub use initialization::WeightInit;
pub use pooling::MaxPool2DLayer;
pub use traits::Layer as LayerTrait;

/// Closed set of layers a [`QNetwork`](crate::network::QNetwork) is built from.
#[derive(Serialize, Deserialize, Clone)]
pub enum NetworkLayer {
    Conv2D(Conv2DLayer),
    MaxPool2D(MaxPool2DLayer),
    Flatten(FlattenLayer),
    Dense(DenseLayer),
}

impl NetworkLayer {
    fn inner(&self) -> &dyn LayerTrait {
        match self {
            NetworkLayer::Conv2D(layer) => layer,
            NetworkLayer::MaxPool2D(layer) => layer,
            NetworkLayer::Flatten(layer) => layer,
            NetworkLayer::Dense(layer) => layer,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn LayerTrait {
        match self {
            NetworkLayer::Conv2D(layer) => layer,
            NetworkLayer::MaxPool2D(layer) => layer,
            NetworkLayer::Flatten(layer) => layer,
            NetworkLayer::Dense(layer) => layer,
        }
    }
}

impl LayerTrait for NetworkLayer {
    fn forward_batch(&mut self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        self.inner_mut().forward_batch(inputs)
    }

    fn infer_batch(&self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        self.inner().infer_batch(inputs)
    }

    fn backward_batch(&mut self, output_gradient: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        self.inner_mut().backward_batch(output_gradient)
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        self.inner().output_shape(input_shape)
    }

    fn parameters(&self) -> Vec<ArrayD<f32>> {
        self.inner().parameters()
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        self.inner_mut().parameters_mut()
    }

    fn gradients(&self) -> Vec<ArrayD<f32>> {
        self.inner().gradients()
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }
}
