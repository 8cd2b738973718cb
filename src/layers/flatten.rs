use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD, IxDyn};
use serde::{Deserialize, Serialize};

use super::traits::Layer;
use crate::error::{DqnError, Result};

/// Collapses every non-batch axis into one feature axis.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct FlattenLayer {
    #[serde(skip)]
    cached_input_shape: Option<Vec<usize>>,
}

impl FlattenLayer {
    pub fn new() -> Self {
        Self::default()
    }

    fn flatten(inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let batch = *inputs.shape().first().ok_or_else(|| {
            DqnError::dimension_mismatch("a batch axis".to_string(), "scalar".to_string())
        })?;
        let features = inputs.len() / batch.max(1);
        Ok(inputs
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(&[batch, features]))?)
    }
}

impl Layer for FlattenLayer {
    fn forward_batch(&mut self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        self.cached_input_shape = Some(inputs.shape().to_vec());
        Self::flatten(inputs)
    }

    fn infer_batch(&self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        Self::flatten(inputs)
    }

    fn backward_batch(&mut self, output_gradient: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let shape = self.cached_input_shape.as_ref().ok_or_else(|| {
            DqnError::Numerical("forward_batch() must be called before backward_batch()".to_string())
        })?;
        Ok(output_gradient
            .as_standard_layout()
            .into_owned()
            .into_shape(IxDyn(shape))?)
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        Ok(vec![input_shape.iter().product()])
    }

    fn parameters(&self) -> Vec<ArrayD<f32>> {
        Vec::new()
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        Vec::new()
    }

    fn gradients(&self) -> Vec<ArrayD<f32>> {
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "flatten"
    }
}
