use ndarray::{Array1, Array2, ArrayD, ArrayViewD, ArrayViewMutD, Axis, Ix2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::initialization::WeightInit;
use super::traits::Layer;
use crate::activations::Activation;
use crate::error::{DqnError, Result};

/// A fully connected (dense) layer in a neural network
#[derive(Serialize, Deserialize, Clone)]
pub struct DenseLayer {
    pub weights: Array2<f32>,
    pub biases: Array1<f32>,
    pub activation: Activation,
    #[serde(skip)]
    pre_activation_output: Option<Array2<f32>>,
    #[serde(skip)]
    inputs: Option<Array2<f32>>,
    #[serde(skip)]
    weight_gradients: Option<Array2<f32>>,
    #[serde(skip)]
    bias_gradients: Option<Array1<f32>>,
}

impl DenseLayer {
    /// Create a new dense layer with weights drawn for `activation` and zero biases.
    pub fn new<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        let init = WeightInit::for_activation(&activation);
        let weights = init
            .initialize(&[input_size, output_size], input_size, output_size, rng)?
            .into_dimensionality::<Ix2>()?;
        Self::from_parts(weights, Array1::zeros(output_size), activation)
    }

    /// Create a layer from explicit weights `[input, output]` and biases `[output]`.
    pub fn from_parts(weights: Array2<f32>, biases: Array1<f32>, activation: Activation) -> Result<Self> {
        if weights.ncols() != biases.len() {
            return Err(DqnError::dimension_mismatch(
                format!("{} biases", weights.ncols()),
                format!("{}", biases.len()),
            ));
        }
        Ok(DenseLayer {
            weights,
            biases,
            activation,
            pre_activation_output: None,
            inputs: None,
            weight_gradients: None,
            bias_gradients: None,
        })
    }

    pub fn input_size(&self) -> usize {
        self.weights.nrows()
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    fn as_matrix(&self, inputs: ArrayViewD<f32>) -> Result<Array2<f32>> {
        let inputs = inputs.into_dimensionality::<Ix2>().map_err(|_| {
            DqnError::dimension_mismatch("[batch, features]".to_string(), "tensor of another rank".to_string())
        })?;
        if inputs.ncols() != self.input_size() {
            return Err(DqnError::dimension_mismatch(
                format!("{} input features", self.input_size()),
                format!("{}", inputs.ncols()),
            ));
        }
        Ok(inputs.to_owned())
    }
}

impl Layer for DenseLayer {
    fn forward_batch(&mut self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let inputs = self.as_matrix(inputs)?;
        let mut outputs = inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0));
        self.pre_activation_output = Some(outputs.clone());
        self.inputs = Some(inputs);
        self.activation.apply(&mut outputs);
        Ok(outputs.into_dyn())
    }

    fn infer_batch(&self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let inputs = self.as_matrix(inputs)?;
        let mut outputs = inputs.dot(&self.weights) + &self.biases.view().insert_axis(Axis(0));
        self.activation.apply(&mut outputs);
        Ok(outputs.into_dyn())
    }

    fn backward_batch(&mut self, output_gradient: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let (pre_activation_output, inputs) = match (&self.pre_activation_output, &self.inputs) {
            (Some(pre), Some(inputs)) => (pre, inputs),
            _ => {
                return Err(DqnError::Numerical(
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        let output_gradient = output_gradient.into_dimensionality::<Ix2>()?;

        let activation_deriv = self.activation.derivative(pre_activation_output.view());
        let adjusted_error = &output_gradient * &activation_deriv;
        let input_gradient = adjusted_error.dot(&self.weights.t());

        self.weight_gradients = Some(inputs.t().dot(&adjusted_error));
        self.bias_gradients = Some(adjusted_error.sum_axis(Axis(0)));

        Ok(input_gradient.into_dyn())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        if input_shape != [self.input_size()] {
            return Err(DqnError::dimension_mismatch(
                format!("[{}]", self.input_size()),
                format!("{:?}", input_shape),
            ));
        }
        Ok(vec![self.output_size()])
    }

    fn parameters(&self) -> Vec<ArrayD<f32>> {
        vec![self.weights.clone().into_dyn(), self.biases.clone().into_dyn()]
    }

    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![self.weights.view_mut().into_dyn(), self.biases.view_mut().into_dyn()]
    }

    fn gradients(&self) -> Vec<ArrayD<f32>> {
        match (&self.weight_gradients, &self.bias_gradients) {
            (Some(w), Some(b)) => vec![w.clone().into_dyn(), b.clone().into_dyn()],
            _ => Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}
