use ndarray::{ArrayD, IxDyn};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;

use crate::activations::Activation;
use crate::error::{DqnError, Result};

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// Xavier/Glorot normal initialization
    XavierNormal,

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,
}

impl WeightInit {
    /// Draw a tensor of the given shape.
    ///
    /// `fan_in`/`fan_out` are the receptive field sizes: input and output
    /// units for dense layers, `channels * kernel area` for convolutions.
    pub fn initialize<R: Rng + ?Sized>(
        &self,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<ArrayD<f32>> {
        let shape = IxDyn(shape);
        let tensor = match self {
            WeightInit::XavierNormal => {
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                ArrayD::random_using(shape, normal(std)?, rng)
            }
            WeightInit::HeNormal => {
                let std = (2.0 / fan_in as f32).sqrt();
                ArrayD::random_using(shape, normal(std)?, rng)
            }
        };
        Ok(tensor)
    }

    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        if activation.is_relu_family() {
            WeightInit::HeNormal
        } else {
            WeightInit::XavierNormal
        }
    }
}

fn normal(std: f32) -> Result<Normal<f32>> {
    Normal::new(0.0, std).map_err(|e| DqnError::Numerical(format!("invalid init std {}: {}", std, e)))
}
