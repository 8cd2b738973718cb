//! Max pooling for downsampling spatial feature maps.

use ndarray::{Array4, ArrayD, ArrayViewD, ArrayViewMutD, Ix4};
use serde::{Deserialize, Serialize};

use super::traits::Layer;
use crate::error::{DqnError, Result};

/// 2D Max Pooling Layer
///
/// Non-overlapping windows (stride equals the pool size) without padding;
/// trailing rows and columns that do not fill a window are dropped.
#[derive(Serialize, Deserialize, Clone)]
pub struct MaxPool2DLayer {
    /// Pooling window size
    pub pool_size: (usize, usize),

    /// Cached arg-max positions for backward pass
    #[serde(skip)]
    cached_indices: Option<Array4<(usize, usize)>>,

    /// Cached input shape for backward pass
    #[serde(skip)]
    cached_input_shape: Option<(usize, usize, usize, usize)>,
}

impl MaxPool2DLayer {
    pub fn new(pool_size: (usize, usize)) -> Result<Self> {
        if pool_size.0 == 0 || pool_size.1 == 0 {
            return Err(DqnError::invalid_parameter(
                "pool_size".to_string(),
                format!("{:?} must be positive", pool_size),
            ));
        }
        Ok(MaxPool2DLayer {
            pool_size,
            cached_indices: None,
            cached_input_shape: None,
        })
    }

    fn pooled_size(&self, height: usize, width: usize) -> Result<(usize, usize)> {
        if height < self.pool_size.0 || width < self.pool_size.1 {
            return Err(DqnError::invalid_parameter(
                "pool_size".to_string(),
                format!("{:?} larger than feature map {}x{}", self.pool_size, height, width),
            ));
        }
        Ok((height / self.pool_size.0, width / self.pool_size.1))
    }

    fn compute(&self, inputs: ArrayViewD<f32>) -> Result<(Array4<f32>, Array4<(usize, usize)>)> {
        let input = inputs.into_dimensionality::<Ix4>().map_err(|_| {
            DqnError::dimension_mismatch(
                "[batch, channels, height, width]".to_string(),
                "tensor of another rank".to_string(),
            )
        })?;
        let (batch_size, channels, in_height, in_width) = input.dim();
        let (out_height, out_width) = self.pooled_size(in_height, in_width)?;

        let mut output = Array4::zeros((batch_size, channels, out_height, out_width));
        let mut indices = Array4::from_elem((batch_size, channels, out_height, out_width), (0, 0));

        for b in 0..batch_size {
            for c in 0..channels {
                for oh in 0..out_height {
                    for ow in 0..out_width {
                        let h_start = oh * self.pool_size.0;
                        let w_start = ow * self.pool_size.1;

                        // first maximum wins
                        let mut max_val = f32::NEG_INFINITY;
                        let mut max_pos = (h_start, w_start);
                        for h in h_start..h_start + self.pool_size.0 {
                            for w in w_start..w_start + self.pool_size.1 {
                                let val = input[[b, c, h, w]];
                                if val > max_val {
                                    max_val = val;
                                    max_pos = (h, w);
                                }
                            }
                        }

                        output[[b, c, oh, ow]] = max_val;
                        indices[[b, c, oh, ow]] = max_pos;
                    }
                }
            }
        }

        Ok((output, indices))
    }
}

impl Layer for MaxPool2DLayer {
    fn forward_batch(&mut self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let shape = inputs.shape().to_vec();
        let (output, indices) = self.compute(inputs)?;
        self.cached_input_shape = Some((shape[0], shape[1], shape[2], shape[3]));
        self.cached_indices = Some(indices);
        Ok(output.into_dyn())
    }

    fn infer_batch(&self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        Ok(self.compute(inputs)?.0.into_dyn())
    }

    fn backward_batch(&mut self, output_gradient: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let (indices, input_shape) = match (&self.cached_indices, self.cached_input_shape) {
            (Some(indices), Some(shape)) => (indices, shape),
            _ => {
                return Err(DqnError::Numerical(
                    "forward_batch() must be called before backward_batch()".to_string(),
                ))
            }
        };
        let output_gradient = output_gradient.into_dimensionality::<Ix4>()?;

        // Route each gradient to the cell that produced the maximum
        let mut input_gradient = Array4::zeros(input_shape);
        for ((b, c, oh, ow), &(h, w)) in indices.indexed_iter() {
            input_gradient[[b, c, h, w]] += output_gradient[[b, c, oh, ow]];
        }

        Ok(input_gradient.into_dyn())
    }

    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>> {
        match input_shape {
            [channels, height, width] => {
                let (out_h, out_w) = self.pooled_size(*height, *width)?;
                Ok(vec![*channels, out_h, out_w])
            }
            _ => Err(DqnError::dimension_mismatch(
                "[channels, height, width]".to_string(),
                format!("{:?}", input_shape),
            )),
        }
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
        "max_pool2d"
    }
}
