use ndarray::{ArrayD, ArrayViewD, ArrayViewMutD};

use crate::error::Result;

/// Trait defining the interface for Q-network layers.
///
/// All tensors carry the batch on axis 0. Spatial tensors are laid out as
/// `[batch, channels, height, width]`.
pub trait Layer: Send + Sync {
    /// Forward pass for a batch, caching what [`Layer::backward_batch`] needs
    fn forward_batch(&mut self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>>;

    /// Forward pass for a batch without touching the backward caches
    fn infer_batch(&self, inputs: ArrayViewD<f32>) -> Result<ArrayD<f32>>;

    /// Backward pass for the batch seen by the last `forward_batch`.
    ///
    /// Stores the parameter gradients and returns the gradient with respect
    /// to the layer inputs.
    fn backward_batch(&mut self, output_gradient: ArrayViewD<f32>) -> Result<ArrayD<f32>>;

    /// Per-sample output shape for a per-sample input shape
    fn output_shape(&self, input_shape: &[usize]) -> Result<Vec<usize>>;

    /// Copies of the trainable tensors, kernel first then bias
    fn parameters(&self) -> Vec<ArrayD<f32>>;

    /// Mutable views of the trainable tensors, in [`Layer::parameters`] order
    fn parameters_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>>;

    /// Gradients computed by the last backward pass, in [`Layer::parameters`] order
    fn gradients(&self) -> Vec<ArrayD<f32>>;

    fn name(&self) -> &'static str;

    /// Total number of trainable scalars
    fn parameter_count(&self) -> usize {
        self.parameters().iter().map(|p| p.len()).sum()
    }
}
