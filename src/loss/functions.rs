use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Trait defining the interface for regression losses between predicted
/// Q-values and TD targets, one scalar per batch row.
pub trait Loss: Send + Sync {
    /// Mean loss over the batch
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32;

    /// Gradient of the mean loss with respect to each prediction
    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32>;
}

/// Mean Squared Error loss
#[derive(Debug, Clone, Copy, Default)]
pub struct MSE;

impl Loss for MSE {
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32 {
        let diff = &predictions - &targets;
        (&diff * &diff).sum() / predictions.len().max(1) as f32
    }

    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32> {
        (&predictions - &targets) * (2.0 / predictions.len().max(1) as f32)
    }
}

/// Huber loss (smooth L1): quadratic inside `delta`, linear outside.
#[derive(Debug, Clone, Copy)]
pub struct HuberLoss {
    pub delta: f32,
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }
}

impl Default for HuberLoss {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Loss for HuberLoss {
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32 {
        let diff = &predictions - &targets;
        diff.mapv(|x| {
            let abs_x = x.abs();
            if abs_x <= self.delta {
                0.5 * x * x
            } else {
                self.delta * abs_x - 0.5 * self.delta * self.delta
            }
        })
        .sum()
            / predictions.len().max(1) as f32
    }

    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32> {
        let batch_size = predictions.len().max(1) as f32;
        let diff = &predictions - &targets;
        diff.mapv(|x| x.clamp(-self.delta, self.delta) / batch_size)
    }
}

/// Serialisable loss selection for the training configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LossFunction {
    Huber { delta: f32 },
    Mse,
}

impl Default for LossFunction {
    fn default() -> Self {
        LossFunction::Huber { delta: 1.0 }
    }
}

impl Loss for LossFunction {
    fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32 {
        match *self {
            LossFunction::Huber { delta } => HuberLoss::new(delta).compute(predictions, targets),
            LossFunction::Mse => MSE.compute(predictions, targets),
        }
    }

    fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32> {
        match *self {
            LossFunction::Huber { delta } => HuberLoss::new(delta).gradient(predictions, targets),
            LossFunction::Mse => MSE.gradient(predictions, targets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_huber_quadratic_and_linear_regions() {
        let huber = HuberLoss::default();
        let predictions = array![0.5, 3.0];
        let targets = array![0.0, 0.0];
        // 0.5 * 0.25 and 1 * 3 - 0.5, averaged
        let loss = huber.compute(predictions.view(), targets.view());
        assert!((loss - (0.125 + 2.5) / 2.0).abs() < 1e-6);

        let grad = huber.gradient(predictions.view(), targets.view());
        assert!((grad[0] - 0.25).abs() < 1e-6);
        assert!((grad[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_mse_gradient() {
        let predictions = array![1.0, 2.0];
        let targets = array![0.0, 4.0];
        assert!((MSE.compute(predictions.view(), targets.view()) - 2.5).abs() < 1e-6);
        let grad = MSE.gradient(predictions.view(), targets.view());
        assert_eq!(grad, array![1.0f32, -2.0]);
    }
}
