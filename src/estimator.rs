//! The function-approximator seam between the trainer and a Q-network.
//!
//! The trainer only talks to [`ValueEstimator`], so the training loop can be
//! exercised against small linear stubs as well as the convolutional
//! [`QNetwork`](crate::network::QNetwork).

use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD};

use crate::error::{DqnError, Result};

/// Trainable tensors in a fixed order, the unit copied between the online
/// network, the target network and the best snapshot.
pub type Weights = Vec<ArrayD<f32>>;

/// A parameterised map from a batch of observations to per-action Q-values.
pub trait ValueEstimator: Clone {
    /// Width of the Q-value rows
    fn num_actions(&self) -> usize;

    /// Q-values for a batch (batch axis first) without recording anything for backprop
    fn predict(&self, states: ArrayViewD<f32>) -> Result<Array2<f32>>;

    /// Q-values for a batch, keeping what [`ValueEstimator::backward`] needs
    fn forward(&mut self, states: ArrayViewD<f32>) -> Result<Array2<f32>>;

    /// Backpropagate `d loss / d Q` for the batch of the last `forward` call.
    ///
    /// Returns one gradient per trainable tensor, in [`ValueEstimator::get_weights`] order.
    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<Weights>;

    /// One optimiser step with the given gradients
    fn apply_gradients(&mut self, gradients: &Weights) -> Result<()>;

    fn get_weights(&self) -> Weights;

    fn set_weights(&mut self, weights: &Weights) -> Result<()>;
}

/// Check that `weights` can replace `current` tensor by tensor.
pub fn check_compatible(current: &[ArrayD<f32>], weights: &[ArrayD<f32>]) -> Result<()> {
    if current.len() != weights.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} weight tensors", current.len()),
            format!("{}", weights.len()),
        ));
    }
    for (i, (a, b)) in current.iter().zip(weights).enumerate() {
        if a.shape() != b.shape() {
            return Err(DqnError::dimension_mismatch(
                format!("tensor {} with shape {:?}", i, a.shape()),
                format!("{:?}", b.shape()),
            ));
        }
    }
    Ok(())
}

/// Exponential moving average `target = (1 - tau) * target + tau * online`.
pub fn soft_update(target: &mut Weights, online: &[ArrayD<f32>], tau: f32) -> Result<()> {
    check_compatible(target, online)?;
    for (t, o) in target.iter_mut().zip(online) {
        t.zip_mut_with(o, |t, &o| *t = (1.0 - tau) * *t + tau * o);
    }
    Ok(())
}

/// Index of the largest value, ties broken by first occurrence.
///
/// NaN entries never win; an all-NaN or empty row is a numerical error.
pub fn argmax<'a, I>(values: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a f32>,
{
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.into_iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| DqnError::Numerical("no comparable Q-values".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_first_occurrence() {
        assert_eq!(argmax(&[1.0, 3.0, 3.0, 2.0]).unwrap(), 1);
        assert_eq!(argmax(&[f32::NAN, -1.0, -1.0]).unwrap(), 1);
        assert!(argmax(&[] as &[f32]).is_err());
    }

    #[test]
    fn test_soft_update_interpolates() {
        let mut target = vec![array![0.0, 10.0].into_dyn()];
        let online = vec![array![1.0, 0.0].into_dyn()];
        soft_update(&mut target, &online, 0.01).unwrap();
        assert!((target[0][[0]] - 0.01).abs() < 1e-6);
        assert!((target[0][[1]] - 9.9).abs() < 1e-5);
    }

    #[test]
    fn test_incompatible_weights_rejected() {
        let current = vec![array![0.0, 1.0].into_dyn()];
        assert!(check_compatible(&current, &[]).is_err());
        assert!(check_compatible(&current, &[array![0.0].into_dyn()]).is_err());
        assert!(check_compatible(&current, &[array![2.0, 3.0].into_dyn()]).is_ok());
    }
}
