//! Deterministic environment and estimator doubles for trainer tests.
use ndarray::{arr1, Array1, Array2, ArrayD, ArrayView2, ArrayViewD};

use crate::env::{Environment, Step};
use crate::error::Result;
use crate::estimator::{check_compatible, ValueEstimator, Weights};

/// Episode `i` lasts `lengths[i]` steps (the last entry repeats), each with
/// reward 1.0. Observations are `[step index]`.
pub struct ScriptedEnv {
    pub lengths: Vec<usize>,
    pub num_actions: usize,
    pub resets: usize,
    pub t: usize,
    pub actions: Vec<usize>,
}

impl ScriptedEnv {
    pub fn new(lengths: Vec<usize>, num_actions: usize) -> Self {
        ScriptedEnv { lengths, num_actions, resets: 0, t: 0, actions: Vec::new() }
    }

    fn length(&self) -> usize {
        let episode = self.resets.saturating_sub(1).min(self.lengths.len() - 1);
        self.lengths[episode]
    }
}

impl Environment for ScriptedEnv {
    fn reset(&mut self) -> Result<ArrayD<f32>> {
        self.resets += 1;
        self.t = 0;
        Ok(arr1(&[0.0]).into_dyn())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        self.actions.push(action);
        self.t += 1;
        Ok(Step::new(arr1(&[self.t as f32]).into_dyn(), 1.0, self.t >= self.length()))
    }

    fn observation_shape(&self) -> Vec<usize> {
        vec![1]
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }
}

/// Returns the same Q-values for every state. Its only weight tensor holds
/// `[version]`, and each optimiser step bumps the version by one.
#[derive(Clone, Debug)]
pub struct CountingEstimator {
    pub q_values: Array1<f32>,
    pub version: f32,
    pub forward_calls: usize,
    pub last_output_gradient: Option<Array2<f32>>,
}

impl CountingEstimator {
    pub fn new(q_values: Vec<f32>) -> Self {
        CountingEstimator { q_values: Array1::from(q_values), version: 0.0, forward_calls: 0, last_output_gradient: None }
    }

    fn rows(&self, states: &ArrayViewD<f32>) -> Array2<f32> {
        let batch = states.shape()[0];
        let mut out = Array2::zeros((batch, self.q_values.len()));
        for mut row in out.rows_mut() {
            row.assign(&self.q_values);
        }
        out
    }
}

impl ValueEstimator for CountingEstimator {
    fn num_actions(&self) -> usize {
        self.q_values.len()
    }

    fn predict(&self, states: ArrayViewD<f32>) -> Result<Array2<f32>> {
        Ok(self.rows(&states))
    }

    fn forward(&mut self, states: ArrayViewD<f32>) -> Result<Array2<f32>> {
        self.forward_calls += 1;
        Ok(self.rows(&states))
    }

    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<Weights> {
        self.last_output_gradient = Some(output_gradient.to_owned());
        Ok(vec![arr1(&[0.0]).into_dyn()])
    }

    fn apply_gradients(&mut self, gradients: &Weights) -> Result<()> {
        check_compatible(&self.get_weights(), gradients)?;
        self.version += 1.0;
        Ok(())
    }

    fn get_weights(&self) -> Weights {
        vec![arr1(&[self.version]).into_dyn()]
    }

    fn set_weights(&mut self, weights: &Weights) -> Result<()> {
        check_compatible(&self.get_weights(), weights)?;
        self.version = weights[0][[0]];
        Ok(())
    }
}
