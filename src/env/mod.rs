//! Environment.
mod catch;

pub use catch::CatchEnv;

use ndarray::ArrayD;
use std::collections::HashMap;

use crate::error::Result;

/// Outcome of one [`Environment::step`].
#[derive(Clone, Debug)]
pub struct Step {
    pub next_state: ArrayD<f32>,
    pub reward: f32,
    /// The episode ended with this step
    pub done: bool,
    /// Auxiliary diagnostics, never read by the trainer
    pub info: HashMap<String, f32>,
}

impl Step {
    pub fn new(next_state: ArrayD<f32>, reward: f32, done: bool) -> Self {
        Step {
            next_state,
            reward,
            done,
            info: HashMap::new(),
        }
    }
}

/// An episodic task with discrete actions, treated as a black box.
pub trait Environment {
    /// Starts a new episode and returns its first observation.
    fn reset(&mut self) -> Result<ArrayD<f32>>;

    /// Performs one action.
    fn step(&mut self, action: usize) -> Result<Step>;

    /// Shape of a single observation, channels-last for images.
    fn observation_shape(&self) -> Vec<usize>;

    fn num_actions(&self) -> usize;
}
