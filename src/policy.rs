//! Epsilon-greedy action selection and its linear exploration schedule.

use ndarray::{ArrayViewD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};
use crate::estimator::{argmax, ValueEstimator};

/// Actions a random (exploring) step may pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExplorationRange {
    /// Uniform over `0..n`, whatever the estimator's action count
    Fixed(usize),
    /// Uniform over every action the estimator scores
    AllActions,
}

impl Default for ExplorationRange {
    fn default() -> Self {
        ExplorationRange::Fixed(2)
    }
}

impl ExplorationRange {
    fn upper_bound(&self, num_actions: usize) -> usize {
        match *self {
            ExplorationRange::Fixed(n) => n,
            ExplorationRange::AllActions => num_actions,
        }
    }
}

/// Linearly decaying exploration rate: `max(start - episode / decay_episodes, floor)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule {
    pub start: f32,
    pub floor: f32,
    pub decay_episodes: usize,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        EpsilonSchedule {
            start: 1.0,
            floor: 0.01,
            decay_episodes: 500,
        }
    }
}

impl EpsilonSchedule {
    pub fn new(start: f32, floor: f32, decay_episodes: usize) -> Self {
        EpsilonSchedule { start, floor, decay_episodes }
    }

    pub fn epsilon(&self, episode: usize) -> f32 {
        let decayed = self.start - episode as f32 / self.decay_episodes.max(1) as f32;
        decayed.max(self.floor)
    }
}

/// Epsilon-greedy policy over a [`ValueEstimator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EpsilonGreedy {
    pub exploration: ExplorationRange,
}

impl EpsilonGreedy {
    pub fn new(exploration: ExplorationRange) -> Self {
        EpsilonGreedy { exploration }
    }

    /// With probability `epsilon` a random action from the exploration range,
    /// otherwise the first action with the highest predicted Q-value.
    pub fn select_action<V, R>(&self, estimator: &V, state: ArrayViewD<f32>, epsilon: f32, rng: &mut R) -> Result<usize>
    where
        V: ValueEstimator,
        R: Rng + ?Sized,
    {
        if rng.gen::<f32>() < epsilon {
            let upper = self.exploration.upper_bound(estimator.num_actions());
            if upper == 0 {
                return Err(DqnError::invalid_parameter("exploration", "range must hold at least one action"));
            }
            return Ok(rng.gen_range(0..upper));
        }

        let q_values = estimator.predict(state.insert_axis(Axis(0)))?;
        argmax(q_values.row(0))
    }
}
