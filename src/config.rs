//! Configuration of [`Trainer`](crate::trainer::Trainer).
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

use crate::error::{DqnError, Result};
use crate::loss::LossFunction;
use crate::optimizer::OptimizerConfig;
use crate::policy::{EpsilonSchedule, ExplorationRange};

/// How the target estimator follows the online one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TargetUpdate {
    /// Copy the online weights on every episode index divisible by `period`.
    Hard { period: usize },
    /// Blend `tau` of the online weights in after every trained episode.
    Soft { tau: f32 },
}

impl Default for TargetUpdate {
    fn default() -> Self {
        TargetUpdate::Hard { period: 50 }
    }
}

/// Configuration of [`Trainer`](crate::trainer::Trainer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct DqnConfig {
    /// Transitions per training step.
    pub batch_size: usize,

    /// Discount rate of future rewards.
    pub discount: f32,

    /// Maximum number of stored transitions.
    pub buffer_capacity: usize,

    /// Number of training episodes.
    pub episodes: usize,

    /// Step limit of a single episode.
    pub max_steps: usize,

    /// Training steps start once the episode index exceeds this value.
    pub warmup_episodes: usize,

    pub target_update: TargetUpdate,

    pub epsilon_start: f32,

    pub epsilon_floor: f32,

    /// Episodes until epsilon reaches `epsilon_start - 1`.
    pub epsilon_decay_episodes: usize,

    /// Range of random actions.
    pub exploration: ExplorationRange,

    pub learning_rate: f32,

    pub optimizer: OptimizerConfig,

    pub loss: LossFunction,

    /// Seed of the trainer's random number generator.
    pub seed: u64,
}

impl Default for DqnConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            discount: 0.95,
            buffer_capacity: 20_000,
            episodes: 600,
            max_steps: 200,
            warmup_episodes: 50,
            target_update: TargetUpdate::default(),
            epsilon_start: 1.0,
            epsilon_floor: 0.01,
            epsilon_decay_episodes: 500,
            exploration: ExplorationRange::default(),
            learning_rate: 1e-3,
            optimizer: OptimizerConfig::default(),
            loss: LossFunction::default(),
            seed: 42,
        }
    }
}

impl DqnConfig {
    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount rate.
    pub fn discount(mut self, v: f32) -> Self {
        self.discount = v;
        self
    }

    /// Sets the replay buffer capacity.
    pub fn buffer_capacity(mut self, v: usize) -> Self {
        self.buffer_capacity = v;
        self
    }

    /// Sets the number of episodes.
    pub fn episodes(mut self, v: usize) -> Self {
        self.episodes = v;
        self
    }

    /// Sets the step limit per episode.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the number of warm-up episodes.
    pub fn warmup_episodes(mut self, v: usize) -> Self {
        self.warmup_episodes = v;
        self
    }

    /// Sets the target update rule.
    pub fn target_update(mut self, v: TargetUpdate) -> Self {
        self.target_update = v;
        self
    }

    /// Sets the epsilon schedule.
    pub fn epsilon(mut self, start: f32, floor: f32, decay_episodes: usize) -> Self {
        self.epsilon_start = start;
        self.epsilon_floor = floor;
        self.epsilon_decay_episodes = decay_episodes;
        self
    }

    /// Sets the range of random actions.
    pub fn exploration(mut self, v: ExplorationRange) -> Self {
        self.exploration = v;
        self
    }

    pub fn learning_rate(mut self, v: f32) -> Self {
        self.learning_rate = v;
        self
    }

    pub fn optimizer(mut self, v: OptimizerConfig) -> Self {
        self.optimizer = v;
        self
    }

    pub fn loss(mut self, v: LossFunction) -> Self {
        self.loss = v;
        self
    }

    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    pub fn schedule(&self) -> EpsilonSchedule {
        EpsilonSchedule::new(self.epsilon_start, self.epsilon_floor, self.epsilon_decay_episodes)
    }

    /// Rejects settings the trainer cannot run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_size", self.batch_size),
            ("buffer_capacity", self.buffer_capacity),
            ("episodes", self.episodes),
            ("max_steps", self.max_steps),
            ("epsilon_decay_episodes", self.epsilon_decay_episodes),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(DqnError::invalid_parameter(name, "must be positive"));
            }
        }
        if self.batch_size > self.buffer_capacity {
            return Err(DqnError::invalid_parameter(
                "batch_size".to_string(),
                format!("{} exceeds the buffer capacity {}", self.batch_size, self.buffer_capacity),
            ));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(DqnError::invalid_parameter(
                "discount".to_string(),
                format!("{} is outside [0, 1]", self.discount),
            ));
        }
        if !(0.0..=1.0).contains(&self.epsilon_floor) || self.epsilon_floor > self.epsilon_start {
            return Err(DqnError::invalid_parameter(
                "epsilon_floor".to_string(),
                format!("{} must lie in [0, epsilon_start]", self.epsilon_floor),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(DqnError::invalid_parameter(
                "learning_rate".to_string(),
                format!("{} must be positive", self.learning_rate),
            ));
        }
        match self.target_update {
            TargetUpdate::Hard { period: 0 } => {
                return Err(DqnError::invalid_parameter("target_update", "period must be positive"))
            }
            TargetUpdate::Soft { tau } if !(tau > 0.0 && tau <= 1.0) => {
                return Err(DqnError::invalid_parameter(
                    "target_update".to_string(),
                    format!("tau {} is outside (0, 1]", tau),
                ))
            }
            _ => {}
        }
        if self.exploration == ExplorationRange::Fixed(0) {
            return Err(DqnError::invalid_parameter("exploration", "range must hold at least one action"));
        }
        Ok(())
    }

    /// Constructs [`DqnConfig`] from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let config = serde_json::from_reader(rdr)?;
        Ok(config)
    }

    /// Saves [`DqnConfig`] as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_json::to_string_pretty(&self)?.as_bytes())?;
        Ok(())
    }
}
