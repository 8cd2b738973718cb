//! # breakout-dqn - Double-DQN training for pixel-observation games
//!
//! A Deep Q-Network agent that learns from raw frames. The crate provides a
//! pure-Rust convolutional Q-network on top of `ndarray`, an experience
//! replay buffer, an epsilon-greedy policy and a trainer that performs
//! Double-DQN updates against a periodically synchronised target network
//! while keeping the weights of its best episode.
//!
//! ## Key Features
//!
//! - **Q-networks**: Conv2D (`same`/`valid` padding), max-pooling, flatten and dense layers with hand-written backpropagation
//! - **Double DQN**: online network picks the next action, target network values it
//! - **Replay**: fixed-capacity FIFO buffer with uniform sampling
//! - **Pluggable**: environments and estimators sit behind traits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use breakout_dqn::config::DqnConfig;
//! use breakout_dqn::env::{CatchEnv, Environment};
//! use breakout_dqn::network::{LayerSpec, QNetwork};
//! use breakout_dqn::trainer::Trainer;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let config = DqnConfig::default().episodes(100);
//! let env = CatchEnv::new(10, 8, config.seed).unwrap();
//! let mut rng = StdRng::seed_from_u64(config.seed);
//! let network = QNetwork::build(
//!     &env.observation_shape(),
//!     &[LayerSpec::Flatten, LayerSpec::Dense { units: 32, activation: Default::default() }],
//!     env.num_actions(),
//!     config.optimizer.build(),
//!     config.learning_rate,
//!     &mut rng,
//! )
//! .unwrap();
//!
//! let mut trainer = Trainer::new(config, env, network).unwrap();
//! let report = trainer.train().unwrap();
//! println!("best episode lasted {} steps", report.best_score);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions (ReLU, Linear, LeakyReLU)
//! - [`config`] - Training hyperparameters
//! - [`env`] - Environment trait and a small pixel game
//! - [`error`] - Error types and result handling
//! - [`estimator`] - The Q-function trait used by the trainer
//! - [`layers`] - Network layers (Conv2D, MaxPool2D, Flatten, Dense)
//! - [`loss`] - Huber and MSE losses
//! - [`metrics`] - Training metrics and tracking
//! - [`network`] - Sequential Q-network
//! - [`optimizer`] - Adam and SGD
//! - [`policy`] - Epsilon-greedy action selection
//! - [`replay_buffer`] - Experience replay
//! - [`trainer`] - Episode loop and Double-DQN updates

pub mod activations;
pub mod config;
pub mod env;
pub mod error;
pub mod estimator;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod network;
pub mod optimizer;
pub mod policy;
pub mod replay_buffer;
pub mod trainer;

#[cfg(test)]
mod tests;
