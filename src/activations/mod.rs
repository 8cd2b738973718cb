//! # Activation Functions
//!
//! Element-wise non-linearities used by the convolutional and dense layers of
//! the Q-network.
//!
//! - **ReLU**: `max(0, x)`, the default for every hidden layer
//! - **Linear**: identity, used by the Q-value output layer
//! - **LeakyReLU**: ReLU with a small negative slope
//!
//! ```rust
//! use breakout_dqn::activations::Activation;
//! use ndarray::array;
//!
//! let mut data = array![1.0, -0.5, 0.0, 2.0];
//! Activation::Relu.apply(&mut data);
//! assert_eq!(data, array![1.0f32, 0.0, 0.0, 2.0]);
//! ```

pub mod functions;

pub use functions::Activation;
