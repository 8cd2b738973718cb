use std::fs;
use std::path::Path;

use bincode::{deserialize, serialize};
use log::info;
use ndarray::{Array2, ArrayD, ArrayView2, ArrayViewD, Ix2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::estimator::{check_compatible, ValueEstimator, Weights};
use crate::layers::{Conv2DLayer, DenseLayer, FlattenLayer, LayerTrait, MaxPool2DLayer, NetworkLayer, Padding};
use crate::optimizer::{Optimizer, OptimizerWrapper};

/// Declarative description of one hidden layer, in the order it is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerSpec {
    Conv2D {
        filters: usize,
        kernel_size: usize,
        stride: usize,
        padding: Padding,
        activation: Activation,
    },
    MaxPool2D {
        pool_size: usize,
    },
    Flatten,
    Dense {
        units: usize,
        activation: Activation,
    },
}

impl LayerSpec {
    /// Hidden stack of the Breakout Q-network; the linear Q-value head is
    /// appended by [`QNetwork::build`].
    pub fn breakout() -> Vec<LayerSpec> {
        let conv = |filters, kernel_size, stride| LayerSpec::Conv2D {
            filters,
            kernel_size,
            stride,
            padding: Padding::Same,
            activation: Activation::Relu,
        };
        vec![
            conv(64, 7, 2),
            LayerSpec::MaxPool2D { pool_size: 2 },
            conv(128, 3, 1),
            conv(128, 3, 1),
            LayerSpec::MaxPool2D { pool_size: 2 },
            LayerSpec::Flatten,
            LayerSpec::Dense { units: 64, activation: Activation::Relu },
            LayerSpec::Dense { units: 32, activation: Activation::Relu },
        ]
    }

    /// Fully connected hidden stack for flat observations.
    pub fn mlp(hidden: &[usize]) -> Vec<LayerSpec> {
        hidden
            .iter()
            .map(|&units| LayerSpec::Dense { units, activation: Activation::Relu })
            .collect()
    }
}

/// A sequential Q-network mapping observations to one value per action.
///
/// Image observations are given channels-last (`[height, width, channels]`)
/// and transposed to channels-first internally.
#[derive(Serialize, Deserialize, Clone)]
pub struct QNetwork {
    pub layers: Vec<NetworkLayer>,
    pub optimizer: OptimizerWrapper,
    pub learning_rate: f32,
    input_shape: Vec<usize>,
    num_actions: usize,
}

impl QNetwork {
    /// Assemble the network for a per-sample `input_shape`, inferring every
    /// intermediate shape and appending a linear `num_actions` output layer.
    pub fn build<R: Rng + ?Sized>(
        input_shape: &[usize],
        hidden: &[LayerSpec],
        num_actions: usize,
        optimizer: OptimizerWrapper,
        learning_rate: f32,
        rng: &mut R,
    ) -> Result<Self> {
        if num_actions == 0 {
            return Err(DqnError::invalid_parameter(
                "num_actions".to_string(),
                "must be positive".to_string(),
            ));
        }
        let mut shape = match input_shape {
            [height, width, channels] => vec![*channels, *height, *width],
            [features] => vec![*features],
            _ => {
                return Err(DqnError::dimension_mismatch(
                    "[height, width, channels] or [features]".to_string(),
                    format!("{:?}", input_shape),
                ))
            }
        };

        let head = LayerSpec::Dense { units: num_actions, activation: Activation::Linear };
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        for spec in hidden.iter().chain(std::iter::once(&head)) {
            let layer = match *spec {
                LayerSpec::Conv2D { filters, kernel_size, stride, padding, activation } => {
                    let in_channels = match shape.as_slice() {
                        [channels, _, _] => *channels,
                        _ => {
                            return Err(DqnError::invalid_parameter(
                                "layers".to_string(),
                                format!("conv layer needs a [height, width, channels] input, got {:?}", shape),
                            ))
                        }
                    };
                    NetworkLayer::Conv2D(Conv2DLayer::new(
                        in_channels,
                        filters,
                        (kernel_size, kernel_size),
                        (stride, stride),
                        padding,
                        activation,
                        rng,
                    )?)
                }
                LayerSpec::MaxPool2D { pool_size } => {
                    NetworkLayer::MaxPool2D(MaxPool2DLayer::new((pool_size, pool_size))?)
                }
                LayerSpec::Flatten => NetworkLayer::Flatten(FlattenLayer::new()),
                LayerSpec::Dense { units, activation } => {
                    let input_size = match shape.as_slice() {
                        [features] => *features,
                        _ => {
                            return Err(DqnError::invalid_parameter(
                                "layers".to_string(),
                                format!("dense layer after a {:?} feature map needs a Flatten first", shape),
                            ))
                        }
                    };
                    NetworkLayer::Dense(DenseLayer::new(input_size, units, activation, rng)?)
                }
            };
            shape = layer.output_shape(&shape)?;
            layers.push(layer);
        }

        Ok(QNetwork {
            layers,
            optimizer,
            learning_rate,
            input_shape: input_shape.to_vec(),
            num_actions,
        })
    }

    /// Per-sample input shape as given to [`QNetwork::build`]
    pub fn input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }

    /// Layer table with output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let mut shape = match self.input_shape.as_slice() {
            [h, w, c] => vec![*c, *h, *w],
            other => other.to_vec(),
        };
        let mut lines = vec![format!("{:<14}{:<22}{:>12}", "Layer", "Output shape", "Params")];
        for layer in &self.layers {
            shape = layer.output_shape(&shape).unwrap_or_default();
            let display = match shape.as_slice() {
                [c, h, w] => format!("{:?}", [*h, *w, *c]),
                other => format!("{:?}", other),
            };
            lines.push(format!("{:<14}{:<22}{:>12}", layer.name(), display, layer.parameter_count()));
        }
        lines.push(format!("Total params: {}", self.parameter_count()));
        lines.join("\n")
    }

    /// Validate a batch and move image channels in front of the spatial axes.
    fn prepare(&self, states: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        if states.ndim() != self.input_shape.len() + 1 || &states.shape()[1..] != self.input_shape.as_slice() {
            return Err(DqnError::dimension_mismatch(
                format!("[batch, {:?}]", self.input_shape),
                format!("{:?}", states.shape()),
            ));
        }
        if states.ndim() == 4 {
            Ok(states.permuted_axes(vec![0, 3, 1, 2]).as_standard_layout().into_owned())
        } else {
            Ok(states.to_owned())
        }
    }

    /// Save the network, including optimiser state, to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let serialized = serialize(self)?;
        fs::write(path.as_ref(), serialized)?;
        info!("Save Q-network to {:?}", path.as_ref());
        Ok(())
    }

    /// Load a network written by [`QNetwork::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let buffer = fs::read(path.as_ref())?;
        let network: Self = deserialize(&buffer)?;
        info!("Load Q-network from {:?}", path.as_ref());
        Ok(network)
    }
}

impl ValueEstimator for QNetwork {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn predict(&self, states: ArrayViewD<f32>) -> Result<Array2<f32>> {
        let mut current = self.prepare(states)?;
        for layer in &self.layers {
            current = layer.infer_batch(current.view())?;
        }
        Ok(current.into_dimensionality::<Ix2>()?)
    }

    fn forward(&mut self, states: ArrayViewD<f32>) -> Result<Array2<f32>> {
        let mut current = self.prepare(states)?;
        for layer in &mut self.layers {
            current = layer.forward_batch(current.view())?;
        }
        Ok(current.into_dimensionality::<Ix2>()?)
    }

    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<Weights> {
        let mut gradient = output_gradient.to_owned().into_dyn();
        for layer in self.layers.iter_mut().rev() {
            gradient = layer.backward_batch(gradient.view())?;
        }
        Ok(self.layers.iter().flat_map(|layer| layer.gradients()).collect())
    }

    fn apply_gradients(&mut self, gradients: &Weights) -> Result<()> {
        check_compatible(&self.get_weights(), gradients)?;
        let learning_rate = self.learning_rate;
        let optimizer = &mut self.optimizer;
        let params = self.layers.iter_mut().flat_map(|layer| layer.parameters_mut());
        for (index, (mut param, gradient)) in params.zip(gradients).enumerate() {
            optimizer.update(index, &mut param, gradient, learning_rate);
        }
        optimizer.step();
        Ok(())
    }

    fn get_weights(&self) -> Weights {
        self.layers.iter().flat_map(|layer| layer.parameters()).collect()
    }

    fn set_weights(&mut self, weights: &Weights) -> Result<()> {
        check_compatible(&self.get_weights(), weights)?;
        let params = self.layers.iter_mut().flat_map(|layer| layer.parameters_mut());
        for (mut param, value) in params.zip(weights) {
            param.assign(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::SGD;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_breakout_architecture_shapes() {
        let mut rng = StdRng::seed_from_u64(42);
        let hidden = LayerSpec::breakout();
        let network = QNetwork::build(&[210, 160, 3], &hidden, 4, OptimizerWrapper::SGD(SGD::new()), 1e-3, &mut rng).unwrap();

        let mut shape = vec![3, 210, 160];
        let mut shapes = Vec::new();
        for layer in &network.layers {
            shape = layer.output_shape(&shape).unwrap();
            shapes.push(shape.clone());
        }
        assert_eq!(shapes[0], vec![64, 105, 80]);
        assert_eq!(shapes[1], vec![64, 52, 40]);
        assert_eq!(shapes[4], vec![128, 26, 20]);
        assert_eq!(shapes[5], vec![128 * 26 * 20]);
        assert_eq!(shapes[8], vec![4]);

        let counts: Vec<usize> = network.layers.iter().map(|layer| layer.parameter_count()).collect();
        assert_eq!(counts, vec![9472, 0, 73856, 147584, 0, 0, 4259904, 2080, 132]);
        assert_eq!(network.parameter_count(), 4_493_028);
        assert!(network.summary().contains("Total params: 4493028"));

        let small = QNetwork::build(&[12, 10, 3], &hidden[..2], 4, OptimizerWrapper::SGD(SGD::new()), 1e-3, &mut rng);
        assert!(small.is_err(), "dense head after a feature map must require Flatten");
    }

    #[test]
    fn test_small_cnn_predict_and_weights() {
        let mut rng = StdRng::seed_from_u64(1);
        let hidden = vec![
            LayerSpec::Conv2D { filters: 4, kernel_size: 3, stride: 2, padding: Padding::Same, activation: Activation::Relu },
            LayerSpec::MaxPool2D { pool_size: 2 },
            LayerSpec::Flatten,
            LayerSpec::Dense { units: 8, activation: Activation::Relu },
        ];
        let network = QNetwork::build(&[8, 6, 2], &hidden, 3, OptimizerWrapper::SGD(SGD::new()), 1e-3, &mut rng).unwrap();
        let states = ndarray::ArrayD::<f32>::ones(ndarray::IxDyn(&[5, 8, 6, 2]));
        let q = network.predict(states.view()).unwrap();
        assert_eq!(q.dim(), (5, 3));

        // conv kernel, conv bias, dense(8 -> 8), head(8 -> 3); the pooled map is 2x1x4
        let weights = network.get_weights();
        assert_eq!(weights.len(), 6);
        assert_eq!(weights[0].shape(), &[4, 2, 3, 3]);
        assert_eq!(weights[2].shape(), &[8, 8]);
        assert_eq!(network.parameter_count(), 4 * 2 * 9 + 4 + 8 * 8 + 8 + 8 * 3 + 3);
        assert!(network.summary().contains("Total params"));

        let wrong = ndarray::ArrayD::<f32>::ones(ndarray::IxDyn(&[5, 6, 8, 2]));
        assert!(network.predict(wrong.view()).is_err());
    }
}
