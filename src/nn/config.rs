//! Layer-graph configuration for feed-forward networks

use std::collections::BTreeMap;
use ndarray::{Array, Array2, Axis, Dimension};
use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::{DeepFeatError, Result};

/// Layer activation function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// Logistic sigmoid
    Sigmoid,
    /// Hyperbolic tangent
    Tanh,
    /// Rectified linear unit
    Relu,
    /// No activation
    Identity,
    /// Row-wise normalized exponential, output layers only
    Softmax,
}

impl Activation {
    /// Apply in place to pre-activations `[batch, units]`
    pub fn apply(&self, z: &mut Array2<f32>) {
        match self {
            Activation::Sigmoid => z.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp())),
            Activation::Tanh => z.mapv_inplace(f32::tanh),
            Activation::Relu => z.mapv_inplace(|x| x.max(0.0)),
            Activation::Identity => {}
            Activation::Softmax => {
                for mut row in z.axis_iter_mut(Axis(0)) {
                    let max = row.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
                    row.mapv_inplace(|x| (x - max).exp());
                    let sum = row.sum();
                    if sum > 0.0 {
                        row /= sum;
                    }
                }
            }
        }
    }

    /// Derivative expressed in terms of the activation output `a`.
    ///
    /// Softmax returns ones: it only appears on output layers, where the
    /// loss gradient already accounts for it.
    pub fn derivative(&self, a: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Sigmoid => a.mapv(|y| y * (1.0 - y)),
            Activation::Tanh => a.mapv(|y| 1.0 - y * y),
            Activation::Relu => a.mapv(|y| if y > 0.0 { 1.0 } else { 0.0 }),
            Activation::Identity | Activation::Softmax => Array2::ones(a.raw_dim()),
        }
    }
}

/// Weight initialization scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Uniform in ±sqrt(6 / (n_in + n_out))
    Xavier,
    /// Uniform in ±1 / sqrt(n_in)
    Uniform,
    /// All zeros
    Zero,
}

impl WeightInit {
    /// Draw an `[n_in, n_out]` weight matrix
    pub fn init<R: Rng>(&self, n_in: usize, n_out: usize, rng: &mut R) -> Array2<f32> {
        let limit = match self {
            WeightInit::Xavier => (6.0 / (n_in + n_out) as f32).sqrt(),
            WeightInit::Uniform => 1.0 / (n_in as f32).sqrt(),
            WeightInit::Zero => return Array2::zeros((n_in, n_out)),
        };
        Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit))
    }
}

/// Loss function of an output layer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LossFunction {
    /// Negative log likelihood over (softmax or sigmoid) probabilities
    NegativeLogLikelihood,
    /// Halved mean squared error
    MeanSquaredError,
}

impl LossFunction {
    /// Mean loss per example
    pub fn score(&self, output: &Array2<f32>, labels: &Array2<f32>) -> f32 {
        let batch = output.nrows().max(1) as f32;
        match self {
            LossFunction::NegativeLogLikelihood => {
                let mut total = 0.0;
                ndarray::Zip::from(output).and(labels).for_each(|&p, &y| {
                    total -= y * p.max(1e-10).ln();
                });
                total / batch
            }
            LossFunction::MeanSquaredError => {
                let diff = output - labels;
                0.5 * diff.mapv(|d| d * d).sum() / batch
            }
        }
    }

    /// Gradient of the summed loss with respect to the pre-activations
    pub fn output_delta(
        &self,
        output: &Array2<f32>,
        labels: &Array2<f32>,
        activation: Activation,
    ) -> Array2<f32> {
        match self {
            LossFunction::NegativeLogLikelihood => output - labels,
            LossFunction::MeanSquaredError => (output - labels) * activation.derivative(output),
        }
    }
}

/// Role of a layer in the graph
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LayerKind {
    /// Denoising autoencoder layer, pretrained unsupervised
    AutoEncoder {
        /// Fraction of inputs zeroed during pretraining
        corruption_level: f32,
    },
    /// Plain fully connected layer
    Dense,
    /// Supervised output layer
    Output {
        /// Loss minimized by the output layer
        loss: LossFunction,
    },
}

/// A single fully connected layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    /// Input units
    pub n_in: usize,
    /// Output units
    pub n_out: usize,
    /// Layer role
    pub kind: LayerKind,
    /// Activation function
    pub activation: Activation,
    /// Weight initialization
    pub weight_init: WeightInit,
}

impl LayerConfig {
    /// Denoising autoencoder layer with sigmoid units
    pub fn autoencoder(n_in: usize, n_out: usize, corruption_level: f32) -> Self {
        LayerConfig {
            n_in,
            n_out,
            kind: LayerKind::AutoEncoder { corruption_level },
            activation: Activation::Sigmoid,
            weight_init: WeightInit::Xavier,
        }
    }

    /// Fully connected hidden layer
    pub fn dense(n_in: usize, n_out: usize, activation: Activation) -> Self {
        LayerConfig {
            n_in,
            n_out,
            kind: LayerKind::Dense,
            activation,
            weight_init: WeightInit::Xavier,
        }
    }

    /// Output layer
    pub fn output(n_in: usize, n_out: usize, loss: LossFunction, activation: Activation) -> Self {
        LayerConfig {
            n_in,
            n_out,
            kind: LayerKind::Output { loss },
            activation,
            weight_init: WeightInit::Xavier,
        }
    }

    /// Override the weight initialization
    pub fn with_weight_init(mut self, weight_init: WeightInit) -> Self {
        self.weight_init = weight_init;
        self
    }
}

/// Momentum that changes at epoch boundaries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MomentumSchedule {
    /// Momentum before the first boundary
    pub initial: f32,
    /// Epoch boundary -> momentum from that epoch on
    pub after: BTreeMap<usize, f32>,
}

impl MomentumSchedule {
    /// Constant momentum
    pub fn constant(momentum: f32) -> Self {
        MomentumSchedule {
            initial: momentum,
            after: BTreeMap::new(),
        }
    }

    /// Switch to `momentum` once `epoch` epochs have completed
    pub fn then_after(mut self, epoch: usize, momentum: f32) -> Self {
        self.after.insert(epoch, momentum);
        self
    }

    /// Momentum in effect during `epoch` (zero-based)
    pub fn momentum_at(&self, epoch: usize) -> f32 {
        self.after
            .range(..=epoch)
            .next_back()
            .map(|(_, &m)| m)
            .unwrap_or(self.initial)
    }
}

/// Gradient normalization applied before each update
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradientClipping {
    /// Gradients pass through unchanged
    Disabled,
    /// Clamp every element into ±threshold
    ElementWiseAbsolute {
        /// Largest absolute gradient value
        threshold: f32,
    },
}

impl GradientClipping {
    /// Clip a gradient in place
    pub fn clip<D: Dimension>(&self, grad: &mut Array<f32, D>) {
        if let GradientClipping::ElementWiseAbsolute { threshold } = *self {
            grad.mapv_inplace(|g| g.clamp(-threshold, threshold));
        }
    }
}

/// Complete network configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Seed for weight initialization and corruption noise
    pub seed: u64,
    /// Optimization iterations per mini-batch
    pub iterations: usize,
    /// SGD learning rate
    pub learning_rate: f32,
    /// Momentum schedule
    pub momentum: MomentumSchedule,
    /// Gradient clipping
    pub clipping: GradientClipping,
    /// Layers from input to output
    pub layers: Vec<LayerConfig>,
    /// Run unsupervised pretraining of autoencoder layers
    pub pretrain: bool,
    /// Backpropagate the supervised loss through every layer; otherwise
    /// only the output layer learns from labels
    pub backprop: bool,
}

impl NetworkConfig {
    /// Input dimension
    pub fn n_in(&self) -> usize {
        self.layers.first().map(|l| l.n_in).unwrap_or(0)
    }

    /// Output dimension
    pub fn n_out(&self) -> usize {
        self.layers.last().map(|l| l.n_out).unwrap_or(0)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DeepFeatError::InvalidArgument(msg));

        if self.layers.is_empty() {
            return invalid("network must have at least one layer".to_string());
        }
        if self.iterations == 0 {
            return invalid("iterations must be positive".to_string());
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return invalid("learning rate must be positive".to_string());
        }

        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.n_in == 0 || layer.n_out == 0 {
                return invalid(format!("layer {} has a zero dimension", i));
            }
            if i > 0 && self.layers[i - 1].n_out != layer.n_in {
                return invalid(format!(
                    "layer {} expects {} inputs but layer {} produces {}",
                    i,
                    layer.n_in,
                    i - 1,
                    self.layers[i - 1].n_out
                ));
            }
            if layer.activation == Activation::Softmax && i != last {
                return invalid(format!("softmax is only allowed on the output layer, found on layer {}", i));
            }
            match layer.kind {
                LayerKind::AutoEncoder { corruption_level } => {
                    if !(0.0..1.0).contains(&corruption_level) {
                        return invalid(format!(
                            "corruption level of layer {} must lie in [0, 1), got {}",
                            i, corruption_level
                        ));
                    }
                }
                LayerKind::Output { .. } if i != last => {
                    return invalid(format!("output layer found at position {}", i));
                }
                _ => {}
            }
        }

        if !matches!(self.layers[last].kind, LayerKind::Output { .. }) {
            return invalid("last layer must be an output layer".to_string());
        }

        Ok(())
    }
}
