//! Feed-forward network with autoencoder pretraining and momentum SGD

use ndarray::{Array, Array1, Array2, Axis, Dimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::data::Batch;
use crate::nn::config::{Activation, LayerKind, LossFunction, NetworkConfig};
use crate::nn::TrainingListener;
use crate::{DeepFeatError, Result};

/// Parameters of one layer (also used for gradients and velocities)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerParams {
    /// `[n_in, n_out]`
    pub weights: Array2<f32>,
    /// `[n_out]`
    pub bias: Array1<f32>,
    /// `[n_in]` reconstruction bias of autoencoder layers
    pub visible_bias: Option<Array1<f32>>,
}

impl LayerParams {
    fn zeros_like(other: &LayerParams) -> Self {
        LayerParams {
            weights: Array2::zeros(other.weights.raw_dim()),
            bias: Array1::zeros(other.bias.len()),
            visible_bias: other.visible_bias.as_ref().map(|vb| Array1::zeros(vb.len())),
        }
    }

    fn same_shape(&self, other: &LayerParams) -> bool {
        self.weights.dim() == other.weights.dim()
            && self.bias.len() == other.bias.len()
            && self.visible_bias.as_ref().map(|v| v.len())
                == other.visible_bias.as_ref().map(|v| v.len())
    }
}

/// Optimizer state carried across `fit` calls and through persistence
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdaterState {
    /// Momentum velocities, one entry per layer
    pub velocities: Vec<LayerParams>,
    /// Optimization iterations performed so far
    pub iteration: usize,
    /// Completed epochs
    pub epoch: usize,
}

/// Everything needed to rebuild a network and resume training
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    /// Layer-graph configuration
    pub config: NetworkConfig,
    /// Per-layer parameters
    pub params: Vec<LayerParams>,
    /// Optimizer state
    pub updater: UpdaterState,
}

/// Trainable feed-forward network
pub struct Network {
    config: NetworkConfig,
    params: Vec<LayerParams>,
    updater: UpdaterState,
    rng: StdRng,
    listeners: Vec<Box<dyn TrainingListener>>,
}

impl Network {
    /// Validate `config` and initialize fresh weights
    pub fn new(config: NetworkConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let params: Vec<LayerParams> = config
            .layers
            .iter()
            .map(|layer| LayerParams {
                weights: layer.weight_init.init(layer.n_in, layer.n_out, &mut rng),
                bias: Array1::zeros(layer.n_out),
                visible_bias: match layer.kind {
                    LayerKind::AutoEncoder { .. } => Some(Array1::zeros(layer.n_in)),
                    _ => None,
                },
            })
            .collect();

        let updater = UpdaterState {
            velocities: params.iter().map(LayerParams::zeros_like).collect(),
            iteration: 0,
            epoch: 0,
        };

        Ok(Network {
            config,
            params,
            updater,
            rng,
            listeners: Vec::new(),
        })
    }

    /// Rebuild a network from persisted state, checking every shape
    pub fn from_state(state: NetworkState) -> Result<Self> {
        let NetworkState {
            config,
            params,
            mut updater,
        } = state;
        config.validate()?;

        if params.len() != config.layers.len() {
            return Err(DeepFeatError::InvalidArgument(format!(
                "{} parameter sets for {} layers",
                params.len(),
                config.layers.len()
            )));
        }
        for (i, (layer, p)) in config.layers.iter().zip(&params).enumerate() {
            let wants_visible = matches!(layer.kind, LayerKind::AutoEncoder { .. });
            if p.weights.dim() != (layer.n_in, layer.n_out)
                || p.bias.len() != layer.n_out
                || p.visible_bias.as_ref().map(|v| v.len())
                    != wants_visible.then_some(layer.n_in)
            {
                return Err(DeepFeatError::InvalidArgument(format!(
                    "parameters of layer {} do not match its configuration",
                    i
                )));
            }
        }

        if updater.velocities.is_empty() {
            updater.velocities = params.iter().map(LayerParams::zeros_like).collect();
        } else if updater.velocities.len() != params.len()
            || !updater.velocities.iter().zip(&params).all(|(v, p)| v.same_shape(p))
        {
            return Err(DeepFeatError::InvalidArgument(
                "updater state does not match the layer parameters".to_string(),
            ));
        }

        let rng = StdRng::seed_from_u64(config.seed ^ updater.iteration as u64);
        Ok(Network {
            config,
            params,
            updater,
            rng,
            listeners: Vec::new(),
        })
    }

    /// Snapshot of parameters, updater state and configuration
    pub fn state(&self) -> NetworkState {
        NetworkState {
            config: self.config.clone(),
            params: self.params.clone(),
            updater: self.updater.clone(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Number of layers
    pub fn num_layers(&self) -> usize {
        self.params.len()
    }

    /// Total number of trainable parameters
    pub fn num_params(&self) -> usize {
        self.params
            .iter()
            .map(|p| p.weights.len() + p.bias.len() + p.visible_bias.as_ref().map_or(0, |v| v.len()))
            .sum()
    }

    /// Optimization iterations performed
    pub fn iteration(&self) -> usize {
        self.updater.iteration
    }

    /// Completed epochs
    pub fn epoch(&self) -> usize {
        self.updater.epoch
    }

    /// Register a training listener
    pub fn add_listener(&mut self, listener: Box<dyn TrainingListener>) {
        self.listeners.push(listener);
    }

    /// Replace all training listeners
    pub fn set_listeners(&mut self, listeners: Vec<Box<dyn TrainingListener>>) {
        self.listeners = listeners;
    }

    fn check_input(&self, input: &Array2<f32>) -> Result<()> {
        if input.ncols() != self.config.n_in() {
            return Err(DeepFeatError::InvalidArgument(format!(
                "network expects {} features, got {}",
                self.config.n_in(),
                input.ncols()
            )));
        }
        Ok(())
    }

    fn activate_layer(&self, layer: usize, input: &Array2<f32>) -> Array2<f32> {
        let p = &self.params[layer];
        let mut z = input.dot(&p.weights) + &p.bias;
        self.config.layers[layer].activation.apply(&mut z);
        z
    }

    /// Input followed by the activation of every layer
    fn feed_forward(&self, input: &Array2<f32>) -> Vec<Array2<f32>> {
        let mut activations = Vec::with_capacity(self.params.len() + 1);
        activations.push(input.clone());
        for layer in 0..self.params.len() {
            let next = self.activate_layer(layer, &activations[layer]);
            activations.push(next);
        }
        activations
    }

    /// Input followed by activations of layers `0..=layer`
    pub fn feed_forward_to_layer(&self, layer: usize, input: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
        if layer >= self.params.len() {
            return Err(DeepFeatError::InvalidArgument(format!(
                "layer {} out of range for a network with {} layers",
                layer,
                self.params.len()
            )));
        }
        self.check_input(input)?;

        let mut activations = Vec::with_capacity(layer + 2);
        activations.push(input.clone());
        for l in 0..=layer {
            let next = self.activate_layer(l, &activations[l]);
            activations.push(next);
        }
        Ok(activations)
    }

    /// Network output for a `[batch, n_in]` input
    pub fn output(&self, input: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_input(input)?;
        let mut current = input.clone();
        for layer in 0..self.params.len() {
            current = self.activate_layer(layer, &current);
        }
        Ok(current)
    }

    /// Network output for a single feature vector
    pub fn output_row(&self, features: &Array1<f32>) -> Result<Array1<f32>> {
        let input = features.clone().insert_axis(Axis(0));
        let output = self.output(&input)?;
        Ok(output.row(0).to_owned())
    }

    /// Supervised loss on a labeled batch, without updating
    pub fn score(&self, batch: &Batch) -> Result<f32> {
        let labels = batch.labels.as_ref().ok_or_else(|| {
            DeepFeatError::InvalidArgument("cannot score a batch without labels".to_string())
        })?;
        let output = self.output(&batch.features)?;
        self.check_labels(labels)?;
        Ok(self.output_loss().score(&output, labels))
    }

    fn check_labels(&self, labels: &Array2<f32>) -> Result<()> {
        if labels.ncols() != self.config.n_out() {
            return Err(DeepFeatError::InvalidArgument(format!(
                "network produces {} outputs, labels have {}",
                self.config.n_out(),
                labels.ncols()
            )));
        }
        Ok(())
    }

    fn output_loss(&self) -> LossFunction {
        match self.config.layers.last().map(|l| l.kind) {
            Some(LayerKind::Output { loss }) => loss,
            // validate() guarantees an output layer
            _ => LossFunction::MeanSquaredError,
        }
    }

    /// Run `config.iterations` optimization iterations on one mini-batch
    pub fn fit_batch(&mut self, batch: &Batch) -> Result<()> {
        self.check_input(&batch.features)?;
        if let Some(labels) = &batch.labels {
            self.check_labels(labels)?;
        } else if !self.config.pretrain {
            return Err(DeepFeatError::InvalidArgument(
                "batch has no labels and pretraining is disabled".to_string(),
            ));
        }

        for _ in 0..self.config.iterations {
            let mut score = 0.0;
            if self.config.pretrain {
                score = self.pretrain_step(&batch.features)?;
            }
            if let Some(labels) = &batch.labels {
                score = self.supervised_step(&batch.features, labels);
            }

            self.updater.iteration += 1;
            let (iteration, epoch) = (self.updater.iteration, self.updater.epoch);
            for listener in self.listeners.iter_mut() {
                listener.iteration_done(iteration, epoch, score);
            }
        }
        Ok(())
    }

    /// Mark the end of an epoch; drives the momentum schedule
    pub fn finish_epoch(&mut self) {
        self.updater.epoch += 1;
        for listener in self.listeners.iter_mut() {
            listener.epoch_done(self.updater.epoch);
        }
    }

    /// Greedy layer-wise pretraining of every autoencoder layer.
    /// Returns the reconstruction score of the last one.
    fn pretrain_step(&mut self, features: &Array2<f32>) -> Result<f32> {
        let mut input = features.clone();
        let mut score = 0.0;
        for layer in 0..self.params.len() {
            if let LayerKind::AutoEncoder { corruption_level } = self.config.layers[layer].kind {
                score = self.pretrain_layer(layer, &input, corruption_level)?;
            }
            if layer + 1 < self.params.len() {
                input = self.activate_layer(layer, &input);
            }
        }
        Ok(score)
    }

    /// One denoising step with tied weights and a sigmoid reconstruction
    fn pretrain_layer(&mut self, layer: usize, input: &Array2<f32>, corruption: f32) -> Result<f32> {
        let rng = &mut self.rng;
        let corrupted = if corruption > 0.0 {
            input.mapv(|x| if rng.gen::<f32>() < corruption { 0.0 } else { x })
        } else {
            input.clone()
        };

        let p = &self.params[layer];
        let visible_bias = p.visible_bias.as_ref().ok_or_else(|| {
            DeepFeatError::InvalidArgument(format!("layer {} has no visible bias", layer))
        })?;
        let activation = self.config.layers[layer].activation;
        let batch = input.nrows().max(1) as f32;

        let mut hidden = corrupted.dot(&p.weights) + &p.bias;
        activation.apply(&mut hidden);
        let mut reconstruction = hidden.dot(&p.weights.t()) + visible_bias;
        Activation::Sigmoid.apply(&mut reconstruction);

        let diff = &reconstruction - input;
        let score = 0.5 * diff.mapv(|d| d * d).sum() / batch;

        let d_visible = diff * Activation::Sigmoid.derivative(&reconstruction) / batch;
        let d_hidden = d_visible.dot(&p.weights) * activation.derivative(&hidden);

        let grads = LayerParams {
            weights: corrupted.t().dot(&d_hidden) + d_visible.t().dot(&hidden),
            bias: d_hidden.sum_axis(Axis(0)),
            visible_bias: Some(d_visible.sum_axis(Axis(0))),
        };
        self.apply_update(layer, grads);
        Ok(score)
    }

    /// Supervised step. With `backprop` the gradient flows through every
    /// layer, otherwise only the output layer is updated.
    fn supervised_step(&mut self, features: &Array2<f32>, labels: &Array2<f32>) -> f32 {
        let activations = self.feed_forward(features);
        let last = self.params.len() - 1;
        let output = &activations[last + 1];
        let batch = features.nrows().max(1) as f32;

        let loss = self.output_loss();
        let score = loss.score(output, labels);
        let mut delta = loss.output_delta(output, labels, self.config.layers[last].activation) / batch;

        let first = if self.config.backprop { 0 } else { last };
        for layer in (first..=last).rev() {
            let grads = LayerParams {
                weights: activations[layer].t().dot(&delta),
                bias: delta.sum_axis(Axis(0)),
                visible_bias: None,
            };
            // Propagate with the pre-update weights
            let next_delta = (layer > first).then(|| {
                delta.dot(&self.params[layer].weights.t())
                    * self.config.layers[layer - 1].activation.derivative(&activations[layer])
            });
            self.apply_update(layer, grads);
            match next_delta {
                Some(d) => delta = d,
                None => break,
            }
        }

        score
    }

    fn apply_update(&mut self, layer: usize, mut grads: LayerParams) {
        let clipping = self.config.clipping;
        clipping.clip(&mut grads.weights);
        clipping.clip(&mut grads.bias);
        if let Some(vb) = grads.visible_bias.as_mut() {
            clipping.clip(vb);
        }

        let momentum = self.config.momentum.momentum_at(self.updater.epoch);
        let lr = self.config.learning_rate;
        let velocity = &mut self.updater.velocities[layer];
        let params = &mut self.params[layer];

        momentum_step(&mut velocity.weights, &mut params.weights, &grads.weights, momentum, lr);
        momentum_step(&mut velocity.bias, &mut params.bias, &grads.bias, momentum, lr);
        if let (Some(v), Some(p), Some(g)) = (
            velocity.visible_bias.as_mut(),
            params.visible_bias.as_mut(),
            grads.visible_bias.as_ref(),
        ) {
            momentum_step(v, p, g, momentum, lr);
        }
    }
}

/// Classical momentum: `v = μv - ηg; θ += v`
fn momentum_step<D: Dimension>(
    velocity: &mut Array<f32, D>,
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    momentum: f32,
    lr: f32,
) {
    velocity.zip_mut_with(grad, |v, &g| *v = momentum * *v - lr * g);
    *param += &*velocity;
}
