//! Denoising autoencoder with a softmax classification head

use crate::core::config::DEFAULT_SEED;
use crate::core::{ConfigurationProducer, Hyperparameters};
use crate::nn::{
    Activation, GradientClipping, LayerConfig, LossFunction, MomentumSchedule, NetworkConfig,
};
use crate::{DeepFeatError, Result};

const CORRUPTION_LEVEL: f32 = 0.3;
const CLIP_THRESHOLD: f32 = 1.0;
const INITIAL_MOMENTUM: f32 = 0.5;
const LATE_MOMENTUM: f32 = 0.9;
const MOMENTUM_SWITCH_EPOCH: usize = 3;

/// One encoding layer halving the input, followed by a softmax output layer.
///
/// The encoder is pretrained as a denoising autoencoder; labels only train
/// the output layer. Gradients are clipped element-wise and momentum steps
/// up from 0.5 to 0.9 after three epochs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoEncoderProducer {
    input_size: usize,
    output_size: usize,
}

impl AutoEncoderProducer {
    /// Create a producer for the given input and output dimensions
    pub fn new(input_size: usize, output_size: usize) -> Result<Self> {
        if input_size < 2 {
            return Err(DeepFeatError::InvalidArgument(format!(
                "autoencoder needs at least 2 inputs to compress, got {}",
                input_size
            )));
        }
        if output_size == 0 {
            return Err(DeepFeatError::InvalidArgument(
                "output size must be positive".to_string(),
            ));
        }
        Ok(AutoEncoderProducer {
            input_size,
            output_size,
        })
    }

    /// Input dimension
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Output dimension
    pub fn output_size(&self) -> usize {
        self.output_size
    }
}

impl ConfigurationProducer for AutoEncoderProducer {
    fn build_configuration(&self, hyperparameters: &Hyperparameters) -> Result<NetworkConfig> {
        let encoded = self.input_size / 2;

        let config = NetworkConfig {
            seed: hyperparameters.seed.unwrap_or(DEFAULT_SEED),
            iterations: hyperparameters.iterations,
            learning_rate: hyperparameters.learning_rate,
            momentum: MomentumSchedule::constant(INITIAL_MOMENTUM)
                .then_after(MOMENTUM_SWITCH_EPOCH, LATE_MOMENTUM),
            clipping: GradientClipping::ElementWiseAbsolute {
                threshold: CLIP_THRESHOLD,
            },
            layers: vec![
                LayerConfig::autoencoder(self.input_size, encoded, CORRUPTION_LEVEL),
                LayerConfig::output(
                    encoded,
                    self.output_size,
                    LossFunction::NegativeLogLikelihood,
                    Activation::Softmax,
                ),
            ],
            pretrain: true,
            backprop: false,
        };
        config.validate()?;

        tracing::info!("Built autoencoder configuration.");
        Ok(config)
    }

    fn name(&self) -> &str {
        "Autoencoder"
    }

    fn description(&self) -> &str {
        "Simple autoencoder example"
    }
}
