//! Pluggable producers of layer-graph configurations

use serde::{Deserialize, Serialize};
use crate::nn::NetworkConfig;
use crate::Result;

/// Training hyperparameters handed to a configuration producer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    /// Optimization iterations per mini-batch
    pub iterations: usize,
    /// SGD learning rate
    pub learning_rate: f32,
    /// Seed override; the manager's seed is used when absent
    pub seed: Option<u64>,
}

impl Hyperparameters {
    /// Hyperparameters with the given iteration count
    pub fn with_iterations(iterations: usize) -> Self {
        Hyperparameters {
            iterations,
            ..Default::default()
        }
    }
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Hyperparameters {
            iterations: 1,
            learning_rate: 0.1,
            seed: None,
        }
    }
}

/// Defines one network architecture.
///
/// Producers own the architecture policy (layer shapes, regularization,
/// momentum schedule); the manager only drives the lifecycle.
pub trait ConfigurationProducer {
    /// Build the layer-graph configuration
    fn build_configuration(&self, hyperparameters: &Hyperparameters) -> Result<NetworkConfig>;

    /// Short name of the architecture
    fn name(&self) -> &str;

    /// One-line description of the architecture
    fn description(&self) -> &str;
}
