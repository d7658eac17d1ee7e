//! Manager configuration

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::{utils, DeepFeatError, Result};

/// Seed used when nothing else is configured
pub(crate) const DEFAULT_SEED: u64 = 123;

/// Lifecycle manager configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Seed for splitting, batch shuffling and (by default) the network
    pub seed: u64,
    /// Mini-batch size
    pub batch_size: usize,
    /// Score reporting frequency (iterations)
    pub print_score_iterations: usize,
    /// Reshuffle training batches every epoch
    pub shuffle_batches: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            seed: DEFAULT_SEED,
            batch_size: 32,
            print_score_iterations: 10,
            shuffle_batches: true,
        }
    }
}

impl ManagerConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: ManagerConfig = utils::load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Write to a JSON file
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        utils::save_json(self, path.as_ref())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DeepFeatError::InvalidArgument(
                "batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
