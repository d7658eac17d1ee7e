//! Core lifecycle: configuration producers, the network manager and its
//! persisted artifact

mod producer;
mod autoencoder;
mod config;
mod artifact;
mod manager;

pub use producer::{ConfigurationProducer, Hyperparameters};
pub use autoencoder::AutoEncoderProducer;
pub use config::ManagerConfig;
pub use artifact::ModelArtifact;
pub use manager::{EvaluationOutcome, LifecycleState, NetworkManager, PersistOutcome};
