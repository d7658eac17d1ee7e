//! # deepfeat: training lifecycle for entity feature networks
//!
//! This library turns labeled feature vectors bound to domain entities into
//! trained networks. It covers the whole lifecycle: splitting samples into
//! training and test partitions, fitting a normalization, building a
//! network configuration, training, evaluating, persisting, and querying
//! intermediate activations for feature extraction.
//!
//! ## Features
//!
//! - **Data**: samples, measurement/raster feature extraction, seeded splits,
//!   min-max and standardizing normalizers, batch loaders
//! - **Networks**: a small dense network with denoising-autoencoder
//!   pretraining, momentum SGD and gradient clipping
//! - **Lifecycle**: a generic manager driven by pluggable configuration
//!   producers, with checksummed model artifacts

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Samples, splitting, normalization and batching
pub mod data;

/// Network configuration, training and evaluation
pub mod nn;

/// Configuration producers and the model lifecycle manager
pub mod core;

/// Utility functions and helpers
pub mod utils;

// Re-export commonly used types
pub use data::{FeatureObject, NormalizationMethod, Normalizer, Partitions, Sample};
pub use nn::{Evaluation, Network, NetworkConfig};
pub use core::{
    AutoEncoderProducer, ConfigurationProducer, EvaluationOutcome, Hyperparameters,
    LifecycleState, ManagerConfig, NetworkManager, PersistOutcome,
};

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum DeepFeatError {
    /// Bad split fraction, non-positive dimensions, shape mismatches
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No configuration has been built yet
    #[error("Network configuration has not been built")]
    NotConfigured,

    /// A model was requested before any configuration existed
    #[error("Configuration missing: build a configuration before creating the model")]
    ConfigurationMissing,

    /// No model exists for the requested operation
    #[error("Model was not initialized")]
    ModelNotInitialized,

    /// The training partition is empty
    #[error("No training data available")]
    NoTrainingData,

    /// Normalization was used before it was fitted
    #[error("Normalizer has not been fitted")]
    NotFitted,

    /// Persistence read or write error
    #[error("IO error: {0}")]
    IoFailure(#[from] std::io::Error),

    /// A persisted model could not be decoded
    #[error("Corrupt model artifact: {0}")]
    CorruptArtifact(String),
}

/// Result type for the library
pub type Result<T> = std::result::Result<T, DeepFeatError>;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        core::{
            AutoEncoderProducer, ConfigurationProducer, EvaluationOutcome, Hyperparameters,
            LifecycleState, ManagerConfig, NetworkManager, PersistOutcome,
        },
        data::{
            split, FeatureObject, MeasurementSelection, MeasurementSource, NormalizationMethod,
            Normalizer, Partitions, RasterRegion, RasterSource, Sample,
        },
        nn::{Evaluation, Network, NetworkConfig, TrainingListener},
        DeepFeatError, Result,
    };
}
