//! Trainable network capability: layer-graph configuration, training,
//! listeners and evaluation

mod config;
mod network;
mod listener;
mod evaluation;

pub use config::{
    Activation, GradientClipping, LayerConfig, LayerKind, LossFunction, MomentumSchedule,
    NetworkConfig, WeightInit,
};
pub use network::{LayerParams, Network, NetworkState, UpdaterState};
pub use listener::{CollectScoresListener, ScoreIterationListener, TrainingListener};
pub use evaluation::Evaluation;
