//! Training progress observers

use std::sync::{Arc, Mutex};

/// Receives progress events while a network trains.
///
/// Listeners travel with their network, so they must be `Send` for training
/// to run on a worker thread.
pub trait TrainingListener: Send {
    /// Called after every optimization iteration
    fn iteration_done(&mut self, iteration: usize, epoch: usize, score: f32);

    /// Called after every completed epoch
    fn epoch_done(&mut self, _epoch: usize) {}
}

/// Logs the score every `print_every` iterations
#[derive(Debug, Clone)]
pub struct ScoreIterationListener {
    print_every: usize,
}

impl ScoreIterationListener {
    /// Report every `print_every` iterations (at least every iteration)
    pub fn new(print_every: usize) -> Self {
        ScoreIterationListener {
            print_every: print_every.max(1),
        }
    }
}

impl TrainingListener for ScoreIterationListener {
    fn iteration_done(&mut self, iteration: usize, epoch: usize, score: f32) {
        if iteration % self.print_every == 0 {
            tracing::info!("Score at iteration {} (epoch {}) is {:.6}", iteration, epoch, score);
        }
    }
}

/// Records every score into a shared buffer
#[derive(Debug, Clone, Default)]
pub struct CollectScoresListener {
    scores: Arc<Mutex<Vec<f32>>>,
}

impl CollectScoresListener {
    /// Create a listener with an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded scores
    pub fn scores(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.scores)
    }
}

impl TrainingListener for CollectScoresListener {
    fn iteration_done(&mut self, _iteration: usize, _epoch: usize, score: f32) {
        // A poisoned buffer only means a reader panicked; keep recording
        let mut scores = match self.scores.lock() {
            Ok(scores) => scores,
            Err(poisoned) => poisoned.into_inner(),
        };
        scores.push(score);
    }
}
