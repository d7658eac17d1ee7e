//! Seeded training/test splitting

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use crate::data::Sample;
use crate::{DeepFeatError, Result};

/// Disjoint training and test partitions of a sample collection
#[derive(Debug, Clone, PartialEq)]
pub struct Partitions<E> {
    /// Samples used to update the model
    pub training: Vec<Sample<E>>,
    /// Held-out samples used for evaluation
    pub test: Vec<Sample<E>>,
}

impl<E> Partitions<E> {
    /// Total number of samples across both partitions
    pub fn len(&self) -> usize {
        self.training.len() + self.test.len()
    }

    /// Check if both partitions are empty
    pub fn is_empty(&self) -> bool {
        self.training.is_empty() && self.test.is_empty()
    }
}

/// Shuffle a copy of `collection` with a seeded Fisher-Yates and split it.
///
/// The first `floor(train_fraction * n)` shuffled samples form the training
/// partition, the rest the test partition. The same seed and input order
/// always produce the same partitions. `collection` is left untouched.
pub fn split<E: Clone>(
    collection: &[Sample<E>],
    train_fraction: f64,
    seed: u64,
) -> Result<Partitions<E>> {
    if train_fraction.is_nan() || train_fraction <= 0.0 || train_fraction >= 1.0 {
        return Err(DeepFeatError::InvalidArgument(format!(
            "train fraction must lie strictly between 0 and 1, got {}",
            train_fraction
        )));
    }

    let mut shuffled = collection.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let total = shuffled.len();
    let split_at = ((total as f64) * train_fraction).floor() as usize;
    let test = shuffled.split_off(split_at.min(total));

    tracing::debug!(
        "Dataset split: {} training, {} test (seed {})",
        shuffled.len(),
        test.len(),
        seed
    );

    Ok(Partitions {
        training: shuffled,
        test,
    })
}
