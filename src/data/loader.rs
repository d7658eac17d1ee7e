//! Mini-batch iteration over a materialized partition

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use crate::data::normalizer::stack_features;
use crate::data::{Normalizer, Sample};
use crate::{DeepFeatError, Result};

/// A stacked mini-batch
#[derive(Debug, Clone)]
pub struct Batch {
    /// `[batch, n_features]`
    pub features: Array2<f32>,
    /// `[batch, n_labels]`, present only when every sample is labeled
    pub labels: Option<Array2<f32>>,
}

impl Batch {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.features.nrows()
    }

    /// Check if the batch has no rows
    pub fn is_empty(&self) -> bool {
        self.features.nrows() == 0
    }
}

/// Data loader for batching.
///
/// Features are copied out of the partition and normalized once, when the
/// loader is built. A normalizer fitted afterwards does not reach an
/// existing loader.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    features: Array2<f32>,
    labels: Option<Array2<f32>>,
    batch_size: usize,
    order: Vec<usize>,
    rng: Option<StdRng>,
    current_idx: usize,
}

impl BatchLoader {
    /// Materialize `samples` into a loader
    pub fn new<E>(
        samples: &[Sample<E>],
        normalizer: Option<&Normalizer>,
        batch_size: usize,
        shuffle_seed: Option<u64>,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(DeepFeatError::InvalidArgument(
                "batch size must be positive".to_string(),
            ));
        }

        let mut features = stack_features(samples)?;
        if let Some(normalizer) = normalizer {
            normalizer.transform_matrix(&mut features)?;
        }
        let labels = stack_labels(samples)?;

        let mut loader = BatchLoader {
            order: (0..features.nrows()).collect(),
            features,
            labels,
            batch_size,
            rng: shuffle_seed.map(StdRng::seed_from_u64),
            current_idx: 0,
        };
        loader.shuffle_order();

        Ok(loader)
    }

    fn shuffle_order(&mut self) {
        if let Some(rng) = self.rng.as_mut() {
            self.order.shuffle(rng);
        }
    }

    /// Reset to beginning, reshuffling if enabled
    pub fn reset(&mut self) {
        self.current_idx = 0;
        self.shuffle_order();
    }

    /// Get next batch
    pub fn next_batch(&mut self) -> Option<Batch> {
        if self.current_idx >= self.order.len() {
            return None;
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.order.len());
        let rows = &self.order[self.current_idx..end_idx];
        let batch = Batch {
            features: self.features.select(Axis(0), rows),
            labels: self.labels.as_ref().map(|l| l.select(Axis(0), rows)),
        };
        self.current_idx = end_idx;

        Some(batch)
    }

    /// The whole partition as a single batch, in stored order
    pub fn full_batch(&self) -> Batch {
        Batch {
            features: self.features.clone(),
            labels: self.labels.clone(),
        }
    }

    /// Get number of batches
    pub fn num_batches(&self) -> usize {
        (self.order.len() + self.batch_size - 1) / self.batch_size
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Feature dimension
    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    /// Whether every sample carried a label
    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }
}

fn stack_labels<E>(samples: &[Sample<E>]) -> Result<Option<Array2<f32>>> {
    let dim = match samples.first().and_then(|s| s.label()) {
        Some(label) => label.len(),
        None => return Ok(None),
    };

    let mut labels = Array2::zeros((samples.len(), dim));
    for (i, sample) in samples.iter().enumerate() {
        match sample.label() {
            Some(label) if label.len() == dim => labels.row_mut(i).assign(label),
            Some(label) => {
                return Err(DeepFeatError::InvalidArgument(format!(
                    "sample {} has a label of length {}, expected {}",
                    i,
                    label.len(),
                    dim
                )))
            }
            None => {
                tracing::debug!("Sample {} is unlabeled; batches will carry no labels", i);
                return Ok(None);
            }
        }
    }

    Ok(Some(labels))
}
