//! Per-feature normalization fitted on the training partition

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use crate::data::Sample;
use crate::{DeepFeatError, Result};

/// Normalization strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizationMethod {
    /// Scale each feature into [0, 1] using the observed min and max
    MinMax,
    /// Zero mean, unit variance per feature
    Standardize,
}

/// Fitted per-dimension statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Statistics {
    MinMax { min: Array1<f32>, max: Array1<f32> },
    Standardize { mean: Array1<f32>, std: Array1<f32> },
}

impl Statistics {
    /// `(offset, scale)` so that `x' = (x - offset) * scale`.
    /// Constant dimensions get a zero scale.
    fn offset_scale(&self) -> (&Array1<f32>, Array1<f32>) {
        let (offset, spread) = match self {
            Statistics::MinMax { min, max } => (min, max - min),
            Statistics::Standardize { mean, std } => (mean, std.clone()),
        };
        let scale = spread.mapv(|s| if s > f32::EPSILON { 1.0 / s } else { 0.0 });
        (offset, scale)
    }

    /// Feature dimension, provided both statistic vectors agree on it
    fn dim(&self) -> Result<usize> {
        let (offset, spread) = match self {
            Statistics::MinMax { min, max } => (min.len(), max.len()),
            Statistics::Standardize { mean, std } => (mean.len(), std.len()),
        };
        if offset != spread {
            return Err(DeepFeatError::InvalidArgument(format!(
                "normalizer statistics disagree on dimension: {} vs {}",
                offset, spread
            )));
        }
        Ok(offset)
    }

    fn method(&self) -> NormalizationMethod {
        match self {
            Statistics::MinMax { .. } => NormalizationMethod::MinMax,
            Statistics::Standardize { .. } => NormalizationMethod::Standardize,
        }
    }
}

/// A reusable scaling transform.
///
/// `fit` must run before `apply`/`transform`. Applying twice transforms
/// twice; guarding against that is up to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    method: NormalizationMethod,
    stats: Option<Statistics>,
}

impl Normalizer {
    /// Create an unfitted normalizer
    pub fn new(method: NormalizationMethod) -> Self {
        Normalizer {
            method,
            stats: None,
        }
    }

    /// Strategy in use
    pub fn method(&self) -> NormalizationMethod {
        self.method
    }

    /// Whether `fit` has run
    pub fn is_fitted(&self) -> bool {
        self.stats.is_some()
    }

    /// Compute per-dimension statistics from `samples`
    pub fn fit<E>(&mut self, samples: &[Sample<E>]) -> Result<()> {
        let data = stack_features(samples)?;

        let stats = match self.method {
            NormalizationMethod::MinMax => Statistics::MinMax {
                min: data.fold_axis(Axis(0), f32::INFINITY, |a, &b| a.min(b)),
                max: data.fold_axis(Axis(0), f32::NEG_INFINITY, |a, &b| a.max(b)),
            },
            NormalizationMethod::Standardize => Statistics::Standardize {
                mean: data
                    .mean_axis(Axis(0))
                    .ok_or(DeepFeatError::NoTrainingData)?,
                std: data.std_axis(Axis(0), 0.0),
            },
        };

        tracing::debug!(
            "Fitted {:?} normalizer on {} samples of dimension {}",
            self.method,
            data.nrows(),
            data.ncols()
        );
        self.stats = Some(stats);
        Ok(())
    }

    /// Transform the features of every sample in place
    pub fn apply<E>(&self, samples: &mut [Sample<E>]) -> Result<()> {
        for sample in samples.iter_mut() {
            self.transform(sample.features_mut())?;
        }
        Ok(())
    }

    /// Transform a single feature vector in place
    pub fn transform(&self, features: &mut Array1<f32>) -> Result<()> {
        let stats = self.fitted(features.len())?;
        let (offset, scale) = stats.offset_scale();
        features.zip_mut_with(offset, |x, &o| *x -= o);
        *features *= &scale;
        Ok(())
    }

    /// Transform every row of a feature matrix in place
    pub fn transform_matrix(&self, features: &mut Array2<f32>) -> Result<()> {
        let stats = self.fitted(features.ncols())?;
        let (offset, scale) = stats.offset_scale();
        for mut row in features.rows_mut() {
            row.zip_mut_with(offset, |x, &o| *x -= o);
            row *= &scale;
        }
        Ok(())
    }

    /// Check that fitted statistics belong to this method and describe
    /// `dim` features. An unfitted normalizer passes.
    pub fn validate(&self, dim: usize) -> Result<()> {
        match &self.stats {
            Some(stats) if stats.method() != self.method => Err(DeepFeatError::InvalidArgument(
                format!("{:?} normalizer holds {:?} statistics", self.method, stats.method()),
            )),
            Some(_) => self.fitted(dim).map(|_| ()),
            None => Ok(()),
        }
    }

    fn fitted(&self, dim: usize) -> Result<&Statistics> {
        let stats = self.stats.as_ref().ok_or(DeepFeatError::NotFitted)?;
        let fitted_dim = stats.dim()?;
        if fitted_dim != dim {
            return Err(DeepFeatError::InvalidArgument(format!(
                "normalizer fitted on {} features, got {}",
                fitted_dim, dim
            )));
        }
        Ok(stats)
    }
}

/// Stack sample features into a `[n_samples, n_features]` matrix
pub(crate) fn stack_features<E>(samples: &[Sample<E>]) -> Result<Array2<f32>> {
    let first = samples.first().ok_or(DeepFeatError::NoTrainingData)?;
    let dim = first.num_features();
    let mut data = Array2::zeros((samples.len(), dim));

    for (i, sample) in samples.iter().enumerate() {
        if sample.num_features() != dim {
            return Err(DeepFeatError::InvalidArgument(format!(
                "sample {} has {} features, expected {}",
                i,
                sample.num_features(),
                dim
            )));
        }
        data.row_mut(i).assign(sample.features());
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn samples() -> Vec<Sample<usize>> {
        vec![
            Sample::new(0, array![1.0, 10.0, 5.0]),
            Sample::new(1, array![3.0, 30.0, 5.0]),
            Sample::new(2, array![2.0, 20.0, 5.0]),
            Sample::new(3, array![5.0, 0.0, 5.0]),
        ]
    }

    #[test]
    fn test_min_max_on_fitted_data() {
        let mut data = samples();
        let mut normalizer = Normalizer::new(NormalizationMethod::MinMax);
        normalizer.fit(&data).unwrap();
        normalizer.apply(&mut data).unwrap();

        let matrix = stack_features(&data).unwrap();
        for col in 0..2 {
            let column = matrix.column(col);
            let min = column.fold(f32::INFINITY, |a, &b| a.min(b));
            let max = column.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            assert!((min - 0.0).abs() < 1e-6);
            assert!((max - 1.0).abs() < 1e-6);
        }
        // Constant dimension collapses to zero instead of dividing by zero
        assert!(matrix.column(2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_standardize_zero_mean_unit_variance() {
        let mut data = samples();
        let mut normalizer = Normalizer::new(NormalizationMethod::Standardize);
        normalizer.fit(&data).unwrap();
        normalizer.apply(&mut data).unwrap();

        let matrix = stack_features(&data).unwrap();
        let mean = matrix.mean_axis(Axis(0)).unwrap();
        let std = matrix.std_axis(Axis(0), 0.0);
        for col in 0..2 {
            assert!(mean[col].abs() < 1e-5);
            assert!((std[col] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_apply_before_fit() {
        let mut data = samples();
        let normalizer = Normalizer::new(NormalizationMethod::MinMax);
        assert!(matches!(normalizer.apply(&mut data), Err(DeepFeatError::NotFitted)));

        let mut features = array![1.0, 2.0, 3.0];
        assert!(matches!(normalizer.transform(&mut features), Err(DeepFeatError::NotFitted)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut normalizer = Normalizer::new(NormalizationMethod::MinMax);
        normalizer.fit(&samples()).unwrap();
        let mut features = array![1.0, 2.0];
        assert!(matches!(
            normalizer.transform(&mut features),
            Err(DeepFeatError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_matrix_and_vector_agree() {
        let data = samples();
        let mut normalizer = Normalizer::new(NormalizationMethod::Standardize);
        normalizer.fit(&data).unwrap();

        let mut matrix = stack_features(&data).unwrap();
        normalizer.transform_matrix(&mut matrix).unwrap();

        let mut row = data[1].features().clone();
        normalizer.transform(&mut row).unwrap();
        assert_eq!(matrix.row(1), row);
    }

    #[test]
    fn test_fit_on_empty() {
        let mut normalizer = Normalizer::new(NormalizationMethod::MinMax);
        let empty: Vec<Sample<usize>> = Vec::new();
        assert!(matches!(normalizer.fit(&empty), Err(DeepFeatError::NoTrainingData)));
    }

    #[test]
    fn test_inconsistent_statistics_rejected() {
        let ragged = Normalizer {
            method: NormalizationMethod::MinMax,
            stats: Some(Statistics::MinMax {
                min: array![0.0, 0.0, 0.0, 0.0],
                max: array![1.0, 1.0, 1.0],
            }),
        };
        assert!(matches!(ragged.validate(4), Err(DeepFeatError::InvalidArgument(_))));
        let mut features = array![0.5, 0.5, 0.5, 0.5];
        assert!(ragged.transform(&mut features).is_err());

        let mismatched = Normalizer {
            method: NormalizationMethod::MinMax,
            stats: Some(Statistics::Standardize {
                mean: array![0.0, 0.0, 0.0],
                std: array![1.0, 1.0, 1.0],
            }),
        };
        assert!(mismatched.validate(3).is_err());

        let mut fitted = Normalizer::new(NormalizationMethod::Standardize);
        fitted.fit(&samples()).unwrap();
        assert!(fitted.validate(3).is_ok());
        assert!(fitted.validate(4).is_err());
        assert!(Normalizer::new(NormalizationMethod::MinMax).validate(7).is_ok());
    }
}
