//! Labeled feature vectors bound to domain entities

use ndarray::Array1;
use crate::{DeepFeatError, Result};

/// A single labeled feature vector tied to a domain entity.
///
/// The entity reference `E` is opaque to the library; it is only compared
/// (when checking partitions) and handed back to the caller. Features are
/// fixed after construction except for in-place normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<E> {
    entity: E,
    features: Array1<f32>,
    label: Option<Array1<f32>>,
}

impl<E> Sample<E> {
    /// Create an unlabeled sample
    pub fn new(entity: E, features: Array1<f32>) -> Self {
        Sample {
            entity,
            features,
            label: None,
        }
    }

    /// Create a labeled sample
    pub fn labeled(entity: E, features: Array1<f32>, label: Array1<f32>) -> Self {
        Sample {
            entity,
            features,
            label: Some(label),
        }
    }

    /// Attach a label, replacing any existing one
    pub fn with_label(mut self, label: Array1<f32>) -> Self {
        self.label = Some(label);
        self
    }

    /// One-hot class vector of length `n_classes` with a one at `class`
    pub fn one_hot(class: usize, n_classes: usize) -> Result<Array1<f32>> {
        if class >= n_classes {
            return Err(DeepFeatError::InvalidArgument(format!(
                "class {} out of range for {} classes",
                class, n_classes
            )));
        }
        let mut label = Array1::zeros(n_classes);
        label[class] = 1.0;
        Ok(label)
    }

    /// The entity this sample was extracted from
    pub fn entity(&self) -> &E {
        &self.entity
    }

    /// Feature vector
    pub fn features(&self) -> &Array1<f32> {
        &self.features
    }

    /// Label vector, if any
    pub fn label(&self) -> Option<&Array1<f32>> {
        self.label.as_ref()
    }

    /// Number of features
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    pub(crate) fn features_mut(&mut self) -> &mut Array1<f32> {
        &mut self.features
    }
}

/// High-level features learned by a network, still bound to the entity
/// they were extracted from
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureObject<E> {
    entity: E,
    layer: usize,
    features: Array1<f32>,
}

impl<E> FeatureObject<E> {
    /// Bind the activation of `layer` to `entity`
    pub fn new(entity: E, layer: usize, features: Array1<f32>) -> Self {
        FeatureObject {
            entity,
            layer,
            features,
        }
    }

    /// The entity the features describe
    pub fn entity(&self) -> &E {
        &self.entity
    }

    /// Layer whose activation these features are
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Feature vector
    pub fn features(&self) -> &Array1<f32> {
        &self.features
    }

    /// Split into entity and features
    pub fn into_inner(self) -> (E, Array1<f32>) {
        (self.entity, self.features)
    }
}
