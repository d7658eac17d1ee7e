//! Feature extraction from entity measurements and raster regions

use ndarray::Array1;
use crate::data::Sample;
use crate::{DeepFeatError, Result};

/// Entities that carry an ordered list of named scalar measurements
pub trait MeasurementSource {
    /// Measurement names in iteration order
    fn measurement_names(&self) -> Vec<String>;

    /// Value of a named measurement, `None` if absent
    fn measurement_value(&self, name: &str) -> Option<f64>;
}

/// Which measurements become features
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementSelection {
    /// Every measurement the entity has
    All,
    /// Only the named measurements
    Named(Vec<String>),
}

impl MeasurementSelection {
    fn contains(&self, name: &str) -> bool {
        match self {
            MeasurementSelection::All => true,
            MeasurementSelection::Named(names) => names.iter().any(|n| n == name),
        }
    }
}

/// Pixel data read for an entity's region, already downsampled
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRegion {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Channels per pixel
    pub channels: usize,
    /// Row-major, channel-interleaved pixel values
    pub pixels: Vec<f32>,
}

impl RasterRegion {
    /// Create a region, checking the buffer against its dimensions
    pub fn new(width: usize, height: usize, channels: usize, pixels: Vec<f32>) -> Result<Self> {
        if width * height * channels != pixels.len() {
            return Err(DeepFeatError::InvalidArgument(format!(
                "pixel buffer of length {} does not match {}x{}x{}",
                pixels.len(),
                width,
                height,
                channels
            )));
        }
        Ok(RasterRegion {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Flatten to a feature vector
    pub fn to_features(&self) -> Array1<f32> {
        Array1::from_vec(self.pixels.clone())
    }
}

/// Entities with an associated raster region (image I/O lives behind this)
pub trait RasterSource {
    /// Read the region at the given downsample factor
    fn read_region(&self, downsample: f64) -> Result<RasterRegion>;
}

impl<E: MeasurementSource> Sample<E> {
    /// Build a sample from the entity's measurements.
    ///
    /// The feature vector follows the entity's measurement order and holds
    /// exactly the selected measurements it has. Missing values become NaN.
    pub fn from_measurements(entity: E, selection: &MeasurementSelection) -> Self {
        let features: Vec<f32> = entity
            .measurement_names()
            .iter()
            .filter(|name| selection.contains(name))
            .map(|name| {
                entity
                    .measurement_value(name)
                    .map(|v| v as f32)
                    .unwrap_or(f32::NAN)
            })
            .collect();

        Sample::new(entity, Array1::from_vec(features))
    }
}

impl<E: RasterSource> Sample<E> {
    /// Build a sample from the entity's raster region
    pub fn from_raster(entity: E, downsample: f64) -> Result<Self> {
        if downsample.is_nan() || downsample <= 0.0 {
            return Err(DeepFeatError::InvalidArgument(format!(
                "downsample must be positive, got {}",
                downsample
            )));
        }
        let region = entity.read_region(downsample)?;
        let features = region.to_features();
        Ok(Sample::new(entity, features))
    }
}
