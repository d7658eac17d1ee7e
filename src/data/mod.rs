//! Sample handling: feature extraction, splitting, normalization and batching
//!
//! Data moves through this module in a fixed order:
//!
//! ```text
//! entities ──► Sample::from_measurements / from_raster
//!          ──► split (seeded shuffle, training/test)
//!          ──► Normalizer::fit (training partition only)
//!          ──► BatchLoader (normalizer applied on materialization)
//! ```

mod sample;
mod features;
mod splitter;
mod normalizer;
mod loader;

pub use sample::{FeatureObject, Sample};
pub use features::{MeasurementSelection, MeasurementSource, RasterRegion, RasterSource};
pub use splitter::{split, Partitions};
pub use normalizer::{NormalizationMethod, Normalizer};
pub(crate) use normalizer::stack_features;
pub use loader::{Batch, BatchLoader};
