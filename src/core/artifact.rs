//! Checksummed on-disk model artifact
//!
//! Layout:
//!
//! ```text
//! deepfeat-model/1\n
//! <hex sha-256 of body>\n
//! <json body: network state + optional normalizer>
//! ```

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::data::Normalizer;
use crate::nn::{Network, NetworkState};
use crate::{DeepFeatError, Result};

const MAGIC: &str = "deepfeat-model/1";

/// Network weights, updater state and the fitted normalizer, persisted
/// together so training and feature extraction can resume after a reload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Parameters, optimizer state and configuration
    pub network: NetworkState,
    /// Normalizer in use when the model was saved
    pub normalizer: Option<Normalizer>,
}

fn corrupt(msg: impl Into<String>) -> DeepFeatError {
    DeepFeatError::CorruptArtifact(msg.into())
}

fn split_line(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == b'\n')?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

fn hex_digest(body: &[u8]) -> String {
    Sha256::digest(body)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl ModelArtifact {
    /// Capture a network and its normalizer
    pub fn new(network: &Network, normalizer: Option<&Normalizer>) -> Self {
        ModelArtifact {
            network: network.state(),
            normalizer: normalizer.cloned(),
        }
    }

    /// Serialize to any writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        let body = serde_json::to_vec(self).map_err(io::Error::from)?;
        writeln!(writer, "{}", MAGIC)?;
        writeln!(writer, "{}", hex_digest(&body))?;
        writer.write_all(&body)?;
        writer.flush()?;
        Ok(())
    }

    /// Deserialize from any reader, verifying header and checksum
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let (header, rest) = split_line(&bytes).ok_or_else(|| corrupt("missing header"))?;
        if header != MAGIC.as_bytes() {
            return Err(corrupt(format!(
                "unexpected header {:?}",
                String::from_utf8_lossy(header)
            )));
        }
        let (digest, body) = split_line(rest).ok_or_else(|| corrupt("missing checksum"))?;
        if digest != hex_digest(body).as_bytes() {
            return Err(corrupt("checksum mismatch"));
        }

        serde_json::from_slice(body).map_err(|e| corrupt(e.to_string()))
    }

    /// Write to `path` through a temporary sibling file and a rename, so a
    /// failed save never leaves a half-written artifact behind
    pub fn save_atomic(&self, path: &Path) -> Result<()> {
        let file_name = path.file_name().ok_or_else(|| {
            DeepFeatError::InvalidArgument(format!("{} is not a file path", path.display()))
        })?;
        let partial = path.with_file_name(format!(".{}.partial", file_name.to_string_lossy()));

        let written = File::create(&partial).map_err(DeepFeatError::from).and_then(|file| {
            let mut writer = BufWriter::new(file);
            self.write_to(&mut writer)?;
            writer.into_inner().map_err(io::Error::from)?.sync_all()?;
            Ok(())
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        fs::rename(&partial, path)?;
        Ok(())
    }

    /// Read an artifact from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read_from(&mut reader)
    }

    /// Rebuild the network, treating inconsistent state as corruption.
    /// The normalizer must match the network's input width.
    pub fn into_parts(self) -> Result<(Network, Option<Normalizer>)> {
        let as_corrupt = |e: DeepFeatError| match e {
            DeepFeatError::InvalidArgument(msg) => corrupt(msg),
            other => other,
        };
        let network = Network::from_state(self.network).map_err(as_corrupt)?;
        if let Some(normalizer) = &self.normalizer {
            normalizer
                .validate(network.config().n_in())
                .map_err(as_corrupt)?;
        }
        Ok((network, self.normalizer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AutoEncoderProducer, ConfigurationProducer, Hyperparameters};
    use crate::data::{NormalizationMethod, Sample};
    use ndarray::Array1;

    fn artifact() -> ModelArtifact {
        let config = AutoEncoderProducer::new(4, 2)
            .unwrap()
            .build_configuration(&Hyperparameters::default())
            .unwrap();
        let network = Network::new(config).unwrap();
        ModelArtifact::new(&network, Some(&Normalizer::new(NormalizationMethod::MinMax)))
    }

    fn encoded(artifact: &ModelArtifact) -> Vec<u8> {
        let mut bytes = Vec::new();
        artifact.write_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_stream_roundtrip() {
        let original = artifact();
        let bytes = encoded(&original);
        let restored = ModelArtifact::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(restored, original);
        assert!(restored.into_parts().is_ok());
    }

    #[test]
    fn test_tampered_body_detected() {
        let mut bytes = encoded(&artifact());
        let last = bytes.len() - 2;
        bytes[last] ^= 0x01;
        assert!(matches!(
            ModelArtifact::read_from(&mut bytes.as_slice()),
            Err(DeepFeatError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_foreign_file_rejected() {
        let mut bytes: &[u8] = b"PK\x03\x04 not a model\n";
        assert!(matches!(
            ModelArtifact::read_from(&mut bytes),
            Err(DeepFeatError::CorruptArtifact(_))
        ));

        let mut empty: &[u8] = b"";
        assert!(matches!(
            ModelArtifact::read_from(&mut empty),
            Err(DeepFeatError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_inconsistent_state_is_corrupt() {
        let mut broken = artifact();
        broken.network.params.pop();
        assert!(matches!(
            broken.into_parts(),
            Err(DeepFeatError::CorruptArtifact(_))
        ));
    }

    fn fitted_normalizer(dim: usize) -> Normalizer {
        let samples: Vec<Sample<usize>> = (0..3)
            .map(|i| Sample::new(i, Array1::from_elem(dim, i as f32)))
            .collect();
        let mut normalizer = Normalizer::new(NormalizationMethod::MinMax);
        normalizer.fit(&samples).unwrap();
        normalizer
    }

    #[test]
    fn test_malformed_normalizer_is_corrupt() {
        let mut value = serde_json::to_value(ModelArtifact {
            normalizer: Some(fitted_normalizer(4)),
            ..artifact()
        })
        .unwrap();
        value["normalizer"]["stats"]["MinMax"]["max"] =
            serde_json::json!({ "v": 1, "dim": [3], "data": [1.0, 1.0, 1.0] });
        let ragged: ModelArtifact = serde_json::from_value(value).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ragged.model");
        ragged.save_atomic(&path).unwrap();
        assert!(matches!(
            ModelArtifact::load(&path).unwrap().into_parts(),
            Err(DeepFeatError::CorruptArtifact(_))
        ));
    }

    #[test]
    fn test_normalizer_width_must_match_network() {
        let wrong_width = ModelArtifact {
            normalizer: Some(fitted_normalizer(3)),
            ..artifact()
        };
        assert!(matches!(
            wrong_width.into_parts(),
            Err(DeepFeatError::CorruptArtifact(_))
        ));

        let matching = ModelArtifact {
            normalizer: Some(fitted_normalizer(4)),
            ..artifact()
        };
        assert!(matching.into_parts().unwrap().1.is_some());
    }

    #[test]
    fn test_atomic_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.model");
        let original = artifact();

        original.save_atomic(&path).unwrap();
        assert!(!dir.path().join(".network.model.partial").exists());
        assert_eq!(ModelArtifact::load(&path).unwrap(), original);
    }

    #[test]
    fn test_missing_file_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ModelArtifact::load(&dir.path().join("absent.model")),
            Err(DeepFeatError::IoFailure(_))
        ));
    }
}
