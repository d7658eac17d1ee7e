//! Train the autoencoder on synthetic measured cells
//!
//! Run with `RUST_LOG=info cargo run --example train_autoencoder`.

use deepfeat::prelude::*;
use deepfeat::utils::timing::Timer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

/// A detected object with named measurements
#[derive(Clone, Debug)]
struct Cell {
    id: usize,
    measurements: Vec<(String, f64)>,
}

impl MeasurementSource for Cell {
    fn measurement_names(&self) -> Vec<String> {
        self.measurements.iter().map(|(name, _)| name.clone()).collect()
    }

    fn measurement_value(&self, name: &str) -> Option<f64> {
        self.measurements
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }
}

const MEASUREMENTS: [&str; 6] = [
    "Area",
    "Perimeter",
    "Circularity",
    "Eccentricity",
    "Mean intensity",
    "Max intensity",
];

fn synthetic_cells(n: usize, rng: &mut StdRng) -> Vec<(Cell, usize)> {
    (0..n)
        .map(|id| {
            // Class 1 cells are larger, rounder and brighter
            let class = rng.gen_range(0..2);
            let scale = 1.0 + class as f64;
            let measurements = MEASUREMENTS
                .iter()
                .map(|name| (name.to_string(), scale * 10.0 + rng.gen_range(-4.0..4.0)))
                .collect();
            (Cell { id, measurements }, class)
        })
        .collect()
}

fn main() -> deepfeat::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut rng = StdRng::seed_from_u64(7);
    let selection = MeasurementSelection::All;
    let samples = synthetic_cells(200, &mut rng)
        .into_iter()
        .map(|(cell, class)| {
            Ok(Sample::from_measurements(cell, &selection).with_label(Sample::<Cell>::one_hot(class, 2)?))
        })
        .collect::<deepfeat::Result<Vec<_>>>()?;

    let producer = AutoEncoderProducer::new(MEASUREMENTS.len(), 2)?;
    let mut manager = NetworkManager::new(samples, producer, ManagerConfig::default())?;
    println!("=== {} ({}) ===", manager.name(), manager.description());

    manager.split_train_test(0.8)?;
    manager.normalize(NormalizationMethod::Standardize)?;
    manager.build_configuration(&Hyperparameters {
        iterations: 10,
        learning_rate: 0.1,
        seed: None,
    })?;
    manager.create_model()?;

    let timer = Timer::new("training");
    manager.fit(10)?;
    println!("Trained in {:.2}s", timer.elapsed());

    if let EvaluationOutcome::Evaluated(evaluation) = manager.evaluate()? {
        println!("{}", evaluation.stats());
    }

    let query = manager.test_set()[0].clone();
    let embedding = manager.activate_up_to_layer(0, &query)?;
    println!(
        "Cell {} encodes to {:.3}",
        query.entity().id,
        embedding[embedding.len() - 1]
    );

    let embeddings = manager.extract_features(0, manager.test_set())?;
    println!(
        "Extracted {} test embeddings of width {}",
        embeddings.len(),
        embeddings.first().map_or(0, |object| object.features().len())
    );

    let dir = std::env::temp_dir().join("deepfeat-demo");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("autoencoder.model");
    manager.save(Some(&path))?;
    println!("Saved model to {}", path.display());

    Ok(())
}
