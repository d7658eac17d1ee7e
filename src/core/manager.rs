//! Model lifecycle manager
//!
//! ```text
//! Unconfigured ──build_configuration──► Configured ──create_model──► Initialized
//!      Initialized ──fit──► Trained ──evaluate──► Evaluated
//!      load ──► Trained            save: side transition from Initialized on
//! ```

use std::path::Path;
use ndarray::{Array1, Array2, Axis};
use tracing::{info, warn};
use crate::core::{ConfigurationProducer, Hyperparameters, ManagerConfig, ModelArtifact};
use crate::data::{
    self, BatchLoader, FeatureObject, NormalizationMethod, Normalizer, Partitions, Sample,
};
use crate::nn::{Evaluation, Network, NetworkConfig, ScoreIterationListener, TrainingListener};
use crate::utils::timing::Timer;
use crate::{DeepFeatError, Result};

/// Lifecycle position of a [`NetworkManager`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LifecycleState {
    /// No configuration built
    Unconfigured,
    /// Configuration built, no model
    Configured,
    /// Model created with fresh weights
    Initialized,
    /// Model trained (or loaded)
    Trained,
    /// Trained model scored against the test partition
    Evaluated,
}

/// Result of [`NetworkManager::evaluate`]
#[derive(Clone, Debug, PartialEq)]
pub enum EvaluationOutcome {
    /// The test partition was scored
    Evaluated(Evaluation),
    /// There was nothing to evaluate against
    NotEvaluated,
}

/// Result of [`NetworkManager::save`] and [`NetworkManager::load`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistOutcome {
    /// The artifact was written or read
    Completed,
    /// No location was given; nothing happened
    Skipped,
}

/// Drives a network through configuration, training, evaluation and
/// persistence for samples of entity type `E`.
///
/// Batch loaders are materialized from the partitions on the first `fit` or
/// `evaluate` after a split. The normalizer in place at that moment is the
/// one they apply; fitting a new normalizer later leaves them untouched
/// until the data is split again.
pub struct NetworkManager<E, P> {
    producer: P,
    config: ManagerConfig,
    samples: Vec<Sample<E>>,
    partitions: Partitions<E>,
    normalizer: Option<Normalizer>,
    materialized: bool,
    training_loader: Option<BatchLoader>,
    test_loader: Option<BatchLoader>,
    network_config: Option<NetworkConfig>,
    network: Option<Network>,
    evaluation: Option<Evaluation>,
    state: LifecycleState,
}

impl<E: Clone, P: ConfigurationProducer> NetworkManager<E, P> {
    /// Create a manager over `samples`; until a split, all of them train
    pub fn new(samples: Vec<Sample<E>>, producer: P, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let partitions = Partitions {
            training: samples.clone(),
            test: Vec::new(),
        };
        Ok(NetworkManager {
            producer,
            config,
            samples,
            partitions,
            normalizer: None,
            materialized: false,
            training_loader: None,
            test_loader: None,
            network_config: None,
            network: None,
            evaluation: None,
            state: LifecycleState::Unconfigured,
        })
    }

    /// Split the original collection into training and test partitions
    /// using the configured seed.
    ///
    /// An existing normalizer is refitted on the new training partition, so
    /// test samples never contribute to its statistics.
    pub fn split_train_test(&mut self, train_fraction: f64) -> Result<()> {
        let partitions = data::split(&self.samples, train_fraction, self.config.seed)?;
        let normalizer = match &self.normalizer {
            Some(current) if partitions.training.is_empty() => {
                warn!("Training partition is empty; dropping the {:?} normalizer", current.method());
                None
            }
            Some(current) => {
                let mut refit = Normalizer::new(current.method());
                refit.fit(&partitions.training)?;
                info!(
                    "Refitted {:?} normalizer on {} training samples",
                    refit.method(),
                    partitions.training.len()
                );
                Some(refit)
            }
            None => None,
        };

        self.partitions = partitions;
        self.normalizer = normalizer;
        self.invalidate_loaders();
        info!(
            "Split {} samples into {} training and {} test samples",
            self.samples.len(),
            self.partitions.training.len(),
            self.partitions.test.len()
        );
        Ok(())
    }

    /// Fit a normalizer on the training partition
    pub fn normalize(&mut self, method: NormalizationMethod) -> Result<()> {
        info!("Normalizing data...");
        let mut normalizer = Normalizer::new(method);
        normalizer.fit(&self.partitions.training)?;
        if self.materialized {
            warn!("Normalizer fitted after batches were materialized; split again for it to take effect on training and test batches");
        }
        self.normalizer = Some(normalizer);
        Ok(())
    }

    fn invalidate_loaders(&mut self) {
        self.materialized = false;
        self.training_loader = None;
        self.test_loader = None;
    }

    fn ensure_loaders(&mut self) -> Result<()> {
        if self.materialized {
            return Ok(());
        }

        // Normalization is applied when, and only when, one was fitted
        let normalizer = self.normalizer.as_ref();
        let shuffle_seed = self.config.shuffle_batches.then_some(self.config.seed);
        let batch_size = self.config.batch_size;

        self.training_loader = if self.partitions.training.is_empty() {
            None
        } else {
            Some(BatchLoader::new(&self.partitions.training, normalizer, batch_size, shuffle_seed)?)
        };
        self.test_loader = if self.partitions.test.is_empty() {
            None
        } else {
            Some(BatchLoader::new(&self.partitions.test, normalizer, batch_size, None)?)
        };
        self.materialized = true;
        Ok(())
    }

    /// Build the network configuration through the producer.
    ///
    /// Calling this again replaces the stored configuration; an existing
    /// model keeps its weights until `create_model` runs again.
    pub fn build_configuration(&mut self, hyperparameters: &Hyperparameters) -> Result<()> {
        let mut hyperparameters = hyperparameters.clone();
        hyperparameters.seed.get_or_insert(self.config.seed);

        let config = self.producer.build_configuration(&hyperparameters)?;
        if self.network_config.is_some() {
            info!("Replacing the existing {} configuration", self.producer.name());
        }
        self.network_config = Some(config);
        if self.state == LifecycleState::Unconfigured {
            self.state = LifecycleState::Configured;
        }
        Ok(())
    }

    /// The stored network configuration
    pub fn configuration(&self) -> Result<&NetworkConfig> {
        self.network_config.as_ref().ok_or(DeepFeatError::NotConfigured)
    }

    /// Create the model from the stored configuration and attach the score
    /// reporter
    pub fn create_model(&mut self) -> Result<()> {
        let config = match &self.network_config {
            Some(config) => config.clone(),
            None => {
                info!("Configuration was not set. Could not create the model...");
                return Err(DeepFeatError::ConfigurationMissing);
            }
        };

        let mut network = Network::new(config)?;
        network.add_listener(Box::new(ScoreIterationListener::new(
            self.config.print_score_iterations,
        )));

        self.network = Some(network);
        self.evaluation = None;
        self.state = LifecycleState::Initialized;
        info!("Created neural network model.");
        Ok(())
    }

    /// Attach another training listener to the current model
    pub fn add_listener(&mut self, listener: Box<dyn TrainingListener>) -> Result<()> {
        self.require_network_mut("attach a listener")?.add_listener(listener);
        Ok(())
    }

    fn require_network(&self, action: &str) -> Result<&Network> {
        self.network.as_ref().ok_or_else(|| {
            info!("Model was not initialized - cannot {}.", action);
            DeepFeatError::ModelNotInitialized
        })
    }

    fn require_network_mut(&mut self, action: &str) -> Result<&mut Network> {
        self.network.as_mut().ok_or_else(|| {
            info!("Model was not initialized - cannot {}.", action);
            DeepFeatError::ModelNotInitialized
        })
    }

    /// Train for `epoch_count` full passes over the training partition.
    /// Non-positive counts train one epoch. Weights carry over between calls.
    pub fn fit(&mut self, epoch_count: i64) -> Result<()> {
        self.require_network("start training")?;
        self.ensure_loaders()?;

        let epochs = if epoch_count <= 0 { 1 } else { epoch_count as usize };
        let (network, loader) = match (self.network.as_mut(), self.training_loader.as_mut()) {
            (Some(network), Some(loader)) => (network, loader),
            _ => {
                info!("No training data available - cannot start training.");
                return Err(DeepFeatError::NoTrainingData);
            }
        };

        info!("Training model for {} epoch(s) on {} samples...", epochs, loader.len());
        let _timer = Timer::new("fit");
        for _ in 0..epochs {
            loader.reset();
            while let Some(batch) = loader.next_batch() {
                network.fit_batch(&batch)?;
            }
            network.finish_epoch();
        }

        self.evaluation = None;
        self.state = LifecycleState::Trained;
        info!("Model was trained");
        Ok(())
    }

    /// Train a single epoch
    pub fn fit_once(&mut self) -> Result<()> {
        self.fit(1)
    }

    /// Score the model against the test partition.
    ///
    /// Without a labeled test partition this is a logged no-op.
    pub fn evaluate(&mut self) -> Result<EvaluationOutcome> {
        self.require_network("evaluate")?;
        if self.state < LifecycleState::Trained {
            warn!("Evaluating a model that has not been trained");
        }
        self.ensure_loaders()?;

        let batch = match &self.test_loader {
            Some(loader) if loader.has_labels() => loader.full_batch(),
            Some(_) => {
                info!("Test samples carry no labels - nothing to evaluate.");
                return Ok(EvaluationOutcome::NotEvaluated);
            }
            None => {
                info!("This network was not tested. Either this was deliberate, or something went wrong...");
                return Ok(EvaluationOutcome::NotEvaluated);
            }
        };
        let labels = batch.labels.as_ref().ok_or(DeepFeatError::NoTrainingData)?;

        let _timer = Timer::new("evaluate");
        let predictions = self.require_network("evaluate")?.output(&batch.features)?;
        let mut evaluation = Evaluation::new(labels.ncols());
        evaluation.eval(labels, &predictions)?;

        info!("======== Neural network evaluated ========\n{}", evaluation.stats());
        self.evaluation = Some(evaluation.clone());
        self.state = LifecycleState::Evaluated;
        Ok(EvaluationOutcome::Evaluated(evaluation))
    }

    /// Persist the model, its updater state and the normalizer.
    /// `None` skips the save.
    pub fn save(&self, destination: Option<&Path>) -> Result<PersistOutcome> {
        let network = self.network.as_ref().ok_or_else(|| {
            info!("Model was not instantiated - could not be saved.");
            DeepFeatError::ModelNotInitialized
        })?;
        let path = match destination {
            Some(path) => path,
            None => {
                info!("No location selected - file was not saved !");
                return Ok(PersistOutcome::Skipped);
            }
        };

        ModelArtifact::new(network, self.normalizer.as_ref()).save_atomic(path)?;
        info!("Saved {} network to {}", self.producer.name(), path.display());
        Ok(PersistOutcome::Completed)
    }

    /// Replace the model with a persisted one. `None` skips the load.
    ///
    /// The artifact is assumed to hold a trained model. Its normalizer (or
    /// the absence of one) replaces the current one, and batches are
    /// materialized again on the next `fit` or `evaluate`.
    pub fn load(&mut self, source: Option<&Path>) -> Result<PersistOutcome> {
        let path = match source {
            Some(path) => path,
            None => {
                info!("No file selected - nothing was loaded !");
                return Ok(PersistOutcome::Skipped);
            }
        };

        let (mut network, normalizer) = ModelArtifact::load(path)?.into_parts()?;
        network.add_listener(Box::new(ScoreIterationListener::new(
            self.config.print_score_iterations,
        )));

        // The model only makes sense on inputs scaled the way it was trained
        match (&self.normalizer, &normalizer) {
            (Some(current), None) => warn!(
                "Artifact carries no normalizer; dropping the current {:?} normalizer",
                current.method()
            ),
            (Some(current), Some(loaded)) if current != loaded => {
                info!("Replacing the current normalizer with the one stored in the artifact")
            }
            _ => {}
        }
        self.normalizer = normalizer;
        self.invalidate_loaders();
        self.network_config = Some(network.config().clone());
        self.network = Some(network);
        self.evaluation = None;
        self.state = LifecycleState::Trained;
        info!("Loaded network from {}", path.display());
        Ok(PersistOutcome::Completed)
    }

    fn prepared_features(&self, sample: &Sample<E>) -> Result<Array1<f32>> {
        let mut features = sample.features().clone();
        if let Some(normalizer) = &self.normalizer {
            normalizer.transform(&mut features)?;
        }
        Ok(features)
    }

    /// Model output for one sample (normalized like the training data)
    pub fn infer(&self, sample: &Sample<E>) -> Result<Array1<f32>> {
        let network = self.require_network("infer")?;
        network.output_row(&self.prepared_features(sample)?)
    }

    /// Model output for several samples, one row each
    pub fn infer_batch(&self, samples: &[Sample<E>]) -> Result<Array2<f32>> {
        let network = self.require_network("infer")?;
        if samples.is_empty() {
            return Ok(Array2::zeros((0, network.config().n_out())));
        }
        let mut features = data::stack_features(samples)?;
        if let Some(normalizer) = &self.normalizer {
            normalizer.transform_matrix(&mut features)?;
        }
        network.output(&features)
    }

    /// Activations from the input up to and including `layer` for one
    /// sample, used to extract learned embeddings.
    ///
    /// A copy of the features is normalized first; without a fitted
    /// normalizer this fails with `NotFitted`.
    pub fn activate_up_to_layer(&self, layer: usize, sample: &Sample<E>) -> Result<Vec<Array1<f32>>> {
        let network = self.require_network("compute activations")?;
        let normalizer = self.normalizer.as_ref().ok_or_else(|| {
            info!("Normalization was never established - cannot compute activations.");
            DeepFeatError::NotFitted
        })?;

        let mut features = sample.features().clone();
        normalizer.transform(&mut features)?;
        let activations = network.feed_forward_to_layer(layer, &features.insert_axis(Axis(0)))?;
        Ok(activations
            .into_iter()
            .map(|a| a.index_axis_move(Axis(0), 0))
            .collect())
    }

    /// Activation of `layer` for every sample, bound to the sample's entity.
    ///
    /// Preconditions match [`activate_up_to_layer`](Self::activate_up_to_layer);
    /// an empty input yields an empty result.
    pub fn extract_features(&self, layer: usize, samples: &[Sample<E>]) -> Result<Vec<FeatureObject<E>>> {
        let network = self.require_network("extract features")?;
        let normalizer = self.normalizer.as_ref().ok_or_else(|| {
            info!("Normalization was never established - cannot extract features.");
            DeepFeatError::NotFitted
        })?;
        if layer >= network.num_layers() {
            return Err(DeepFeatError::InvalidArgument(format!(
                "layer {} out of range for a network with {} layers",
                layer,
                network.num_layers()
            )));
        }
        if samples.is_empty() {
            return Ok(Vec::new());
        }

        let mut features = data::stack_features(samples)?;
        normalizer.transform_matrix(&mut features)?;
        let activations = network
            .feed_forward_to_layer(layer, &features)?
            .pop()
            .ok_or_else(|| DeepFeatError::InvalidArgument("network produced no activations".to_string()))?;

        let extracted: Vec<FeatureObject<E>> = samples
            .iter()
            .zip(activations.rows())
            .map(|(sample, row)| FeatureObject::new(sample.entity().clone(), layer, row.to_owned()))
            .collect();
        tracing::debug!("Extracted layer {} features for {} entities", layer, extracted.len());
        Ok(extracted)
    }

    /// Output layer activation for one sample, normalized like
    /// [`activate_up_to_layer`](Self::activate_up_to_layer)
    pub fn activate_last_layer(&self, sample: &Sample<E>) -> Result<Array1<f32>> {
        let last = self.require_network("compute activations")?.num_layers() - 1;
        self.activate_up_to_layer(last, sample)?
            .pop()
            .ok_or_else(|| DeepFeatError::InvalidArgument("network produced no activations".to_string()))
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Architecture name
    pub fn name(&self) -> &str {
        self.producer.name()
    }

    /// Architecture description
    pub fn description(&self) -> &str {
        self.producer.description()
    }

    /// Manager configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The original sample collection
    pub fn samples(&self) -> &[Sample<E>] {
        &self.samples
    }

    /// Training partition
    pub fn training_set(&self) -> &[Sample<E>] {
        &self.partitions.training
    }

    /// Test partition
    pub fn test_set(&self) -> &[Sample<E>] {
        &self.partitions.test
    }

    /// Fitted normalizer, if any
    pub fn normalizer(&self) -> Option<&Normalizer> {
        self.normalizer.as_ref()
    }

    /// Current model, if any
    pub fn network(&self) -> Option<&Network> {
        self.network.as_ref()
    }

    /// Latest evaluation; cleared by `fit` and `load`
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AutoEncoderProducer;
    use crate::nn::CollectScoresListener;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;

    const FEATURES: usize = 6;

    /// Two well separated clusters on a 0-10 scale, alternating classes
    fn samples(n: usize) -> Vec<Sample<usize>> {
        let mut rng = StdRng::seed_from_u64(5);
        (0..n)
            .map(|i| {
                let class = i % 2;
                let features = Array1::from_shape_fn(FEATURES, |j| {
                    let high = (j < FEATURES / 2) == (class == 0);
                    let base = if high { 9.0 } else { 1.0 };
                    base + rng.gen_range(-0.5..0.5)
                });
                Sample::labeled(i, features, Sample::<usize>::one_hot(class, 2).unwrap())
            })
            .collect()
    }

    fn manager(n: usize) -> NetworkManager<usize, AutoEncoderProducer> {
        let config = ManagerConfig {
            batch_size: 16,
            ..Default::default()
        };
        NetworkManager::new(
            samples(n),
            AutoEncoderProducer::new(FEATURES, 2).unwrap(),
            config,
        )
        .unwrap()
    }

    fn hyperparameters() -> Hyperparameters {
        Hyperparameters {
            iterations: 5,
            learning_rate: 0.1,
            seed: None,
        }
    }

    fn initialized(n: usize) -> NetworkManager<usize, AutoEncoderProducer> {
        let mut manager = manager(n);
        manager.build_configuration(&hyperparameters()).unwrap();
        manager.create_model().unwrap();
        manager
    }

    fn entities(samples: &[Sample<usize>]) -> HashSet<usize> {
        samples.iter().map(|s| *s.entity()).collect()
    }

    #[test]
    fn test_split_and_activation_scenario() {
        let mut manager = initialized(100);
        manager.split_train_test(0.8).unwrap();

        assert_eq!(manager.training_set().len(), 80);
        assert_eq!(manager.test_set().len(), 20);
        assert!(entities(manager.training_set()).is_disjoint(&entities(manager.test_set())));

        let sample = manager.samples()[0].clone();
        assert!(matches!(
            manager.activate_up_to_layer(0, &sample),
            Err(DeepFeatError::NotFitted)
        ));

        manager.normalize(NormalizationMethod::MinMax).unwrap();
        let activations = manager.activate_up_to_layer(0, &sample).unwrap();
        assert_eq!(activations.len(), 2);
        assert_eq!(activations[0].len(), FEATURES);
        assert_eq!(activations[1].len(), FEATURES / 2);
        // The caller's sample is left as it was
        assert_eq!(sample.features(), manager.samples()[0].features());
    }

    #[test]
    fn test_lifecycle_order_errors() {
        let mut manager = manager(10);
        let sample = manager.samples()[0].clone();

        assert_eq!(manager.state(), LifecycleState::Unconfigured);
        assert!(matches!(manager.configuration(), Err(DeepFeatError::NotConfigured)));
        assert!(matches!(manager.create_model(), Err(DeepFeatError::ConfigurationMissing)));
        assert!(matches!(manager.fit(1), Err(DeepFeatError::ModelNotInitialized)));
        assert!(matches!(manager.evaluate(), Err(DeepFeatError::ModelNotInitialized)));
        assert!(matches!(manager.save(None), Err(DeepFeatError::ModelNotInitialized)));
        assert!(matches!(manager.infer(&sample), Err(DeepFeatError::ModelNotInitialized)));

        // Recoverable: configure, initialize and retry
        manager.build_configuration(&hyperparameters()).unwrap();
        assert_eq!(manager.state(), LifecycleState::Configured);
        manager.create_model().unwrap();
        assert_eq!(manager.state(), LifecycleState::Initialized);
        manager.fit(1).unwrap();
        assert_eq!(manager.state(), LifecycleState::Trained);
    }

    #[test]
    fn test_no_training_data() {
        let mut manager = NetworkManager::new(
            Vec::<Sample<usize>>::new(),
            AutoEncoderProducer::new(FEATURES, 2).unwrap(),
            ManagerConfig::default(),
        )
        .unwrap();
        manager.build_configuration(&hyperparameters()).unwrap();
        manager.create_model().unwrap();
        assert!(matches!(manager.fit(3), Err(DeepFeatError::NoTrainingData)));
        assert_eq!(manager.state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_evaluate_without_test_partition() {
        let mut manager = initialized(20);
        manager.fit(1).unwrap();
        assert_eq!(manager.evaluate().unwrap(), EvaluationOutcome::NotEvaluated);
        assert_eq!(manager.state(), LifecycleState::Trained);
        assert!(manager.evaluation().is_none());
    }

    #[test]
    fn test_fit_zero_behaves_like_fit_one() {
        let mut zero = initialized(40);
        let mut one = initialized(40);
        zero.fit(0).unwrap();
        one.fit(1).unwrap();

        let zero = zero.network().unwrap().state();
        let one = one.network().unwrap().state();
        assert_eq!(zero.updater.epoch, 1);
        assert_eq!(zero, one);
    }

    #[test]
    fn test_training_is_cumulative() {
        let mut manager = initialized(40);
        let listener = CollectScoresListener::new();
        let scores = listener.scores();
        manager.add_listener(Box::new(listener)).unwrap();

        manager.fit(2).unwrap();
        let after_two = manager.network().unwrap().iteration();
        manager.fit(1).unwrap();
        let network = manager.network().unwrap();

        // 40 samples in batches of 16 -> 3 batches, 5 iterations each
        assert_eq!(after_two, 2 * 3 * 5);
        assert_eq!(network.iteration(), 3 * 3 * 5);
        assert_eq!(network.epoch(), 3);
        assert_eq!(scores.lock().unwrap().len(), 45);
    }

    #[test]
    fn test_full_lifecycle_learns_clusters() {
        let mut manager = initialized(100);
        manager.split_train_test(0.8).unwrap();
        manager.normalize(NormalizationMethod::MinMax).unwrap();
        manager.fit(20).unwrap();

        let evaluation = match manager.evaluate().unwrap() {
            EvaluationOutcome::Evaluated(evaluation) => evaluation,
            EvaluationOutcome::NotEvaluated => panic!("test partition should be evaluated"),
        };
        assert_eq!(evaluation.count(), 20);
        assert!(evaluation.accuracy() > 0.8, "{}", evaluation.stats());
        assert_eq!(manager.state(), LifecycleState::Evaluated);

        // Retraining makes the evaluation stale
        manager.fit(1).unwrap();
        assert!(manager.evaluation().is_none());
        assert_eq!(manager.state(), LifecycleState::Trained);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoencoder.model");

        let mut trained = initialized(50);
        trained.split_train_test(0.8).unwrap();
        trained.normalize(NormalizationMethod::Standardize).unwrap();
        trained.fit(3).unwrap();
        assert_eq!(trained.save(Some(&path)).unwrap(), PersistOutcome::Completed);

        let query = Sample::new(999, array![8.0, 9.5, 8.7, 1.2, 0.8, 1.1]);
        let expected = trained.infer(&query).unwrap();

        let mut fresh = manager(0);
        assert_eq!(fresh.load(Some(&path)).unwrap(), PersistOutcome::Completed);
        assert_eq!(fresh.state(), LifecycleState::Trained);
        assert!(fresh.normalizer().is_some());

        let restored = fresh.infer(&query).unwrap();
        for (a, b) in expected.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
        assert_eq!(
            fresh.network().unwrap().iteration(),
            trained.network().unwrap().iteration()
        );
    }

    #[test]
    fn test_loaded_model_trains_incrementally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autoencoder.model");

        let mut trained = initialized(30);
        trained.fit(2).unwrap();
        trained.save(Some(&path)).unwrap();
        let iterations = trained.network().unwrap().iteration();

        let mut resumed = manager(30);
        resumed.load(Some(&path)).unwrap();
        resumed.fit(1).unwrap();
        assert!(resumed.network().unwrap().iteration() > iterations);
        assert_eq!(resumed.network().unwrap().epoch(), 3);
    }

    #[test]
    fn test_persistence_without_location_is_skipped() {
        let mut manager = initialized(10);
        assert_eq!(manager.save(None).unwrap(), PersistOutcome::Skipped);
        assert_eq!(manager.load(None).unwrap(), PersistOutcome::Skipped);
        assert_eq!(manager.state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_persistence_failures_surface() {
        let dir = tempfile::tempdir().unwrap();
        let mut manager = initialized(10);

        let missing_dir = dir.path().join("nope").join("model");
        assert!(matches!(
            manager.save(Some(&missing_dir)),
            Err(DeepFeatError::IoFailure(_))
        ));

        let garbage = dir.path().join("garbage.model");
        std::fs::write(&garbage, b"definitely not a model").unwrap();
        assert!(matches!(
            manager.load(Some(&garbage)),
            Err(DeepFeatError::CorruptArtifact(_))
        ));
        assert!(matches!(
            manager.load(Some(&dir.path().join("absent.model"))),
            Err(DeepFeatError::IoFailure(_))
        ));
        // A failed load leaves the current model in place
        assert_eq!(manager.state(), LifecycleState::Initialized);
    }

    #[test]
    fn test_rebuilding_configuration_replaces_it() {
        let mut manager = manager(10);
        manager.build_configuration(&hyperparameters()).unwrap();
        manager
            .build_configuration(&Hyperparameters::with_iterations(7))
            .unwrap();
        assert_eq!(manager.configuration().unwrap().iterations, 7);
        assert_eq!(manager.configuration().unwrap().seed, manager.config().seed);
        assert_eq!(manager.state(), LifecycleState::Configured);
    }

    #[test]
    fn test_late_normalizer_does_not_reach_materialized_batches() {
        let mut manager = initialized(20);
        manager.fit(1).unwrap();
        let raw = manager.training_loader.as_ref().unwrap().full_batch().features;

        manager.normalize(NormalizationMethod::MinMax).unwrap();
        manager.fit(1).unwrap();
        let still_raw = manager.training_loader.as_ref().unwrap().full_batch().features;
        assert_eq!(raw, still_raw);

        manager.split_train_test(0.5).unwrap();
        manager.fit(1).unwrap();
        let normalized = manager.training_loader.as_ref().unwrap().full_batch().features;
        assert!(normalized.iter().all(|&v| (-1e-6..=1.0 + 1e-6).contains(&v)));
    }

    #[test]
    fn test_split_leaves_original_collection() {
        let mut manager = manager(30);
        let before = manager.samples().to_vec();
        assert!(matches!(
            manager.split_train_test(1.0),
            Err(DeepFeatError::InvalidArgument(_))
        ));
        manager.split_train_test(0.5).unwrap();
        assert_eq!(manager.samples(), before.as_slice());
    }

    #[test]
    fn test_infer_batch_and_layer_bounds() {
        let mut manager = initialized(12);
        manager.normalize(NormalizationMethod::MinMax).unwrap();
        let samples = manager.samples()[..4].to_vec();

        let outputs = manager.infer_batch(&samples).unwrap();
        assert_eq!(outputs.dim(), (4, 2));
        let single = manager.infer(&samples[2]).unwrap();
        for (a, b) in outputs.row(2).iter().zip(single.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert_eq!(manager.infer_batch(&[]).unwrap().dim(), (0, 2));

        assert!(matches!(
            manager.activate_up_to_layer(2, &samples[0]),
            Err(DeepFeatError::InvalidArgument(_))
        ));
        let activations = manager.activate_up_to_layer(1, &samples[0]).unwrap();
        assert_eq!(activations.len(), 3);
        assert_eq!(manager.activate_last_layer(&samples[0]).unwrap(), activations[2]);
    }

    #[test]
    fn test_split_refits_normalizer_on_training_partition() {
        let mut manager = manager(100);
        manager.normalize(NormalizationMethod::Standardize).unwrap();
        let whole_collection = manager.normalizer().unwrap().clone();
        manager.split_train_test(0.8).unwrap();

        let mut training_only = Normalizer::new(NormalizationMethod::Standardize);
        training_only.fit(manager.training_set()).unwrap();
        assert_eq!(manager.normalizer(), Some(&training_only));
        assert_ne!(manager.normalizer(), Some(&whole_collection));

        // Nothing left to fit on: the normalizer is dropped
        let mut tiny = self::manager(1);
        tiny.normalize(NormalizationMethod::MinMax).unwrap();
        tiny.split_train_test(0.5).unwrap();
        assert!(tiny.training_set().is_empty());
        assert!(tiny.normalizer().is_none());
    }

    #[test]
    fn test_manager_trains_on_worker_thread() {
        fn assert_send<T: Send>() {}
        assert_send::<NetworkManager<usize, AutoEncoderProducer>>();

        let mut manager = initialized(20);
        let trained = std::thread::spawn(move || manager.fit(1).map(|_| manager))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(trained.state(), LifecycleState::Trained);
    }

    #[test]
    fn test_extract_features_keeps_entities() {
        let untrained = manager(5);
        let samples = untrained.samples().to_vec();
        assert!(matches!(
            untrained.extract_features(0, &samples),
            Err(DeepFeatError::ModelNotInitialized)
        ));

        let mut manager = initialized(30);
        let samples = manager.samples()[..5].to_vec();
        assert!(matches!(
            manager.extract_features(0, &samples),
            Err(DeepFeatError::NotFitted)
        ));

        manager.normalize(NormalizationMethod::MinMax).unwrap();
        manager.fit(1).unwrap();
        let extracted = manager.extract_features(0, &samples).unwrap();
        assert_eq!(extracted.len(), samples.len());
        for (object, sample) in extracted.iter().zip(&samples) {
            assert_eq!(object.entity(), sample.entity());
            assert_eq!(object.layer(), 0);
            assert_eq!(object.features().len(), FEATURES / 2);

            let single = manager.activate_up_to_layer(0, sample).unwrap();
            for (a, b) in object.features().iter().zip(single[1].iter()) {
                assert!((a - b).abs() < 1e-5);
            }
        }

        assert!(manager.extract_features(0, &[]).unwrap().is_empty());
        assert!(matches!(
            manager.extract_features(2, &samples),
            Err(DeepFeatError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_load_replaces_normalizer_with_stored_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.model");

        let mut raw = initialized(20);
        raw.fit(1).unwrap();
        raw.save(Some(&path)).unwrap();

        let mut normalized = initialized(20);
        normalized.normalize(NormalizationMethod::MinMax).unwrap();
        normalized.load(Some(&path)).unwrap();
        assert!(normalized.normalizer().is_none());

        let sample = raw.samples()[3].clone();
        assert_eq!(normalized.infer(&sample).unwrap(), raw.infer(&sample).unwrap());
    }
}
