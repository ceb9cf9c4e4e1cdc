//! The training driver: a linear, synchronous phase chain. Each step
//! consumes the previous phase and returns the next, so configuration must
//! be loaded before the dataset, the dataset before the model, and the
//! model before summaries or training. Calling out of order does not
//! compile.

use burn::tensor::backend::AutodiffBackend;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::checkpoint::CheckpointManager;
use crate::config::ModelConfiguration;
use crate::data::{DataLoader, PreparedDataset};
use crate::error::{PipelineError, Result};
use crate::model::{DigitRecognizer, ModelSummary};
use crate::training::Trainer;

/// How many parameter snapshots each version's checkpoint lineage retains.
pub const RETAINED_SNAPSHOTS: usize = 3;

/// Whether the model is being prepared for further training or for
/// inference only. Predict restores the latest checkpoint; train starts
/// from the initialized parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Predict,
}

impl FromStr for Mode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Mode::Train),
            "predict" => Ok(Mode::Predict),
            other => Err(PipelineError::InvalidArgument(format!(
                "mode must be 'train' or 'predict', got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Predict => write!(f, "predict"),
        }
    }
}

pub fn checkpoint_directory(home: &Path, version: &str) -> PathBuf {
    home.join("models")
        .join("digit_recognizer")
        .join(format!("v{version}"))
        .join("checkpoints")
}

pub fn reports_directory(home: &Path, version: &str) -> PathBuf {
    home.join("models")
        .join("digit_recognizer")
        .join(format!("v{version}"))
        .join("reports")
}

/// Entry phase: a version bound to a home directory, nothing loaded yet.
///
/// The home directory is passed in explicitly rather than read from the
/// process environment inside the library; the binary resolves it once.
#[derive(Debug)]
pub struct TrainingDriver {
    version: String,
    home: PathBuf,
}

impl TrainingDriver {
    pub fn new(version: impl Into<String>, home: PathBuf) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(PipelineError::InvalidArgument(
                "model version must be a non-empty string".into(),
            ));
        }
        Ok(Self { version, home })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Loads and validates this version's configuration from
    /// `<home>/configs/models/digit_recognizer/v<version>.json`.
    pub fn load_configuration(self) -> Result<ConfiguredDriver> {
        let config = ModelConfiguration::load(&self.home, &self.version)?;
        info!("Loaded configuration for version {}", self.version);
        Ok(ConfiguredDriver {
            version: self.version,
            home: self.home,
            config,
        })
    }
}

/// Configuration loaded; dataset not yet prepared.
pub struct ConfiguredDriver {
    version: String,
    home: PathBuf,
    config: ModelConfiguration,
}

impl ConfiguredDriver {
    pub fn configuration(&self) -> &ModelConfiguration {
        &self.config
    }

    /// Ingests the CSV, splits it per the configured ratios, and wraps each
    /// partition in a batched view.
    pub fn load_dataset<B: AutodiffBackend>(
        self,
        device: &B::Device,
    ) -> Result<DatasetReadyDriver<B>> {
        let dataset = PreparedDataset::prepare(&self.home, &self.config, device)?;
        Ok(DatasetReadyDriver {
            version: self.version,
            home: self.home,
            config: self.config,
            dataset,
        })
    }
}

/// Dataset prepared; model not yet built.
pub struct DatasetReadyDriver<B: AutodiffBackend> {
    version: String,
    home: PathBuf,
    config: ModelConfiguration,
    dataset: PreparedDataset<B>,
}

impl<B: AutodiffBackend> DatasetReadyDriver<B> {
    /// Builds the model and optimizer from the configuration and binds the
    /// checkpoint manager to this version's directory. In predict mode the
    /// most recent snapshot is restored; an empty checkpoint directory
    /// leaves the fresh initialization in place.
    pub fn load_model(self, mode: Mode, device: &B::Device) -> Result<ModelReadyDriver<B>> {
        let learning_rate = self.config.model.optimizer.learning_rate()?;

        let model = DigitRecognizer::new(self.config.model.architecture.clone(), device);

        let checkpoints = CheckpointManager::keep_last(
            checkpoint_directory(&self.home, &self.version),
            RETAINED_SNAPSHOTS,
        );

        let (model, restored_step) = match mode {
            Mode::Predict => checkpoints.restore_latest(model, device)?,
            Mode::Train => (model, None),
        };

        let trainer = Trainer::new(model, learning_rate, device);

        info!("Finished loading model for current configuration.");

        Ok(ModelReadyDriver {
            version: self.version,
            home: self.home,
            config: self.config,
            dataset: self.dataset,
            trainer,
            checkpoints,
            restored_step,
            best_validation_loss: None,
        })
    }
}

/// Model, optimizer, and checkpoint manager in place; ready to summarize,
/// train, or evaluate.
pub struct ModelReadyDriver<B: AutodiffBackend> {
    version: String,
    home: PathBuf,
    config: ModelConfiguration,
    dataset: PreparedDataset<B>,
    trainer: Trainer<B>,
    checkpoints: CheckpointManager,
    restored_step: Option<usize>,
    best_validation_loss: Option<f64>,
}

impl<B: AutodiffBackend> ModelReadyDriver<B> {
    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    /// The step of the snapshot restored at load time, if any.
    pub fn restored_step(&self) -> Option<usize> {
        self.restored_step
    }

    pub fn best_validation_loss(&self) -> Option<f64> {
        self.best_validation_loss
    }

    /// Logs the layer-by-layer summary and, when `plot` is set, renders the
    /// structural diagram to `<reports>/model_plot.png`. The reports
    /// directory is created on demand either way.
    pub fn generate_summary_and_plot(&self, plot: bool) -> Result<ModelSummary> {
        let summary = ModelSummary::new(self.trainer.model().architecture());
        info!("Model summary:\n{}", summary);

        let reports = reports_directory(&self.home, &self.version);
        fs::create_dir_all(&reports)?;

        if plot {
            let plot_path = reports.join("model_plot.png");
            summary.render_plot(&plot_path)?;
            info!("Finished saving model plot at {:?}.", plot_path);
        }

        Ok(summary)
    }

    /// Runs the configured number of epochs: training steps over the train
    /// partition, a validation pass, best-loss tracking, and a snapshot per
    /// epoch (the manager prunes beyond the retained count).
    pub fn train(&mut self) -> Result<()> {
        let epochs = self.config.training.epochs;
        let log_every = self.config.training.log_every;

        for epoch in 1..=epochs {
            self.dataset.train.reset();
            let mut step = 0usize;
            let mut running_loss = 0.0f32;

            while let Some(batch) = self.dataset.train.next_batch()? {
                let loss = self.trainer.train_step(batch);
                running_loss += loss;
                step += 1;
                if step % log_every == 0 {
                    info!(
                        "Epoch {}/{} step {}: loss = {:.6} (avg {:.6})",
                        epoch,
                        epochs,
                        step,
                        loss,
                        running_loss / step as f32
                    );
                }
            }

            let (validation_loss, accuracy) = self.validation_pass()?;
            let improved = self
                .best_validation_loss
                .map_or(true, |best| f64::from(validation_loss) < best);
            if improved {
                self.best_validation_loss = Some(f64::from(validation_loss));
            }

            info!(
                "Epoch {}/{}: validation loss = {:.6}, accuracy = {:.2}%{}",
                epoch,
                epochs,
                validation_loss,
                accuracy * 100.0,
                if improved { " (improved)" } else { "" }
            );

            self.checkpoints.save(self.trainer.model(), epoch)?;
        }

        Ok(())
    }

    fn validation_pass(&mut self) -> Result<(f32, f32)> {
        self.dataset.validation.reset();
        let mut total_loss = 0.0f32;
        let mut batches = 0usize;
        let mut correct = 0usize;
        let mut total = 0usize;

        while let Some(batch) = self.dataset.validation.next_batch()? {
            let output = self.trainer.validate(&batch);
            total_loss += output.loss;
            batches += 1;
            correct += output.correct;
            total += output.total;
        }

        if batches == 0 {
            return Err(PipelineError::Dataset(
                "validation partition is empty".into(),
            ));
        }

        Ok((
            total_loss / batches as f32,
            correct as f32 / total.max(1) as f32,
        ))
    }

    /// Accuracy over the held-out test partition.
    pub fn evaluate(&mut self) -> Result<f32> {
        self.dataset.test.reset();
        let mut correct = 0usize;
        let mut total = 0usize;

        while let Some(batch) = self.dataset.test.next_batch()? {
            let output = self.trainer.validate(&batch);
            correct += output.correct;
            total += output.total;
        }

        if total == 0 {
            return Err(PipelineError::Dataset("test partition is empty".into()));
        }

        let accuracy = correct as f32 / total as f32;
        info!(
            "Test accuracy: {:.2}% ({}/{} correct)",
            accuracy * 100.0,
            correct,
            total
        );
        Ok(accuracy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfiguration;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use std::io::Write;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    const TEST_CONFIG: &str = r#"{
        "model": {
            "architecture": {
                "image_height": 4,
                "image_width": 4,
                "image_channels": 1,
                "num_classes": 10,
                "conv_blocks": [{"filters": 4, "kernel_size": 3}],
                "dense_units": 8,
                "dropout": 0.1
            },
            "optimizer": {"learning_rate": 0.001}
        },
        "dataset": {
            "csv_path": "data/train.csv",
            "validation_split": 0.2,
            "test_split": 0.2,
            "batch_size": 4,
            "seed": 3
        },
        "training": {"epochs": 1, "log_every": 1}
    }"#;

    fn setup_home(version: &str) -> TempDir {
        let home = TempDir::new().unwrap();

        let config_path = ModelConfiguration::path_for(home.path(), version);
        fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        fs::write(config_path, TEST_CONFIG).unwrap();

        let data_dir = home.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let mut csv = fs::File::create(data_dir.join("train.csv")).unwrap();
        writeln!(csv, "label,p0,p1,p2,p3,p4,p5,p6,p7,p8,p9,p10,p11,p12,p13,p14,p15").unwrap();
        for i in 0..30 {
            write!(csv, "{}", i % 10).unwrap();
            for p in 0..16 {
                write!(csv, ",{}", (i * 7 + p * 13) % 256).unwrap();
            }
            writeln!(csv).unwrap();
        }

        home
    }

    fn loaded_driver(home: &Path, mode: Mode) -> ModelReadyDriver<TestBackend> {
        let device = Default::default();
        TrainingDriver::new("1", home.to_path_buf())
            .unwrap()
            .load_configuration()
            .unwrap()
            .load_dataset::<TestBackend>(&device)
            .unwrap()
            .load_model(mode, &device)
            .unwrap()
    }

    #[test]
    fn empty_version_is_rejected() {
        let err = TrainingDriver::new("", PathBuf::from(".")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[test]
    fn mode_parses_exactly_two_values() {
        assert_eq!("train".parse::<Mode>().unwrap(), Mode::Train);
        assert_eq!("predict".parse::<Mode>().unwrap(), Mode::Predict);
        for bad in ["infer", "TRAIN", "", "evaluate"] {
            assert!(matches!(
                bad.parse::<Mode>(),
                Err(PipelineError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn train_mode_binds_checkpoint_directory_without_restoring() {
        let home = setup_home("1");
        let driver = loaded_driver(home.path(), Mode::Train);

        assert_eq!(
            driver.checkpoints().directory(),
            home.path()
                .join("models")
                .join("digit_recognizer")
                .join("v1")
                .join("checkpoints")
        );
        assert_eq!(driver.restored_step(), None);
        assert_eq!(driver.best_validation_loss(), None);
    }

    #[test]
    fn predict_mode_with_empty_directory_keeps_fresh_parameters() {
        let home = setup_home("1");
        let driver = loaded_driver(home.path(), Mode::Predict);
        assert_eq!(driver.restored_step(), None);
    }

    #[test]
    fn predict_mode_restores_most_recent_snapshot() {
        let home = setup_home("1");

        // Prepopulate snapshots at steps 10, 20, 30.
        {
            let trained = loaded_driver(home.path(), Mode::Train);
            let manager = CheckpointManager::keep_last(
                checkpoint_directory(home.path(), "1"),
                RETAINED_SNAPSHOTS,
            );
            for step in [10, 20, 30] {
                manager.save(trained.trainer.model(), step).unwrap();
            }
        }

        let driver = loaded_driver(home.path(), Mode::Predict);
        assert_eq!(driver.restored_step(), Some(30));
    }

    #[test]
    fn plot_flag_controls_diagram_file() {
        let home = setup_home("1");
        let driver = loaded_driver(home.path(), Mode::Train);

        let plot_path = reports_directory(home.path(), "1").join("model_plot.png");

        driver.generate_summary_and_plot(false).unwrap();
        assert!(!plot_path.exists());
        // Reports directory exists even without the plot.
        assert!(reports_directory(home.path(), "1").is_dir());

        driver.generate_summary_and_plot(true).unwrap();
        assert!(plot_path.is_file());
    }

    #[test]
    fn training_saves_bounded_snapshots_and_tracks_best_loss() {
        let home = setup_home("1");
        let mut driver = loaded_driver(home.path(), Mode::Train);

        driver.train().unwrap();

        assert!(driver.best_validation_loss().is_some());
        let snapshots = driver.checkpoints().list().unwrap();
        assert!(!snapshots.is_empty());
        assert!(snapshots.len() <= RETAINED_SNAPSHOTS);

        let accuracy = driver.evaluate().unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
    }
}
