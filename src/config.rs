use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// One convolution stage of the recognizer: convolution followed by 2x2
/// max-pooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvBlockConfig {
    pub filters: usize,
    pub kernel_size: usize,
}

impl Default for ConvBlockConfig {
    fn default() -> Self {
        Self {
            filters: 32,
            kernel_size: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchitectureConfig {
    pub image_height: usize,
    pub image_width: usize,
    pub image_channels: usize,
    pub num_classes: usize,
    pub conv_blocks: Vec<ConvBlockConfig>,
    pub dense_units: usize,
    pub dropout: f64,
}

impl Default for ArchitectureConfig {
    fn default() -> Self {
        Self {
            image_height: 28,
            image_width: 28,
            image_channels: 1,
            num_classes: 10,
            conv_blocks: vec![
                ConvBlockConfig {
                    filters: 32,
                    kernel_size: 3,
                },
                ConvBlockConfig {
                    filters: 64,
                    kernel_size: 3,
                },
            ],
            dense_units: 128,
            dropout: 0.2,
        }
    }
}

impl ArchitectureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.image_height == 0 || self.image_width == 0 || self.image_channels == 0 {
            return Err(PipelineError::InvalidArgument(
                "image dimensions must be > 0".into(),
            ));
        }
        if self.num_classes < 2 {
            return Err(PipelineError::InvalidArgument(
                "num_classes must be >= 2".into(),
            ));
        }
        if self.conv_blocks.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "conv_blocks must not be empty".into(),
            ));
        }
        for block in &self.conv_blocks {
            if block.filters == 0 || block.kernel_size == 0 {
                return Err(PipelineError::InvalidArgument(
                    "conv block filters and kernel_size must be > 0".into(),
                ));
            }
        }
        if self.dense_units == 0 {
            return Err(PipelineError::InvalidArgument(
                "dense_units must be > 0".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PipelineError::InvalidArgument(
                "dropout must be within [0, 1)".into(),
            ));
        }
        // Each conv block halves the spatial dims via pooling.
        let min_dim = self.image_height.min(self.image_width);
        if min_dim >> self.conv_blocks.len() == 0 {
            return Err(PipelineError::InvalidArgument(format!(
                "{} conv blocks collapse a {}px image to nothing",
                self.conv_blocks.len(),
                min_dim
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    learning_rate: Option<f64>,
}

impl OptimizerConfig {
    /// The configured learning rate. The field carries no default: a
    /// configuration that omits it is rejected rather than silently trained
    /// with a made-up value.
    pub fn learning_rate(&self) -> Result<f64> {
        self.learning_rate
            .ok_or(PipelineError::ConfigFieldMissing(
                "model.optimizer.learning_rate",
            ))
    }

    pub fn validate(&self) -> Result<()> {
        let lr = self.learning_rate()?;
        if lr <= 0.0 || !lr.is_finite() {
            return Err(PipelineError::InvalidArgument(format!(
                "learning_rate must be a positive finite number, got {lr}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub architecture: ArchitectureConfig,
    pub optimizer: OptimizerConfig,
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        self.architecture.validate()?;
        self.optimizer.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub csv_path: String,
    pub validation_split: f64,
    pub test_split: f64,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            csv_path: "data/digit_recognizer/train.csv".into(),
            validation_split: 0.1,
            test_split: 0.1,
            batch_size: 64,
            seed: 11,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.csv_path.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "dataset.csv_path must not be empty".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::InvalidArgument(
                "dataset.batch_size must be > 0".into(),
            ));
        }
        for (name, ratio) in [
            ("validation_split", self.validation_split),
            ("test_split", self.test_split),
        ] {
            if !(0.0..1.0).contains(&ratio) {
                return Err(PipelineError::InvalidArgument(format!(
                    "dataset.{name} must be within [0, 1), got {ratio}"
                )));
            }
        }
        if self.validation_split + self.test_split >= 1.0 {
            return Err(PipelineError::InvalidArgument(
                "validation_split + test_split must leave room for training data".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            log_every: 100,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(PipelineError::InvalidArgument(
                "training.epochs must be > 0".into(),
            ));
        }
        if self.log_every == 0 {
            return Err(PipelineError::InvalidArgument(
                "training.log_every must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// The full configuration for one model version, read-only after load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfiguration {
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
    pub training: TrainingConfig,
}

impl ModelConfiguration {
    /// Location of a version's configuration file under the home directory.
    pub fn path_for(home: &Path, version: &str) -> PathBuf {
        home.join("configs")
            .join("models")
            .join("digit_recognizer")
            .join(format!("v{version}.json"))
    }

    /// Loads and validates the configuration for `version` from
    /// `<home>/configs/models/digit_recognizer/v<version>.json`.
    pub fn load(home: &Path, version: &str) -> Result<Self> {
        let path = Self::path_for(home, version);
        if !path.is_file() {
            return Err(PipelineError::ConfigNotFound {
                version: version.to_string(),
                path,
            });
        }
        let raw = fs::read_to_string(&path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.dataset.validate()?;
        self.training.validate()
    }
}

impl fmt::Display for ArchitectureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for ModelConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(home: &Path, version: &str, body: &str) {
        let path = ModelConfiguration::path_for(home, version);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn load_roundtrips_file_contents() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            "1",
            r#"{
                "model": {"optimizer": {"learning_rate": 0.001}},
                "dataset": {"batch_size": 32, "seed": 7},
                "training": {"epochs": 3}
            }"#,
        );

        let config = ModelConfiguration::load(home.path(), "1").unwrap();
        assert_eq!(config.model.optimizer.learning_rate().unwrap(), 0.001);
        assert_eq!(config.dataset.batch_size, 32);
        assert_eq!(config.dataset.seed, 7);
        assert_eq!(config.training.epochs, 3);
        // Defaults fill the rest.
        assert_eq!(config.model.architecture.num_classes, 10);
    }

    #[test]
    fn missing_version_is_config_not_found() {
        let home = TempDir::new().unwrap();
        let err = ModelConfiguration::load(home.path(), "99").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigNotFound { .. }));
    }

    #[test]
    fn missing_learning_rate_is_detected() {
        let home = TempDir::new().unwrap();
        write_config(home.path(), "1", r#"{"model": {"optimizer": {}}}"#);
        let err = ModelConfiguration::load(home.path(), "1").unwrap_err();
        assert!(matches!(err, PipelineError::ConfigFieldMissing(_)));
    }

    #[test]
    fn non_positive_learning_rate_rejected() {
        let home = TempDir::new().unwrap();
        write_config(
            home.path(),
            "1",
            r#"{"model": {"optimizer": {"learning_rate": -0.5}}}"#,
        );
        let err = ModelConfiguration::load(home.path(), "1").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidArgument(_)));
    }

    #[test]
    fn split_ratios_must_leave_training_data() {
        let mut config = ModelConfiguration::default();
        config.model.optimizer.learning_rate = Some(0.001);
        config.dataset.validation_split = 0.6;
        config.dataset.test_split = 0.5;
        assert!(config.validate().is_err());
    }
}
