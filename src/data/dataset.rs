use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::config::{ArchitectureConfig, DatasetConfig};
use crate::error::{PipelineError, Result};

/// One labeled example: a digit class and its flattened pixel values,
/// normalized to [0, 1].
#[derive(Debug, Clone)]
pub struct DigitRecord {
    pub label: usize,
    pub pixels: Vec<f32>,
}

/// The raw dataset as parsed from the Kaggle-style CSV (one row per image,
/// `label,pixel0,...,pixelN`).
#[derive(Debug)]
pub struct RawDataset {
    pub records: Vec<DigitRecord>,
}

impl RawDataset {
    pub fn load(path: &Path, architecture: &ArchitectureConfig) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            PipelineError::Dataset(format!("failed to read dataset csv {path:?}: {e}"))
        })?;

        let pixels_per_image =
            architecture.image_height * architecture.image_width * architecture.image_channels;

        let mut records = Vec::new();
        for (line_no, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // Header row.
            if line_no == 0 && line.starts_with("label") {
                continue;
            }
            records.push(parse_row(line, line_no + 1, pixels_per_image, architecture)?);
        }

        if records.is_empty() {
            return Err(PipelineError::Dataset(format!(
                "dataset csv {path:?} contains no examples"
            )));
        }

        info!("Loaded {} examples from {:?}", records.len(), path);
        Ok(Self { records })
    }

    /// Shuffles deterministically and splits into train/validation/test
    /// partitions according to the configured ratios.
    pub fn split(mut self, config: &DatasetConfig) -> Result<SplitDataset> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        self.records.shuffle(&mut rng);

        let total = self.records.len();
        let n_validation = (total as f64 * config.validation_split).round() as usize;
        let n_test = (total as f64 * config.test_split).round() as usize;

        if n_validation + n_test >= total {
            return Err(PipelineError::Dataset(format!(
                "split ratios leave no training data ({total} examples, \
                 {n_validation} validation, {n_test} test)"
            )));
        }

        let test = self.records.split_off(total - n_test);
        let validation = self.records.split_off(total - n_test - n_validation);
        let train = self.records;

        info!(
            "Split dataset: {} train / {} validation / {} test",
            train.len(),
            validation.len(),
            test.len()
        );

        Ok(SplitDataset {
            train,
            validation,
            test,
        })
    }
}

fn parse_row(
    line: &str,
    line_no: usize,
    pixels_per_image: usize,
    architecture: &ArchitectureConfig,
) -> Result<DigitRecord> {
    let mut fields = line.split(',');

    let label: usize = fields
        .next()
        .and_then(|f| f.trim().parse().ok())
        .ok_or_else(|| {
            PipelineError::Dataset(format!("line {line_no}: missing or malformed label"))
        })?;
    if label >= architecture.num_classes {
        return Err(PipelineError::Dataset(format!(
            "line {line_no}: label {label} out of range for {} classes",
            architecture.num_classes
        )));
    }

    let mut pixels = Vec::with_capacity(pixels_per_image);
    for field in fields {
        let value: f32 = field.trim().parse().map_err(|_| {
            PipelineError::Dataset(format!(
                "line {line_no}: malformed pixel value {:?}",
                field.trim()
            ))
        })?;
        pixels.push(value / 255.0);
    }

    if pixels.len() != pixels_per_image {
        return Err(PipelineError::Dataset(format!(
            "line {line_no}: expected {pixels_per_image} pixels, got {}",
            pixels.len()
        )));
    }

    Ok(DigitRecord { label, pixels })
}

/// The three partitions produced by [`RawDataset::split`].
#[derive(Debug)]
pub struct SplitDataset {
    pub train: Vec<DigitRecord>,
    pub validation: Vec<DigitRecord>,
    pub test: Vec<DigitRecord>,
}
