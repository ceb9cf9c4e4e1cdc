use burn::tensor::backend::Backend;
use std::path::Path;

use super::batcher::DigitBatcher;
use super::dataset::RawDataset;
use crate::config::ModelConfiguration;
use crate::error::Result;

/// The fully prepared dataset: loaded, split, and wrapped in batched views.
pub struct PreparedDataset<B: Backend> {
    pub train: DigitBatcher<B>,
    pub validation: DigitBatcher<B>,
    pub test: DigitBatcher<B>,
}

impl<B: Backend> PreparedDataset<B> {
    /// Runs the full preparation chain: read the CSV at
    /// `<home>/<config.dataset.csv_path>`, shuffle and split per the
    /// configured ratios, and build one batcher per partition.
    pub fn prepare(home: &Path, config: &ModelConfiguration, device: &B::Device) -> Result<Self> {
        let architecture = &config.model.architecture;
        let csv_path = home.join(&config.dataset.csv_path);

        let split = RawDataset::load(&csv_path, architecture)?.split(&config.dataset)?;

        let image_dims = [
            architecture.image_channels,
            architecture.image_height,
            architecture.image_width,
        ];
        let batch_size = config.dataset.batch_size;

        Ok(Self {
            train: DigitBatcher::new(split.train, batch_size, image_dims, device.clone()),
            validation: DigitBatcher::new(split.validation, batch_size, image_dims, device.clone()),
            test: DigitBatcher::new(split.test, batch_size, image_dims, device.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetConfig;
    use burn_ndarray::NdArray;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn prepares_all_three_partitions() {
        let home = TempDir::new().unwrap();
        let data_dir = home.path().join("data").join("digit_recognizer");
        fs::create_dir_all(&data_dir).unwrap();

        let mut file = fs::File::create(data_dir.join("train.csv")).unwrap();
        write!(file, "label").unwrap();
        for i in 0..784 {
            write!(file, ",pixel{i}").unwrap();
        }
        writeln!(file).unwrap();
        for i in 0..20 {
            write!(file, "{}", i % 10).unwrap();
            for _ in 0..784 {
                write!(file, ",0").unwrap();
            }
            writeln!(file).unwrap();
        }

        let mut config = ModelConfiguration::default();
        config.dataset = DatasetConfig {
            validation_split: 0.2,
            test_split: 0.1,
            batch_size: 4,
            ..DatasetConfig::default()
        };

        let device = Default::default();
        let prepared =
            PreparedDataset::<TestBackend>::prepare(home.path(), &config, &device).unwrap();
        assert_eq!(prepared.train.num_examples(), 14);
        assert_eq!(prepared.validation.num_examples(), 4);
        assert_eq!(prepared.test.num_examples(), 2);
    }
}
