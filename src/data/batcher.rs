use burn::tensor::{backend::Backend, Int, Tensor};

use super::dataset::DigitRecord;
use crate::error::Result;

/// One batch of images and their labels.
///
/// Images are `[batch, channels, height, width]` floats in [0, 1], targets
/// are `[batch]` class indices.
#[derive(Clone, Debug)]
pub struct DigitBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// Trait for batched iteration over a dataset partition.
pub trait DataLoader<B: Backend> {
    /// Get the next batch, `None` once the partition is exhausted.
    fn next_batch(&mut self) -> Result<Option<DigitBatch<B>>>;

    /// Reset the loader to the beginning of the partition.
    fn reset(&mut self);

    /// Total number of batches in the partition.
    fn num_batches(&self) -> usize;
}

/// In-memory batcher over one split partition. The final batch may be
/// smaller than `batch_size`.
pub struct DigitBatcher<B: Backend> {
    records: Vec<DigitRecord>,
    batch_size: usize,
    image_dims: [usize; 3],
    current_pos: usize,
    device: B::Device,
}

impl<B: Backend> DigitBatcher<B> {
    pub fn new(
        records: Vec<DigitRecord>,
        batch_size: usize,
        image_dims: [usize; 3],
        device: B::Device,
    ) -> Self {
        Self {
            records,
            batch_size,
            image_dims,
            current_pos: 0,
            device,
        }
    }

    pub fn num_examples(&self) -> usize {
        self.records.len()
    }
}

impl<B: Backend> DataLoader<B> for DigitBatcher<B> {
    fn next_batch(&mut self) -> Result<Option<DigitBatch<B>>> {
        if self.current_pos >= self.records.len() {
            return Ok(None);
        }

        let end = (self.current_pos + self.batch_size).min(self.records.len());
        let rows = &self.records[self.current_pos..end];
        let batch = rows.len();
        self.current_pos = end;

        let [channels, height, width] = self.image_dims;

        let mut pixels = Vec::with_capacity(batch * channels * height * width);
        let mut labels = Vec::with_capacity(batch);
        for record in rows {
            pixels.extend_from_slice(&record.pixels);
            labels.push(record.label as i64);
        }

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), &self.device)
            .reshape([batch, channels, height, width]);
        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &self.device);

        Ok(Some(DigitBatch { images, targets }))
    }

    fn reset(&mut self) {
        self.current_pos = 0;
    }

    fn num_batches(&self) -> usize {
        self.records.len().div_ceil(self.batch_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn records(n: usize) -> Vec<DigitRecord> {
        (0..n)
            .map(|i| DigitRecord {
                label: i % 10,
                pixels: vec![0.5; 4],
            })
            .collect()
    }

    #[test]
    fn batches_have_expected_shapes() {
        let device = Default::default();
        let mut batcher = DigitBatcher::<TestBackend>::new(records(5), 2, [1, 2, 2], device);

        assert_eq!(batcher.num_batches(), 3);

        let batch = batcher.next_batch().unwrap().unwrap();
        assert_eq!(batch.images.dims(), [2, 1, 2, 2]);
        assert_eq!(batch.targets.dims(), [2]);

        // Second full batch, then the odd remainder.
        assert!(batcher.next_batch().unwrap().is_some());
        let last = batcher.next_batch().unwrap().unwrap();
        assert_eq!(last.images.dims(), [1, 1, 2, 2]);
        assert!(batcher.next_batch().unwrap().is_none());
    }

    #[test]
    fn reset_rewinds_to_start() {
        let device = Default::default();
        let mut batcher = DigitBatcher::<TestBackend>::new(records(2), 2, [1, 2, 2], device);
        assert!(batcher.next_batch().unwrap().is_some());
        assert!(batcher.next_batch().unwrap().is_none());
        batcher.reset();
        assert!(batcher.next_batch().unwrap().is_some());
    }
}
