mod batcher;
mod dataset;
mod provider;

pub use batcher::{DataLoader, DigitBatch, DigitBatcher};
pub use dataset::{DigitRecord, RawDataset, SplitDataset};
pub use provider::PreparedDataset;
