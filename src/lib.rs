// Library exports for the training binary and integration tests

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod training;

// Re-export commonly used types
pub use config::ModelConfiguration;
pub use error::PipelineError;
pub use model::{DigitRecognizer, ModelSummary};
pub use pipeline::{Mode, TrainingDriver};
