use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the training pipeline.
///
/// Failures are terminal for the current run: nothing here is retried or
/// recovered locally, every variant propagates to the caller unchanged. The
/// one tolerated soft failure, restoring from an empty checkpoint directory,
/// is modeled as `Option::None` at the call site and never reaches this enum.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no configuration found for version {version} at {path:?}")]
    ConfigNotFound { version: String, path: PathBuf },

    #[error("configuration field missing: {0}")]
    ConfigFieldMissing(&'static str),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("report error: {0}")]
    Report(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
