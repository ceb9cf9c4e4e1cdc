use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::retention::{KeepLast, RetentionPolicy};
use crate::error::{PipelineError, Result};
use crate::model::DigitRecognizer;

/// Sidecar metadata written next to each snapshot's weight file.
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub step: usize,
    pub model_file: String,
    pub timestamp: u64,
}

/// One persisted snapshot found in the checkpoint directory.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub step: usize,
    pub timestamp: u64,
    pub meta_path: PathBuf,
    /// Recorder base path, without the `.mpk` extension the recorder adds.
    pub model_path: PathBuf,
}

/// Durable parameter snapshots under one version's checkpoint directory,
/// pruned to a bounded history after every save.
pub struct CheckpointManager {
    directory: PathBuf,
    retention: Box<dyn RetentionPolicy>,
}

impl CheckpointManager {
    pub fn new(directory: PathBuf, retention: Box<dyn RetentionPolicy>) -> Self {
        Self {
            directory,
            retention,
        }
    }

    /// Manager retaining the `count` most recent snapshots.
    pub fn keep_last(directory: PathBuf, count: usize) -> Self {
        Self::new(directory, Box::new(KeepLast::new(count)))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// All snapshots in the directory, sorted by step ascending. A missing
    /// directory is an empty history, not an error.
    pub fn list(&self) -> Result<Vec<Snapshot>> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots = Vec::new();
        for entry in WalkDir::new(&self.directory)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unreadable snapshot metadata {:?}: {}", path, e);
                    continue;
                }
            };
            match serde_json::from_str::<SnapshotMeta>(&raw) {
                Ok(meta) => snapshots.push(Snapshot {
                    step: meta.step,
                    timestamp: meta.timestamp,
                    meta_path: path.to_path_buf(),
                    model_path: self.directory.join(&meta.model_file),
                }),
                Err(e) => warn!("Skipping malformed snapshot metadata {:?}: {}", path, e),
            }
        }

        snapshots.sort_by_key(|s| s.step);
        Ok(snapshots)
    }

    /// Persists the model's parameters as a new snapshot at `step`, then
    /// prunes snapshots the retention policy evicts.
    pub fn save<B: Backend>(&self, model: &DigitRecognizer<B>, step: usize) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let snapshot_name = format!("snapshot_step_{step}");
        let model_file = format!("{snapshot_name}_model");
        let model_path = self.directory.join(&model_file);

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(model.clone().into_record(), model_path)
            .map_err(|e| PipelineError::Checkpoint(format!("failed to save weights: {e}")))?;

        let meta = SnapshotMeta {
            step,
            model_file,
            timestamp,
        };
        let meta_path = self.directory.join(format!("{snapshot_name}.json"));
        let body = serde_json::to_string_pretty(&meta).map_err(|e| {
            PipelineError::Checkpoint(format!("failed to serialize snapshot metadata: {e}"))
        })?;
        fs::write(&meta_path, body)?;

        info!("Saved checkpoint at step {} to {:?}", step, meta_path);

        self.prune()?;
        Ok(meta_path)
    }

    /// Restores the most recent snapshot into `model`. An empty history is
    /// a no-op: the model is returned with its freshly initialized
    /// parameters and the restored step is `None`.
    pub fn restore_latest<B: Backend>(
        &self,
        model: DigitRecognizer<B>,
        device: &B::Device,
    ) -> Result<(DigitRecognizer<B>, Option<usize>)> {
        let snapshots = self.list()?;
        let Some(latest) = snapshots.last() else {
            info!(
                "No checkpoint found in {:?}, keeping initialized parameters",
                self.directory
            );
            return Ok((model, None));
        };

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(latest.model_path.clone(), device)
            .map_err(|e| {
                PipelineError::Checkpoint(format!(
                    "failed to load weights from {:?}: {e}",
                    latest.model_path
                ))
            })?;

        info!("Restored checkpoint from step {}", latest.step);
        Ok((model.load_record(record), Some(latest.step)))
    }

    fn prune(&self) -> Result<()> {
        let snapshots = self.list()?;
        let steps: Vec<usize> = snapshots.iter().map(|s| s.step).collect();
        for step in self.retention.evict(&steps) {
            if let Some(snapshot) = snapshots.iter().find(|s| s.step == step) {
                let weights = snapshot.model_path.with_extension("mpk");
                if let Err(e) = fs::remove_file(&weights) {
                    warn!("Failed to delete old weights {:?}: {}", weights, e);
                }
                fs::remove_file(&snapshot.meta_path)?;
                info!("Pruned checkpoint at step {}", step);
            }
        }
        Ok(())
    }
}
