mod manager;
mod retention;

pub use manager::{CheckpointManager, Snapshot, SnapshotMeta};
pub use retention::{KeepLast, RetentionPolicy};
