pub mod recognizer;
pub mod summary;

pub use recognizer::DigitRecognizer;
pub use summary::{LayerKind, LayerSummary, ModelSummary};
