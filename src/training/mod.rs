mod trainer;

pub use trainer::{Trainer, ValidationOutput};
