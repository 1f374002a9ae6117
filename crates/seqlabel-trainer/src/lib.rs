//! # Seqlabel Trainer
//!
//! Training and evaluation workflows for the seqlabel tagger: JSON data
//! files, the epoch loop, positive-class scoring and result files.

pub mod config;
pub mod data;
pub mod evaluate;
pub mod optim;
pub mod trainer;

pub use config::{RunConfig, TrainConfig};
pub use data::{Dataset, PretrainedEmbedding, Splits, Vocabulary};
pub use evaluate::{Evaluation, Evaluator, ResultWriter, SplitScore};
pub use optim::{adam, GradientStep};
pub use trainer::{EpochLog, EpochSummary, Trainer};

/// File name of the parameter checkpoint inside a result directory.
pub const CHECKPOINT_FILE: &str = "model.safetensors";
