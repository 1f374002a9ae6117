//! # Seqlabel
//!
//! Facade over the workspace crates: the tagger and its decoders from
//! `seqlabel-core`, and the training and evaluation workflows from
//! `seqlabel-trainer`.

pub use seqlabel_core;
pub use seqlabel_trainer;

pub use seqlabel_core::{
    build_tagger, AttentionKind, Batch, DecodeOutput, DecodeStrategy, ModelConfig,
    PositiveCounts, Result, SeqLabelError, Tagger,
};
pub use seqlabel_trainer::{Dataset, Evaluator, RunConfig, TrainConfig, Trainer};
