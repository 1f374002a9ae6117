//! # Seqlabel Core
//!
//! Attention-augmented encoder-decoder sequence labeling on candle: a
//! bidirectional LSTM encoder, a bridge into an LSTM decoder, optional
//! attention, and greedy, beam and teacher-forced decoding.
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_core::Device;
//! use seqlabel_core::{build_tagger, AttentionKind, DecodeStrategy, ModelConfig};
//!
//! let config = ModelConfig::new()
//!     .with_vocab(10, 12)
//!     .with_dims(8, 8, 4)
//!     .with_attention(Some(AttentionKind::Fixed));
//! let (_varmap, tagger) = build_tagger(&config, &Device::Cpu).unwrap();
//!
//! let out = tagger.decode(&[vec![2, 5, 7]], DecodeStrategy::Beam(2)).unwrap();
//! assert_eq!(out.labels[0].len(), 3);
//! ```
pub mod config;
pub mod decode;
pub mod error;
pub mod model;
pub mod scoring;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export primary API
pub use config::{AttentionKind, ModelConfig};
pub use decode::{
    penalize_background, training_loss, BeamHistory, BeamSearchDecoder, BeamStep,
    DecodeStrategy, GreedyDecoder, TeacherForcedDecoder, TeacherForcedOutput,
};
pub use error::{Result, SeqLabelError};
pub use model::{build_tagger, EncodedBatch, Tagger, WORD_EMBEDDING_VAR};
pub use scoring::PositiveCounts;
pub use types::{AttentionTrace, Batch, DecodeOutput};
