//! # Model Configuration
//!
//! Dimensions, vocabulary sizes and the reserved label indices that every
//! component of the tagger is built from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqLabelError};

/// Which attention variant the decoder uses, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttentionKind {
    /// Position-distance alignment with no learned parameters.
    Fixed,
    /// Content alignment against bridge-projected encoder states.
    Dot,
    /// Learned bilinear alignment with a learned output combination.
    General,
}

impl fmt::Display for AttentionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttentionKind::Fixed => "fixed",
            AttentionKind::Dot => "dot",
            AttentionKind::General => "general",
        };
        f.write_str(name)
    }
}

impl FromStr for AttentionKind {
    type Err = SeqLabelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(AttentionKind::Fixed),
            "dot" => Ok(AttentionKind::Dot),
            "general" => Ok(AttentionKind::General),
            other => Err(SeqLabelError::ConfigMismatch(format!(
                "unknown attention variant {other:?} (expected fixed, dot or general)"
            ))),
        }
    }
}

/// Configuration for the encoder-decoder tagger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the word embedding.
    pub word_embedding_dim: usize,
    /// Hidden width of each encoder direction and of the decoder.
    pub hidden_dim: usize,
    /// Width of the label embedding fed to the decoder.
    pub label_embedding_dim: usize,
    /// Number of rows in the word embedding table.
    pub vocab_size: usize,
    /// Number of distinct labels.
    pub label_size: usize,
    /// Label fed to the decoder before the first position.
    pub begin_index: u32,
    /// Majority label; every label above it counts as a positive class.
    pub background_index: u32,
    /// Attention variant, `None` disables attention.
    pub attention: Option<AttentionKind>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            word_embedding_dim: 100,
            hidden_dim: 100,
            label_embedding_dim: 32,
            vocab_size: 10_000,
            label_size: 12,
            begin_index: 1,
            background_index: 4,
            attention: Some(AttentionKind::Fixed),
        }
    }
}

impl ModelConfig {
    /// Create a new model configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vocabulary and label sizes.
    pub fn with_vocab(mut self, vocab_size: usize, label_size: usize) -> Self {
        self.vocab_size = vocab_size;
        self.label_size = label_size;
        self
    }

    /// Set the embedding and hidden widths.
    pub fn with_dims(
        mut self,
        word_embedding_dim: usize,
        hidden_dim: usize,
        label_embedding_dim: usize,
    ) -> Self {
        self.word_embedding_dim = word_embedding_dim;
        self.hidden_dim = hidden_dim;
        self.label_embedding_dim = label_embedding_dim;
        self
    }

    /// Set the reserved begin and background label indices.
    pub fn with_reserved_labels(mut self, begin_index: u32, background_index: u32) -> Self {
        self.begin_index = begin_index;
        self.background_index = background_index;
        self
    }

    /// Set the attention variant.
    pub fn with_attention(mut self, attention: Option<AttentionKind>) -> Self {
        self.attention = attention;
        self
    }

    /// Check that the configuration can build a working tagger.
    ///
    /// The evaluator counts every label strictly above the background index
    /// as positive, so at least one such label must exist.
    pub fn validate(&self) -> Result<()> {
        let widths = [
            ("word_embedding_dim", self.word_embedding_dim),
            ("hidden_dim", self.hidden_dim),
            ("label_embedding_dim", self.label_embedding_dim),
            ("vocab_size", self.vocab_size),
            ("label_size", self.label_size),
        ];
        for (name, value) in widths {
            if value == 0 {
                return Err(SeqLabelError::ConfigMismatch(format!(
                    "{name} must be positive"
                )));
            }
        }

        if self.begin_index as usize >= self.label_size {
            return Err(SeqLabelError::ConfigMismatch(format!(
                "begin index {} outside label range 0..{}",
                self.begin_index, self.label_size
            )));
        }

        if self.background_index as usize + 1 >= self.label_size {
            return Err(SeqLabelError::ConfigMismatch(format!(
                "background index {} leaves no positive label in 0..{}",
                self.background_index, self.label_size
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ModelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.background_index, 4);
        assert_eq!(config.begin_index, 1);
    }

    #[test]
    fn background_without_positive_labels_is_rejected() {
        let config = ModelConfig::default()
            .with_vocab(10, 5)
            .with_reserved_labels(1, 4);
        assert!(matches!(
            config.validate(),
            Err(SeqLabelError::ConfigMismatch(_))
        ));
    }

    #[test]
    fn begin_index_out_of_range_is_rejected() {
        let config = ModelConfig::default().with_reserved_labels(12, 4);
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_width_is_rejected() {
        let config = ModelConfig::default().with_dims(0, 8, 8);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("word_embedding_dim"));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ModelConfig =
            serde_json::from_str(r#"{"vocab_size": 50, "attention": "general"}"#).unwrap();
        assert_eq!(config.vocab_size, 50);
        assert_eq!(config.label_size, 12);
        assert_eq!(config.attention, Some(AttentionKind::General));

        let config: ModelConfig = serde_json::from_str(r#"{"attention": null}"#).unwrap();
        assert_eq!(config.attention, None);
    }

    #[test]
    fn attention_kind_parses_case_insensitively() {
        assert_eq!("Fixed".parse::<AttentionKind>().unwrap(), AttentionKind::Fixed);
        assert_eq!("dot".parse::<AttentionKind>().unwrap(), AttentionKind::Dot);
        assert!("luong".parse::<AttentionKind>().is_err());
        assert_eq!(AttentionKind::General.to_string(), "general");
    }
}
