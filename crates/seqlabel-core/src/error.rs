use thiserror::Error;

/// Errors that can occur while building, decoding or scoring with a tagger.
#[derive(Debug, Error)]
pub enum SeqLabelError {
    /// The model configuration is inconsistent with itself or with its inputs.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// More beam slots were requested than there are labels to fill them.
    #[error("beam size {beam_size} exceeds label vocabulary size {label_size}")]
    BeamTooWide {
        /// Requested number of hypotheses per batch element.
        beam_size: usize,
        /// Number of distinct labels.
        label_size: usize,
    },

    /// Beam search needs at least one hypothesis.
    #[error("beam size must be at least 1 (use greedy decoding for 0)")]
    InvalidBeamSize,

    /// A batch with no sentences was passed in.
    #[error("batch is empty")]
    EmptyBatch,

    /// A batch contains sentences of length zero.
    #[error("sequence length must be at least 1")]
    EmptySequence,

    /// Sentences or label sequences within one batch differ in length.
    #[error("ragged batch: row {row} has length {actual}, expected {expected}")]
    RaggedBatch {
        /// Offending row within the batch.
        row: usize,
        /// Length shared by the first row.
        expected: usize,
        /// Length of the offending row.
        actual: usize,
    },

    /// A token index falls outside the word embedding table.
    #[error("token index {index} out of range for vocabulary of size {vocab_size}")]
    TokenOutOfRange {
        /// The offending index.
        index: u32,
        /// Rows in the embedding table.
        vocab_size: usize,
    },

    /// A label index falls outside the label vocabulary.
    #[error("label index {index} out of range for label vocabulary of size {label_size}")]
    LabelOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of labels.
        label_size: usize,
    },

    /// Gold labels were required but the batch carries none.
    #[error("batch has no gold labels")]
    MissingLabels,

    /// Parallel sequences (tokens, gold labels, predictions) disagree in length.
    #[error("length mismatch: {what}: {left} vs {right}")]
    LengthMismatch {
        /// Which sequences were compared.
        what: &'static str,
        /// Length of the first sequence.
        left: usize,
        /// Length of the second sequence.
        right: usize,
    },

    /// Candle tensor framework error.
    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// Result type alias for seqlabel operations.
pub type Result<T> = std::result::Result<T, SeqLabelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SeqLabelError::BeamTooWide {
            beam_size: 13,
            label_size: 12,
        };
        assert_eq!(
            err.to_string(),
            "beam size 13 exceeds label vocabulary size 12"
        );

        let err = SeqLabelError::ConfigMismatch("bad width".into());
        assert!(err.to_string().contains("bad width"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SeqLabelError>();
    }
}
