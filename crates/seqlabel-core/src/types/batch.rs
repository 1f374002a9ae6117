use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqLabelError};

/// A group of equal-length sentences and, for supervised use, their labels.
///
/// Row `i` of `labels` is the gold label sequence of row `i` of `sentences`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Batch {
    /// Token indices, one row per sentence.
    pub sentences: Vec<Vec<u32>>,
    /// Gold label indices, empty for unlabeled batches.
    #[serde(default)]
    pub labels: Vec<Vec<u32>>,
}

impl Batch {
    /// Creates a labeled batch.
    #[must_use]
    pub fn new(sentences: Vec<Vec<u32>>, labels: Vec<Vec<u32>>) -> Self {
        Self { sentences, labels }
    }

    /// Creates a batch with no gold labels.
    #[must_use]
    pub fn unlabeled(sentences: Vec<Vec<u32>>) -> Self {
        Self {
            sentences,
            labels: Vec::new(),
        }
    }

    /// Number of sentences.
    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    /// Whether the batch holds no sentences.
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Shared sentence length, 0 for an empty batch.
    pub fn seq_len(&self) -> usize {
        self.sentences.first().map_or(0, Vec::len)
    }

    /// Whether gold labels are attached.
    pub fn is_labeled(&self) -> bool {
        !self.labels.is_empty()
    }

    /// Checks shapes and index ranges against the model's vocabularies.
    pub fn validate(&self, vocab_size: usize, label_size: usize) -> Result<()> {
        let (_, seq_len) = check_rectangular(&self.sentences)?;
        check_range(&self.sentences, vocab_size, |index, vocab_size| {
            SeqLabelError::TokenOutOfRange { index, vocab_size }
        })?;

        if self.is_labeled() {
            if self.labels.len() != self.sentences.len() {
                return Err(SeqLabelError::LengthMismatch {
                    what: "sentences vs label sequences",
                    left: self.sentences.len(),
                    right: self.labels.len(),
                });
            }
            for (row, labels) in self.labels.iter().enumerate() {
                if labels.len() != seq_len {
                    return Err(SeqLabelError::RaggedBatch {
                        row,
                        expected: seq_len,
                        actual: labels.len(),
                    });
                }
            }
            check_range(&self.labels, label_size, |index, label_size| {
                SeqLabelError::LabelOutOfRange { index, label_size }
            })?;
        }

        Ok(())
    }

    /// Gold labels flattened position-major (`t * batch + b`), the row order of
    /// every score matrix the decoders produce.
    pub fn labels_time_major(&self) -> Result<Vec<u32>> {
        if !self.is_labeled() {
            return Err(SeqLabelError::MissingLabels);
        }
        check_rectangular(&self.labels)?;
        Ok(flatten_time_major(&self.labels))
    }
}

/// Returns `(batch_size, seq_len)` if every row has the same, non-zero length.
pub fn check_rectangular(rows: &[Vec<u32>]) -> Result<(usize, usize)> {
    let first = rows.first().ok_or(SeqLabelError::EmptyBatch)?;
    let seq_len = first.len();
    if seq_len == 0 {
        return Err(SeqLabelError::EmptySequence);
    }
    for (row, values) in rows.iter().enumerate() {
        if values.len() != seq_len {
            return Err(SeqLabelError::RaggedBatch {
                row,
                expected: seq_len,
                actual: values.len(),
            });
        }
    }
    Ok((rows.len(), seq_len))
}

/// Rejects any index `>= limit` using the provided error constructor.
pub fn check_range(
    rows: &[Vec<u32>],
    limit: usize,
    err: impl Fn(u32, usize) -> SeqLabelError,
) -> Result<()> {
    match rows.iter().flatten().find(|&&index| index as usize >= limit) {
        Some(&index) => Err(err(index, limit)),
        None => Ok(()),
    }
}

/// Flattens `batch × seq_len` rows into position-major order.
pub fn flatten_time_major(rows: &[Vec<u32>]) -> Vec<u32> {
    let seq_len = rows.first().map_or(0, Vec::len);
    (0..seq_len)
        .flat_map(|t| rows.iter().map(move |row| row[t]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_well_formed_batch() {
        let batch = Batch::new(vec![vec![1, 2, 3], vec![4, 5, 6]], vec![vec![4, 5, 4], vec![6, 4, 4]]);
        assert!(batch.validate(10, 12).is_ok());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.seq_len(), 3);
    }

    #[test]
    fn validate_rejects_ragged_and_out_of_range() {
        let ragged = Batch::unlabeled(vec![vec![1, 2, 3], vec![4, 5]]);
        assert!(matches!(
            ragged.validate(10, 12),
            Err(SeqLabelError::RaggedBatch { row: 1, expected: 3, actual: 2 })
        ));

        let token = Batch::unlabeled(vec![vec![1, 10]]);
        assert!(matches!(
            token.validate(10, 12),
            Err(SeqLabelError::TokenOutOfRange { index: 10, .. })
        ));

        let label = Batch::new(vec![vec![1, 2]], vec![vec![4, 12]]);
        assert!(matches!(
            label.validate(10, 12),
            Err(SeqLabelError::LabelOutOfRange { index: 12, .. })
        ));

        assert!(matches!(
            Batch::default().validate(10, 12),
            Err(SeqLabelError::EmptyBatch)
        ));
        assert!(matches!(
            Batch::unlabeled(vec![vec![]]).validate(10, 12),
            Err(SeqLabelError::EmptySequence)
        ));
    }

    #[test]
    fn labels_flatten_position_major() {
        let batch = Batch::new(vec![vec![0, 0], vec![0, 0]], vec![vec![1, 2], vec![3, 4]]);
        assert_eq!(batch.labels_time_major().unwrap(), vec![1, 3, 2, 4]);
        assert!(matches!(
            Batch::unlabeled(vec![vec![1]]).labels_time_major(),
            Err(SeqLabelError::MissingLabels)
        ));
    }

    #[test]
    fn ragged_labels_are_an_error_when_flattened() {
        let batch = Batch::new(vec![vec![1, 2, 3], vec![4, 5, 6]], vec![vec![4, 5, 4], vec![6, 4]]);
        assert!(matches!(
            batch.labels_time_major(),
            Err(SeqLabelError::RaggedBatch { row: 1, expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn batch_deserializes_without_labels() {
        let batch: Batch = serde_json::from_str(r#"{"sentences": [[2, 5, 7]]}"#).unwrap();
        assert!(!batch.is_labeled());
        assert_eq!(batch.seq_len(), 3);
    }
}
