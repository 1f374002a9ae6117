use candle_core::Tensor;

use crate::error::Result;
use crate::types::batch::flatten_time_major;

/// Alignment weights over source positions for every output position.
///
/// Shape `(output_len, batch, source_len)`.
#[derive(Debug, Clone)]
pub struct AttentionTrace {
    weights: Tensor,
}

impl AttentionTrace {
    /// Stacks per-step `(batch, source_len)` alignments along a new leading axis.
    pub fn from_steps(steps: &[Tensor]) -> Result<Self> {
        Ok(Self {
            weights: Tensor::stack(steps, 0)?,
        })
    }

    /// The underlying `(output_len, batch, source_len)` tensor.
    pub fn tensor(&self) -> &Tensor {
        &self.weights
    }

    /// Copies the trace to the host, indexed `[t][b][source position]`.
    pub fn to_vec3(&self) -> Result<Vec<Vec<Vec<f32>>>> {
        Ok(self.weights.to_vec3::<f32>()?)
    }
}

/// Everything a decoder produces for one batch.
#[derive(Debug, Clone)]
pub struct DecodeOutput {
    /// Predicted labels, `batch × seq_len`.
    pub labels: Vec<Vec<u32>>,
    /// Raw label scores per step, `(seq_len * batch, label_size)`, row `t * batch + b`.
    pub scores: Tensor,
    /// Per-step log-probabilities, same layout as `scores`.
    pub log_probs: Tensor,
    /// Cumulative log-probability of the chosen path after each position,
    /// `batch × seq_len`.
    pub path_log_probs: Vec<Vec<f32>>,
    /// Alignments of the chosen path; `None` without attention.
    pub attention: Option<AttentionTrace>,
}

impl DecodeOutput {
    /// Number of sentences decoded.
    pub fn batch_size(&self) -> usize {
        self.labels.len()
    }

    /// Number of positions decoded per sentence.
    pub fn seq_len(&self) -> usize {
        self.labels.first().map_or(0, Vec::len)
    }

    /// Predicted labels in the row order of `scores`.
    pub fn labels_time_major(&self) -> Vec<u32> {
        flatten_time_major(&self.labels)
    }
}
