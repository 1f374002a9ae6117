//! # Decoding
//!
//! Turns decoder-step scores into label sequences. All decoders run exactly
//! `seq_len` steps; there is no end-of-sequence label.

pub mod beam;
pub mod greedy;
pub mod teacher_forced;

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

pub use beam::{BeamHistory, BeamSearchDecoder, BeamStep};
pub use greedy::GreedyDecoder;
pub use teacher_forced::{
    penalize_background, training_loss, TeacherForcedDecoder, TeacherForcedOutput,
};

use crate::error::Result;

/// Which decoder to run at inference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeStrategy {
    Greedy,
    Beam(usize),
}

impl DecodeStrategy {
    /// `0` selects greedy decoding, anything else beam search of that width.
    pub fn from_beam_size(beam_size: usize) -> Self {
        match beam_size {
            0 => DecodeStrategy::Greedy,
            n => DecodeStrategy::Beam(n),
        }
    }
}

/// Indices and values of the `k` largest entries, best first.
///
/// Equal values keep ascending index order.
pub fn top_k(values: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    order.into_iter().take(k).map(|i| (i, values[i])).collect()
}

/// Index of the largest entry; the first one on ties.
pub fn argmax(values: &[f32]) -> usize {
    top_k(values, 1).first().map_or(0, |&(i, _)| i)
}

/// Picks row `b` of `per_slot[slots[b]]` for every batch element `b`.
///
/// Every tensor in `per_slot` is `(batch, width)`; the result is too.
pub(crate) fn gather_rows(per_slot: &[Tensor], slots: &[usize]) -> Result<Tensor> {
    let batch_size = slots.len();
    let stacked = Tensor::stack(per_slot, 0)?;
    let (num_slots, _, width) = stacked.dims3()?;
    let flat = stacked.reshape((num_slots * batch_size, width))?;
    let rows: Vec<u32> = slots
        .iter()
        .enumerate()
        .map(|(b, &slot)| (slot * batch_size + b) as u32)
        .collect();
    let rows = Tensor::new(rows.as_slice(), flat.device())?;
    Ok(flat.index_select(&rows, 0)?)
}
