//! Greedy decoding: always continue with the single best label.

use candle_core::Tensor;

use crate::decode::argmax;
use crate::error::{Result, SeqLabelError};
use crate::model::{DecoderState, DecoderStep, StateBridge};
use crate::types::{AttentionTrace, DecodeOutput};

/// Unrolls the decoder step feeding back its own argmax.
///
/// Picking the argmax of the per-step log-probabilities also maximizes the
/// running total, since every candidate at a step shares the same prefix
/// score; no accumulation is needed for selection.
#[derive(Debug, Clone, Copy)]
pub struct GreedyDecoder<'a> {
    step: &'a DecoderStep,
    bridge: &'a StateBridge,
}

impl<'a> GreedyDecoder<'a> {
    pub fn new(step: &'a DecoderStep, bridge: &'a StateBridge) -> Self {
        Self { step, bridge }
    }

    pub fn decode(
        &self,
        batch_size: usize,
        seq_len: usize,
        init_state: &DecoderState,
        encoder_hidden_seq: &Tensor,
    ) -> Result<DecodeOutput> {
        if batch_size == 0 {
            return Err(SeqLabelError::EmptyBatch);
        }
        if seq_len == 0 {
            return Err(SeqLabelError::EmptySequence);
        }

        let mut labels = vec![Vec::with_capacity(seq_len); batch_size];
        let mut path_log_probs = vec![Vec::with_capacity(seq_len); batch_size];
        let mut totals = vec![0f32; batch_size];
        let mut scores = Vec::with_capacity(seq_len);
        let mut log_probs = Vec::with_capacity(seq_len);
        let mut alignments = Vec::with_capacity(seq_len);

        let mut prev_embedding = self.step.begin_embedding(batch_size)?;
        let mut state = init_state.clone();

        for t in 0..seq_len {
            let out = self
                .step
                .step(&prev_embedding, &state, encoder_hidden_seq, t, self.bridge)?;

            let rows = out.log_probs.to_vec2::<f32>()?;
            let mut chosen = Vec::with_capacity(batch_size);
            for (b, row) in rows.iter().enumerate() {
                let label = argmax(row);
                totals[b] += row[label];
                labels[b].push(label as u32);
                path_log_probs[b].push(totals[b]);
                chosen.push(label as u32);
            }

            scores.push(out.scores);
            log_probs.push(out.log_probs);
            if let Some(alignment) = out.alignment {
                alignments.push(alignment);
            }

            prev_embedding = self.step.embed_labels(&chosen)?;
            state = out.state;
        }

        let attention = if self.step.has_attention() {
            Some(AttentionTrace::from_steps(&alignments)?)
        } else {
            None
        };

        Ok(DecodeOutput {
            labels,
            scores: Tensor::cat(&scores, 0)?,
            log_probs: Tensor::cat(&log_probs, 0)?,
            path_log_probs,
            attention,
        })
    }
}
