//! Teacher forcing: the decoder is fed the gold label of the previous
//! position instead of its own prediction. Used for the training loss.

use candle_core::{Tensor, D};

use crate::error::{Result, SeqLabelError};
use crate::model::{DecoderState, DecoderStep, StateBridge};
use crate::types::{check_range, check_rectangular, flatten_time_major, AttentionTrace};

/// Per-step outputs of a teacher-forced pass, time-major `(seq_len * batch, label_size)`.
#[derive(Debug, Clone)]
pub struct TeacherForcedOutput {
    pub scores: Tensor,
    pub log_probs: Tensor,
    pub attention: Option<AttentionTrace>,
}

#[derive(Debug, Clone, Copy)]
pub struct TeacherForcedDecoder<'a> {
    step: &'a DecoderStep,
    bridge: &'a StateBridge,
}

impl<'a> TeacherForcedDecoder<'a> {
    pub fn new(step: &'a DecoderStep, bridge: &'a StateBridge) -> Self {
        Self { step, bridge }
    }

    /// Unrolls the decoder over `gold`, `batch × seq_len` label indices.
    pub fn decode(
        &self,
        gold: &[Vec<u32>],
        init_state: &DecoderState,
        encoder_hidden_seq: &Tensor,
    ) -> Result<TeacherForcedOutput> {
        let (batch_size, seq_len) = check_rectangular(gold)?;
        let label_size = self.step.label_size();
        check_range(gold, label_size, |index, label_size| {
            SeqLabelError::LabelOutOfRange { index, label_size }
        })?;

        let mut scores = Vec::with_capacity(seq_len);
        let mut log_probs = Vec::with_capacity(seq_len);
        let mut alignments = Vec::with_capacity(seq_len);

        let mut prev_embedding = self.step.begin_embedding(batch_size)?;
        let mut state = init_state.clone();

        for t in 0..seq_len {
            let out = self
                .step
                .step(&prev_embedding, &state, encoder_hidden_seq, t, self.bridge)?;
            scores.push(out.scores);
            log_probs.push(out.log_probs);
            if let Some(alignment) = out.alignment {
                alignments.push(alignment);
            }

            if t + 1 < seq_len {
                let fed: Vec<u32> = gold.iter().map(|row| row[t]).collect();
                prev_embedding = self.step.embed_labels(&fed)?;
            }
            state = out.state;
        }

        let attention = if self.step.has_attention() {
            Some(AttentionTrace::from_steps(&alignments)?)
        } else {
            None
        };

        Ok(TeacherForcedOutput {
            scores: Tensor::cat(&scores, 0)?,
            log_probs: Tensor::cat(&log_probs, 0)?,
            attention,
        })
    }
}

/// Adds `penalty` to the `background` column of every row whose gold label
/// lies above the background.
///
/// `scores` is `(rows, label_size)` and `gold_time_major` has one label per row.
pub fn penalize_background(
    scores: &Tensor,
    gold_time_major: &[u32],
    background: u32,
    penalty: f32,
) -> Result<Tensor> {
    let (rows, label_size) = scores.dims2()?;
    if rows != gold_time_major.len() {
        return Err(SeqLabelError::LengthMismatch {
            what: "score rows vs gold labels",
            left: rows,
            right: gold_time_major.len(),
        });
    }

    let column = background as usize;
    if column >= label_size {
        return Err(SeqLabelError::ConfigMismatch(format!(
            "background index {background} outside label range 0..{label_size}"
        )));
    }
    let mut offsets = vec![0f32; rows * label_size];
    for (row, &gold) in gold_time_major.iter().enumerate() {
        if gold > background {
            offsets[row * label_size + column] = penalty;
        }
    }
    let offsets = Tensor::from_vec(offsets, (rows, label_size), scores.device())?
        .to_dtype(scores.dtype())?;
    Ok(scores.add(&offsets)?)
}

/// Mean negative log-likelihood of the gold labels after the background
/// penalty. `gold` is `batch × seq_len`, matching the row order of `scores`.
pub fn training_loss(
    scores: &Tensor,
    gold: &[Vec<u32>],
    background: u32,
    penalty: f32,
) -> Result<Tensor> {
    check_rectangular(gold)?;
    let targets = flatten_time_major(gold);
    let adjusted = penalize_background(scores, &targets, background, penalty)?;
    let log_probs = candle_nn::ops::log_softmax(&adjusted, D::Minus1)?;
    let targets = Tensor::new(targets.as_slice(), scores.device())?;
    Ok(candle_nn::loss::nll(&log_probs, &targets)?)
}
