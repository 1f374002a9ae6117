//! # Decoder Attention
//!
//! Blends one decoder hidden state with a weighted view of the whole encoder
//! sequence. The variants form a closed set picked at construction time;
//! each owns its own parameters (none for [`Attention::Fixed`] and
//! [`Attention::Dot`]).

use candle_core::{Device, Module, Result, Tensor, D};
use candle_nn::{Linear, VarBuilder};

use crate::config::AttentionKind;
use crate::model::bridge::StateBridge;

/// Attention strategy used by the decoder step.
#[derive(Debug, Clone)]
pub enum Attention {
    /// Alignment `∝ exp(-|j - t|)` around the current output position.
    Fixed,
    /// Alignment from dot products with bridge-projected encoder states.
    Dot,
    /// Luong-style bilinear alignment with a learned combination layer.
    General {
        /// `hidden → 2 * hidden` query projection.
        query: Linear,
        /// `[context; hidden] (3 * hidden) → hidden`.
        combine: Linear,
    },
}

impl Attention {
    pub fn new(kind: AttentionKind, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(match kind {
            AttentionKind::Fixed => Attention::Fixed,
            AttentionKind::Dot => Attention::Dot,
            AttentionKind::General => Attention::General {
                query: candle_nn::linear_no_bias(hidden_dim, 2 * hidden_dim, vb.pp("query"))?,
                combine: candle_nn::linear_no_bias(3 * hidden_dim, hidden_dim, vb.pp("combine"))?,
            },
        })
    }

    pub fn kind(&self) -> AttentionKind {
        match self {
            Attention::Fixed => AttentionKind::Fixed,
            Attention::Dot => AttentionKind::Dot,
            Attention::General { .. } => AttentionKind::General,
        }
    }

    /// Attends `decoder_hidden` `(batch, hidden)` over `encoder_hidden_seq`
    /// `(source_len, batch, 2 * hidden)` at output position `time_index`.
    ///
    /// Returns the blended hidden state `(batch, hidden)` and the alignment
    /// `(batch, source_len)`, each row non-negative and summing to one.
    pub fn attend(
        &self,
        decoder_hidden: &Tensor,
        encoder_hidden_seq: &Tensor,
        time_index: usize,
        bridge: &StateBridge,
    ) -> Result<(Tensor, Tensor)> {
        let (source_len, batch_size, _) = encoder_hidden_seq.dims3()?;
        // (batch, source_len, 2 * hidden)
        let encoder_by_batch = encoder_hidden_seq.transpose(0, 1)?.contiguous()?;

        let alignment = match self {
            Attention::Fixed => fixed_alignment(
                source_len,
                batch_size,
                time_index,
                encoder_hidden_seq.device(),
            )?,
            Attention::Dot => {
                let keys = bridge.project_hidden(&encoder_by_batch)?;
                let energies = keys.matmul(&decoder_hidden.unsqueeze(2)?)?.squeeze(2)?;
                candle_nn::ops::softmax(&energies, D::Minus1)?
            }
            Attention::General { query, .. } => {
                let query = query.forward(decoder_hidden)?.unsqueeze(2)?;
                let energies = encoder_by_batch.matmul(&query)?.squeeze(2)?;
                candle_nn::ops::softmax(&energies, D::Minus1)?
            }
        };

        // (batch, 1, source_len) x (batch, source_len, 2 * hidden)
        let context = alignment
            .unsqueeze(1)?
            .matmul(&encoder_by_batch)?
            .squeeze(1)?;

        let blended = match self {
            Attention::Fixed | Attention::Dot => bridge
                .project_hidden(&context)?
                .add(decoder_hidden)?
                .tanh()?,
            Attention::General { combine, .. } => combine
                .forward(&Tensor::cat(&[&context, decoder_hidden], 1)?)?
                .tanh()?,
        };

        Ok((blended, alignment))
    }
}

/// Normalized `exp(-|j - t|)` weights, broadcast over the batch.
fn fixed_alignment(
    source_len: usize,
    batch_size: usize,
    time_index: usize,
    device: &Device,
) -> Result<Tensor> {
    let raw: Vec<f32> = (0..source_len)
        .map(|j| (-(j.abs_diff(time_index) as f32)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    let weights: Vec<f32> = raw.iter().map(|w| w / total).collect();

    Tensor::from_vec(weights, (1, source_len), device)?
        .broadcast_as((batch_size, source_len))?
        .contiguous()
}
