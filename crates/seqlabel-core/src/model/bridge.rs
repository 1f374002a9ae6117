use candle_core::{Module, Result, Tensor};
use candle_nn::{Linear, VarBuilder};

use crate::model::decoder::DecoderState;
use crate::model::encoder::EncoderOutput;

/// Projects the two directional encoder finals into the decoder's state width.
#[derive(Debug, Clone)]
pub struct StateBridge {
    hidden: Linear,
    cell: Linear,
}

impl StateBridge {
    pub fn new(hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        let hidden = candle_nn::linear_no_bias(2 * hidden_dim, hidden_dim, vb.pp("hidden"))?;
        let cell = candle_nn::linear_no_bias(2 * hidden_dim, hidden_dim, vb.pp("cell"))?;
        Ok(Self { hidden, cell })
    }

    /// `[fwd; bwd]` → decoder initial hidden, `(batch, hidden)`.
    pub fn bridge_hidden(&self, forward: &Tensor, backward: &Tensor) -> Result<Tensor> {
        self.hidden.forward(&Tensor::cat(&[forward, backward], 1)?)
    }

    /// `[fwd; bwd]` → decoder initial cell, `(batch, hidden)`.
    pub fn bridge_cell(&self, forward: &Tensor, backward: &Tensor) -> Result<Tensor> {
        self.cell.forward(&Tensor::cat(&[forward, backward], 1)?)
    }

    /// Decoder initial state from a full encoder pass.
    pub fn initial_state(&self, encoded: &EncoderOutput) -> Result<DecoderState> {
        let [fwd_h, bwd_h] = &encoded.final_hidden;
        let [fwd_c, bwd_c] = &encoded.final_cell;
        Ok(DecoderState {
            hidden: self.bridge_hidden(fwd_h, bwd_h)?,
            cell: self.bridge_cell(fwd_c, bwd_c)?,
        })
    }

    /// The hidden projection alone, applied over the last axis of any
    /// `(..., 2 * hidden)` tensor. Attention reuses it to bring encoder-width
    /// vectors down to decoder width.
    pub fn project_hidden(&self, xs: &Tensor) -> Result<Tensor> {
        self.hidden.forward(xs)
    }
}
