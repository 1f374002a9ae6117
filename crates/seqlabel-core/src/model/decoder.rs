use candle_core::{Device, Module, Result, Tensor, D};
use candle_nn::rnn::{LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::{Embedding, Linear, VarBuilder};

use crate::model::attention::Attention;
use crate::model::bridge::StateBridge;

/// Decoder hidden and cell state, each `(batch, hidden)`.
#[derive(Debug, Clone)]
pub struct DecoderState {
    pub hidden: Tensor,
    pub cell: Tensor,
}

/// Result of a single decoder transition.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// State to carry into the next position (attention-blended hidden).
    pub state: DecoderState,
    /// Raw label scores, `(batch, label_size)`.
    pub scores: Tensor,
    /// Log-softmax of `scores`.
    pub log_probs: Tensor,
    /// Alignment `(batch, source_len)` when attention is enabled.
    pub alignment: Option<Tensor>,
}

/// One recurrent decoder transition: LSTM cell, optional attention,
/// projection to label scores.
#[derive(Debug, Clone)]
pub struct DecoderStep {
    label_embedding: Embedding,
    cell: LSTM,
    attention: Option<Attention>,
    hidden2score: Linear,
    begin_index: u32,
    label_size: usize,
    device: Device,
}

impl DecoderStep {
    pub fn new(
        label_size: usize,
        label_embedding_dim: usize,
        hidden_dim: usize,
        begin_index: u32,
        attention: Option<Attention>,
        vb: VarBuilder,
    ) -> Result<Self> {
        let label_embedding =
            candle_nn::embedding(label_size, label_embedding_dim, vb.pp("label_embedding"))?;
        let cell = candle_nn::lstm(
            label_embedding_dim,
            hidden_dim,
            LSTMConfig::default(),
            vb.pp("cell"),
        )?;
        let hidden2score = candle_nn::linear(hidden_dim, label_size, vb.pp("hidden2score"))?;

        Ok(Self {
            label_embedding,
            cell,
            attention,
            hidden2score,
            begin_index,
            label_size,
            device: vb.device().clone(),
        })
    }

    pub fn label_size(&self) -> usize {
        self.label_size
    }

    pub fn begin_index(&self) -> u32 {
        self.begin_index
    }

    pub fn has_attention(&self) -> bool {
        self.attention.is_some()
    }

    /// Embeds one label per batch element, `(batch, label_embedding_dim)`.
    pub fn embed_labels(&self, labels: &[u32]) -> Result<Tensor> {
        let ids = Tensor::new(labels, &self.device)?;
        self.label_embedding.forward(&ids)
    }

    /// Begin-label embedding repeated over the batch.
    pub fn begin_embedding(&self, batch_size: usize) -> Result<Tensor> {
        self.embed_labels(&vec![self.begin_index; batch_size])
    }

    /// Runs the transition for output position `time_index`.
    pub fn step(
        &self,
        prev_label_embedding: &Tensor,
        prev: &DecoderState,
        encoder_hidden_seq: &Tensor,
        time_index: usize,
        bridge: &StateBridge,
    ) -> Result<StepOutput> {
        let lstm_state = LSTMState::new(prev.hidden.clone(), prev.cell.clone());
        let next = self.cell.step(prev_label_embedding, &lstm_state)?;

        let (hidden, alignment) = match &self.attention {
            Some(attention) => {
                let (blended, alignment) =
                    attention.attend(next.h(), encoder_hidden_seq, time_index, bridge)?;
                (blended, Some(alignment))
            }
            None => (next.h().clone(), None),
        };

        let scores = self.hidden2score.forward(&hidden)?;
        let log_probs = candle_nn::ops::log_softmax(&scores, D::Minus1)?;

        Ok(StepOutput {
            state: DecoderState {
                hidden,
                cell: next.c().clone(),
            },
            scores,
            log_probs,
            alignment,
        })
    }
}

#[cfg(test)]
mod tests {
    use candle_core::DType;
    use candle_nn::VarMap;

    use super::*;
    use crate::config::AttentionKind;

    #[test]
    fn step_produces_normalized_log_probs() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let attention = Attention::new(AttentionKind::General, 4, vb.pp("attention"))?;
        let bridge = StateBridge::new(4, vb.pp("bridge"))?;
        let step = DecoderStep::new(6, 3, 4, 1, Some(attention), vb.pp("decoder"))?;

        let state = DecoderState {
            hidden: Tensor::zeros((2, 4), DType::F32, &Device::Cpu)?,
            cell: Tensor::zeros((2, 4), DType::F32, &Device::Cpu)?,
        };
        let encoded = Tensor::randn(0f32, 1., (5, 2, 8), &Device::Cpu)?;
        let out = step.step(&step.begin_embedding(2)?, &state, &encoded, 0, &bridge)?;

        assert_eq!(out.scores.dims(), &[2, 6]);
        assert_eq!(out.state.hidden.dims(), &[2, 4]);
        assert_eq!(out.alignment.as_ref().map(|a| a.dims().to_vec()), Some(vec![2, 5]));
        for row in out.log_probs.to_vec2::<f32>()? {
            assert!(row.iter().all(|&lp| lp <= 0.0));
            let mass: f32 = row.iter().map(|lp| lp.exp()).sum();
            assert!((mass - 1.0).abs() < 1e-5);
        }
        Ok(())
    }

    #[test]
    fn step_without_attention_has_no_alignment() -> Result<()> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let bridge = StateBridge::new(4, vb.pp("bridge"))?;
        let step = DecoderStep::new(6, 3, 4, 1, None, vb.pp("decoder"))?;
        assert!(!step.has_attention());

        let state = DecoderState {
            hidden: Tensor::zeros((1, 4), DType::F32, &Device::Cpu)?,
            cell: Tensor::zeros((1, 4), DType::F32, &Device::Cpu)?,
        };
        let encoded = Tensor::zeros((3, 1, 8), DType::F32, &Device::Cpu)?;
        let out = step.step(&step.embed_labels(&[5])?, &state, &encoded, 2, &bridge)?;
        assert!(out.alignment.is_none());
        Ok(())
    }
}
