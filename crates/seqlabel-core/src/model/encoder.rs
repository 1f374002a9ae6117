//! Bidirectional LSTM encoder over word embeddings.

use candle_core::{Device, Module, Result, Tensor};
use candle_nn::rnn::{LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::{Embedding, VarBuilder};

/// Output of one encoder pass.
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// Per-position states, `(seq_len, batch, 2 * hidden)`, forward half first.
    pub hidden_seq: Tensor,
    /// Final hidden states `[forward, backward]`, each `(batch, hidden)`.
    pub final_hidden: [Tensor; 2],
    /// Final cell states `[forward, backward]`, each `(batch, hidden)`.
    pub final_cell: [Tensor; 2],
}

/// Word embedding followed by a forward and a backward LSTM.
#[derive(Debug, Clone)]
pub struct SequenceEncoder {
    word_embedding: Embedding,
    forward: LSTM,
    backward: LSTM,
    vocab_size: usize,
    hidden_dim: usize,
    device: Device,
}

impl SequenceEncoder {
    pub fn new(
        vocab_size: usize,
        word_embedding_dim: usize,
        hidden_dim: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let word_embedding =
            candle_nn::embedding(vocab_size, word_embedding_dim, vb.pp("word_embedding"))?;
        let forward = candle_nn::lstm(
            word_embedding_dim,
            hidden_dim,
            LSTMConfig::default(),
            vb.pp("forward"),
        )?;
        let backward = candle_nn::lstm(
            word_embedding_dim,
            hidden_dim,
            LSTMConfig::default(),
            vb.pp("backward"),
        )?;

        Ok(Self {
            word_embedding,
            forward,
            backward,
            vocab_size,
            hidden_dim,
            device: vb.device().clone(),
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// All-zero `(2, batch, hidden)` initial hidden and cell states.
    pub fn zero_init(&self, batch_size: usize) -> Result<(Tensor, Tensor)> {
        let zeros = Tensor::zeros(
            (2, batch_size, self.hidden_dim),
            candle_core::DType::F32,
            &self.device,
        )?;
        Ok((zeros.clone(), zeros))
    }

    /// Encodes `(batch, seq_len)` token ids.
    ///
    /// `init_hidden` and `init_cell` are `(2, batch, hidden)`, index 0 for the
    /// forward direction and 1 for the backward one. The backward final state
    /// is the one reached after reading position 0.
    pub fn encode(
        &self,
        sentences: &Tensor,
        init_hidden: &Tensor,
        init_cell: &Tensor,
    ) -> Result<EncoderOutput> {
        let (_batch_size, seq_len) = sentences.dims2()?;
        let embedded = self.word_embedding.forward(sentences)?;

        let reversed_positions: Vec<u32> = (0..seq_len as u32).rev().collect();
        let reversed_positions = Tensor::new(reversed_positions.as_slice(), &self.device)?;
        let embedded_rev = embedded.index_select(&reversed_positions, 1)?;

        let fwd_init = LSTMState::new(init_hidden.get(0)?, init_cell.get(0)?);
        let bwd_init = LSTMState::new(init_hidden.get(1)?, init_cell.get(1)?);

        let fwd_states = self.forward.seq_init(&embedded, &fwd_init)?;
        let bwd_states = self.backward.seq_init(&embedded_rev, &bwd_init)?;

        // (batch, seq_len, hidden) each; backward realigned to source order
        let fwd_seq = self.forward.states_to_tensor(&fwd_states)?;
        let bwd_seq = self
            .backward
            .states_to_tensor(&bwd_states)?
            .index_select(&reversed_positions, 1)?;

        let hidden_seq = Tensor::cat(&[&fwd_seq, &bwd_seq], 2)?
            .transpose(0, 1)?
            .contiguous()?;

        let fwd_last = last_state(&fwd_states, &fwd_init);
        let bwd_last = last_state(&bwd_states, &bwd_init);

        Ok(EncoderOutput {
            hidden_seq,
            final_hidden: [fwd_last.h().clone(), bwd_last.h().clone()],
            final_cell: [fwd_last.c().clone(), bwd_last.c().clone()],
        })
    }
}

fn last_state<'a>(states: &'a [LSTMState], init: &'a LSTMState) -> &'a LSTMState {
    states.last().unwrap_or(init)
}
