//! # Encoder-Decoder Tagger
//!
//! Owns every learned module and wires encode → bridge → decode.

pub mod attention;
pub mod bridge;
pub mod decoder;
pub mod encoder;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use tracing::debug;

pub use attention::Attention;
pub use bridge::StateBridge;
pub use decoder::{DecoderState, DecoderStep, StepOutput};
pub use encoder::{EncoderOutput, SequenceEncoder};

use crate::config::ModelConfig;
use crate::decode::{BeamSearchDecoder, DecodeStrategy, GreedyDecoder, TeacherForcedDecoder};
use crate::error::{Result, SeqLabelError};
use crate::types::{check_range, check_rectangular, DecodeOutput};

/// Parameter name of the word embedding table inside the tagger's `VarMap`.
pub const WORD_EMBEDDING_VAR: &str = "encoder.word_embedding.weight";

/// Attention-augmented BiLSTM encoder / LSTM decoder sequence labeler.
#[derive(Debug, Clone)]
pub struct Tagger {
    config: ModelConfig,
    encoder: SequenceEncoder,
    bridge: StateBridge,
    decoder: DecoderStep,
    device: Device,
}

/// Encoder pass plus the bridged decoder initial state for one batch.
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    pub encoded: EncoderOutput,
    pub init_state: DecoderState,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl Tagger {
    /// Build a tagger whose parameters live under `vb`.
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let encoder = SequenceEncoder::new(
            config.vocab_size,
            config.word_embedding_dim,
            config.hidden_dim,
            vb.pp("encoder"),
        )?;
        let bridge = StateBridge::new(config.hidden_dim, vb.pp("bridge"))?;
        let attention = config
            .attention
            .map(|kind| Attention::new(kind, config.hidden_dim, vb.pp("attention")))
            .transpose()?;
        let decoder = DecoderStep::new(
            config.label_size,
            config.label_embedding_dim,
            config.hidden_dim,
            config.begin_index,
            attention,
            vb.pp("decoder"),
        )?;

        debug!(
            vocab_size = config.vocab_size,
            label_size = config.label_size,
            hidden_dim = config.hidden_dim,
            attention = ?config.attention,
            "built tagger"
        );

        Ok(Self {
            config: config.clone(),
            encoder,
            bridge,
            decoder,
            device: vb.device().clone(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn encoder(&self) -> &SequenceEncoder {
        &self.encoder
    }

    pub fn bridge(&self) -> &StateBridge {
        &self.bridge
    }

    pub fn decoder_step(&self) -> &DecoderStep {
        &self.decoder
    }

    /// Overwrites the word embedding table held in `varmap` with pretrained
    /// rows. `values` is row-major `rows × cols`.
    pub fn load_pretrained_word_embedding(
        &self,
        varmap: &mut VarMap,
        rows: usize,
        cols: usize,
        values: Vec<f32>,
    ) -> Result<()> {
        if rows != self.config.vocab_size || cols != self.config.word_embedding_dim {
            return Err(SeqLabelError::ConfigMismatch(format!(
                "pretrained embedding is {rows}x{cols}, model expects {}x{}",
                self.config.vocab_size, self.config.word_embedding_dim
            )));
        }
        let table = Tensor::from_vec(values, (rows, cols), &self.device)?;
        varmap.set_one(WORD_EMBEDDING_VAR, table)?;
        Ok(())
    }

    /// Validates `sentences` and runs the encoder and bridge over them.
    pub fn encode_batch(&self, sentences: &[Vec<u32>]) -> Result<EncodedBatch> {
        let (batch_size, seq_len) = check_rectangular(sentences)?;
        check_range(sentences, self.config.vocab_size, |index, vocab_size| {
            SeqLabelError::TokenOutOfRange { index, vocab_size }
        })?;

        let flat: Vec<u32> = sentences.iter().flatten().copied().collect();
        let ids = Tensor::from_vec(flat, (batch_size, seq_len), &self.device)?;
        let (h0, c0) = self.encoder.zero_init(batch_size)?;
        let encoded = self.encoder.encode(&ids, &h0, &c0)?;
        let init_state = self.bridge.initial_state(&encoded)?;

        Ok(EncodedBatch {
            encoded,
            init_state,
            batch_size,
            seq_len,
        })
    }

    pub fn greedy(&self) -> GreedyDecoder<'_> {
        GreedyDecoder::new(&self.decoder, &self.bridge)
    }

    /// Beam decoder with `beam_size` hypotheses per sentence; rejects
    /// `0` and anything wider than the label vocabulary.
    pub fn beam(&self, beam_size: usize) -> Result<BeamSearchDecoder<'_>> {
        BeamSearchDecoder::new(&self.decoder, &self.bridge, beam_size)
    }

    pub fn teacher_forced(&self) -> TeacherForcedDecoder<'_> {
        TeacherForcedDecoder::new(&self.decoder, &self.bridge)
    }

    /// Encodes and decodes `sentences` with the given strategy.
    pub fn decode(&self, sentences: &[Vec<u32>], strategy: DecodeStrategy) -> Result<DecodeOutput> {
        let batch = self.encode_batch(sentences)?;
        self.decode_encoded(&batch, strategy)
    }

    /// Decodes an already encoded batch.
    pub fn decode_encoded(
        &self,
        batch: &EncodedBatch,
        strategy: DecodeStrategy,
    ) -> Result<DecodeOutput> {
        match strategy {
            DecodeStrategy::Greedy => self.greedy().decode(
                batch.batch_size,
                batch.seq_len,
                &batch.init_state,
                &batch.encoded.hidden_seq,
            ),
            DecodeStrategy::Beam(beam_size) => self.beam(beam_size)?.decode(
                batch.batch_size,
                batch.seq_len,
                &batch.init_state,
                &batch.encoded.hidden_seq,
            ),
        }
    }
}

/// Fresh `VarMap` plus a tagger whose parameters are registered in it.
pub fn build_tagger(config: &ModelConfig, device: &Device) -> Result<(VarMap, Tagger)> {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let tagger = Tagger::new(config, vb)?;
    Ok((varmap, tagger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttentionKind;
    use crate::testing::small_config;

    #[test]
    fn encode_batch_rejects_out_of_range_tokens() {
        let (_varmap, tagger) = build_tagger(&small_config(None), &Device::Cpu).unwrap();
        let err = tagger.encode_batch(&[vec![1, 2, 10]]).unwrap_err();
        assert!(matches!(
            err,
            SeqLabelError::TokenOutOfRange { index: 10, vocab_size: 10 }
        ));
    }

    #[test]
    fn encode_batch_reports_shape() {
        let config = small_config(Some(AttentionKind::Fixed));
        let (_varmap, tagger) = build_tagger(&config, &Device::Cpu).unwrap();
        let batch = tagger.encode_batch(&[vec![2, 5, 7], vec![0, 1, 9]]).unwrap();
        assert_eq!(batch.batch_size, 2);
        assert_eq!(batch.seq_len, 3);
        assert_eq!(batch.init_state.hidden.dims(), &[2, config.hidden_dim]);
        assert_eq!(
            batch.encoded.hidden_seq.dims(),
            &[3, 2, 2 * config.hidden_dim]
        );
    }

    #[test]
    fn pretrained_embedding_shape_must_match() {
        let config = small_config(None);
        let (mut varmap, tagger) = build_tagger(&config, &Device::Cpu).unwrap();

        let wrong = vec![0.0; 9 * config.word_embedding_dim];
        assert!(matches!(
            tagger.load_pretrained_word_embedding(&mut varmap, 9, config.word_embedding_dim, wrong),
            Err(SeqLabelError::ConfigMismatch(_))
        ));

        let rows = config.vocab_size;
        let cols = config.word_embedding_dim;
        let values: Vec<f32> = (0..rows * cols).map(|i| i as f32 * 0.01).collect();
        tagger
            .load_pretrained_word_embedding(&mut varmap, rows, cols, values.clone())
            .unwrap();
        let stored = varmap.data().lock().unwrap()[WORD_EMBEDDING_VAR]
            .as_tensor()
            .flatten_all()
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        assert_eq!(stored, values);
    }
}
