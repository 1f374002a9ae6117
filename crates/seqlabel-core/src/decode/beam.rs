//! # Beam Search
//!
//! Keeps `beam_size` partial label sequences per sentence. Every step
//! extends each surviving slot with every label, scores the extension by
//! the slot's cumulative log-probability plus the step's log-probability,
//! and keeps the best `beam_size` of the `beam_size × label_size`
//! candidates. The search writes one immutable [`BeamStep`] per position;
//! backtracking reads them in reverse.

use candle_core::Tensor;
use tracing::trace;

use crate::decode::{gather_rows, top_k};
use crate::error::{Result, SeqLabelError};
use crate::model::{DecoderState, DecoderStep, StateBridge};
use crate::types::{AttentionTrace, DecodeOutput};

/// Snapshot of the beam after one output position.
///
/// `labels`, `backpointers` and `cumulative` are indexed `[batch][slot]`,
/// slots ordered best first. The tensors are indexed by the *source* slot
/// of the previous step that was extended to produce them; each is
/// `(batch, label_size)` (or `(batch, source_len)` for alignments).
#[derive(Debug, Clone)]
pub struct BeamStep {
    pub labels: Vec<Vec<u32>>,
    pub backpointers: Vec<Vec<usize>>,
    pub cumulative: Vec<Vec<f32>>,
    pub scores: Vec<Tensor>,
    pub log_probs: Vec<Tensor>,
    /// Empty when attention is disabled.
    pub alignments: Vec<Tensor>,
}

impl BeamStep {
    pub fn beam_width(&self) -> usize {
        self.labels.first().map_or(0, Vec::len)
    }
}

/// Append-only record of a whole search.
#[derive(Debug, Clone, Default)]
pub struct BeamHistory {
    steps: Vec<BeamStep>,
}

impl BeamHistory {
    pub fn steps(&self) -> &[BeamStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn push(&mut self, step: BeamStep) {
        self.steps.push(step);
    }

    /// Slot occupied by the best final hypothesis of `batch_index` at every
    /// step, found by following backpointers from slot 0 of the last step.
    pub fn path_slots(&self, batch_index: usize) -> Vec<usize> {
        let mut slots = vec![0; self.steps.len()];
        let mut slot = 0;
        for (t, step) in self.steps.iter().enumerate().rev() {
            slots[t] = slot;
            slot = step.backpointers[batch_index][slot];
        }
        slots
    }
}

/// Slot being extended at the current step.
struct Frontier {
    label_embedding: Tensor,
    state: DecoderState,
}

/// Beam search over the decoder step.
#[derive(Debug, Clone, Copy)]
pub struct BeamSearchDecoder<'a> {
    step: &'a DecoderStep,
    bridge: &'a StateBridge,
    beam_size: usize,
}

impl<'a> BeamSearchDecoder<'a> {
    pub fn new(step: &'a DecoderStep, bridge: &'a StateBridge, beam_size: usize) -> Result<Self> {
        if beam_size == 0 {
            return Err(SeqLabelError::InvalidBeamSize);
        }
        let label_size = step.label_size();
        if beam_size > label_size {
            return Err(SeqLabelError::BeamTooWide {
                beam_size,
                label_size,
            });
        }
        Ok(Self {
            step,
            bridge,
            beam_size,
        })
    }

    pub fn beam_size(&self) -> usize {
        self.beam_size
    }

    /// Searches and returns the best hypothesis per sentence.
    pub fn decode(
        &self,
        batch_size: usize,
        seq_len: usize,
        init_state: &DecoderState,
        encoder_hidden_seq: &Tensor,
    ) -> Result<DecodeOutput> {
        let history = self.search(batch_size, seq_len, init_state, encoder_hidden_seq)?;
        self.backtrack(&history)
    }

    /// Runs the search and keeps every step.
    pub fn search(
        &self,
        batch_size: usize,
        seq_len: usize,
        init_state: &DecoderState,
        encoder_hidden_seq: &Tensor,
    ) -> Result<BeamHistory> {
        if batch_size == 0 {
            return Err(SeqLabelError::EmptyBatch);
        }
        if seq_len == 0 {
            return Err(SeqLabelError::EmptySequence);
        }

        let label_size = self.step.label_size();
        let mut history = BeamHistory::default();

        // Position 0 extends a single implicit slot holding the begin label.
        let mut frontier = vec![Frontier {
            label_embedding: self.step.begin_embedding(batch_size)?,
            state: init_state.clone(),
        }];
        let mut cumulative = vec![vec![0f32]; batch_size];

        for t in 0..seq_len {
            let mut scores = Vec::with_capacity(frontier.len());
            let mut log_probs = Vec::with_capacity(frontier.len());
            let mut alignments = Vec::new();
            let mut hiddens = Vec::with_capacity(frontier.len());
            let mut cells = Vec::with_capacity(frontier.len());
            let mut host_log_probs = Vec::with_capacity(frontier.len());

            for slot in &frontier {
                let out = self.step.step(
                    &slot.label_embedding,
                    &slot.state,
                    encoder_hidden_seq,
                    t,
                    self.bridge,
                )?;
                host_log_probs.push(out.log_probs.to_vec2::<f32>()?);
                scores.push(out.scores);
                log_probs.push(out.log_probs);
                if let Some(alignment) = out.alignment {
                    alignments.push(alignment);
                }
                hiddens.push(out.state.hidden);
                cells.push(out.state.cell);
            }

            let mut labels: Vec<Vec<u32>> = Vec::with_capacity(batch_size);
            let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(batch_size);
            let mut next_cumulative: Vec<Vec<f32>> = Vec::with_capacity(batch_size);

            for b in 0..batch_size {
                let candidates: Vec<f32> = host_log_probs
                    .iter()
                    .enumerate()
                    .flat_map(|(source, rows)| {
                        let prefix = cumulative[b][source];
                        rows[b].iter().map(move |lp| prefix + lp)
                    })
                    .collect();

                let picked = top_k(&candidates, self.beam_size);
                labels.push(picked.iter().map(|&(i, _)| (i % label_size) as u32).collect());
                backpointers.push(picked.iter().map(|&(i, _)| i / label_size).collect());
                next_cumulative.push(picked.iter().map(|&(_, v)| v).collect());
            }

            trace!(t, best = ?next_cumulative.iter().map(|c| c[0]).collect::<Vec<_>>(), "beam step");

            if t + 1 < seq_len {
                frontier = self.advance(&labels, &backpointers, &hiddens, &cells)?;
            }
            cumulative = next_cumulative.clone();

            history.push(BeamStep {
                labels,
                backpointers,
                cumulative: next_cumulative,
                scores,
                log_probs,
                alignments,
            });
        }

        Ok(history)
    }

    /// Builds the slots to extend at the next step: each selected hypothesis
    /// carries the label it just emitted and the state its source slot produced.
    fn advance(
        &self,
        labels: &[Vec<u32>],
        backpointers: &[Vec<usize>],
        hiddens: &[Tensor],
        cells: &[Tensor],
    ) -> Result<Vec<Frontier>> {
        (0..self.beam_size)
            .map(|slot| -> Result<Frontier> {
                let sources: Vec<usize> = backpointers.iter().map(|bp| bp[slot]).collect();
                let emitted: Vec<u32> = labels.iter().map(|l| l[slot]).collect();
                Ok(Frontier {
                    label_embedding: self.step.embed_labels(&emitted)?,
                    state: DecoderState {
                        hidden: gather_rows(hiddens, &sources)?,
                        cell: gather_rows(cells, &sources)?,
                    },
                })
            })
            .collect()
    }

    /// Reconstructs the best hypothesis of every sentence from `history`.
    pub fn backtrack(&self, history: &BeamHistory) -> Result<DecodeOutput> {
        let steps = history.steps();
        let seq_len = steps.len();
        let batch_size = steps.first().map_or(0, |s| s.labels.len());
        if batch_size == 0 || seq_len == 0 {
            return Err(SeqLabelError::EmptySequence);
        }

        let mut labels = vec![vec![0u32; seq_len]; batch_size];
        let mut path_log_probs = vec![vec![0f32; seq_len]; batch_size];
        // sources[t][b]: slot of step t - 1 the chosen path extended at step t.
        let mut sources = vec![vec![0usize; batch_size]; seq_len];

        for b in 0..batch_size {
            for (t, &slot) in history.path_slots(b).iter().enumerate() {
                let step = &steps[t];
                labels[b][t] = step.labels[b][slot];
                path_log_probs[b][t] = step.cumulative[b][slot];
                sources[t][b] = step.backpointers[b][slot];
            }
        }

        let mut scores = Vec::with_capacity(seq_len);
        let mut log_probs = Vec::with_capacity(seq_len);
        let mut alignments = Vec::with_capacity(seq_len);
        for (step, slots) in steps.iter().zip(&sources) {
            scores.push(gather_rows(&step.scores, slots)?);
            log_probs.push(gather_rows(&step.log_probs, slots)?);
            if !step.alignments.is_empty() {
                alignments.push(gather_rows(&step.alignments, slots)?);
            }
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
