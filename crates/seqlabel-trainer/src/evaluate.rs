//! # Evaluation
//!
//! Decodes a dataset with the configured strategy and reports the mean
//! per-sentence cross-entropy together with positive-class F-score.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::Tensor;
use serde::Serialize;
use tracing::debug;

use seqlabel_core::{DecodeStrategy, PositiveCounts, SeqLabelError, Tagger};

use crate::data::{Dataset, Vocabulary};

/// Loss and F-score of one split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SplitScore {
    pub loss: f64,
    pub f_score: f64,
}

/// Everything one evaluation pass produced.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Sum of per-batch mean token losses weighted by batch size, divided
    /// by the number of sentences.
    pub loss: f64,
    pub counts: PositiveCounts,
    /// Predicted labels per sentence, in dataset order.
    pub predictions: Vec<Vec<u32>>,
}

impl Evaluation {
    pub fn f_score(&self) -> f64 {
        self.counts.f_score()
    }

    pub fn score(&self) -> SplitScore {
        SplitScore {
            loss: self.loss,
            f_score: self.f_score(),
        }
    }
}

pub struct Evaluator<'a> {
    tagger: &'a Tagger,
    strategy: DecodeStrategy,
}

impl<'a> Evaluator<'a> {
    pub fn new(tagger: &'a Tagger, strategy: DecodeStrategy) -> Self {
        Self { tagger, strategy }
    }

    pub fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation> {
        let config = self.tagger.config();
        let background = config.background_index;
        let mut total_loss = 0f64;
        let mut counts = PositiveCounts::default();
        let mut predictions = Vec::with_capacity(dataset.instance_count());

        for (i, batch) in dataset.batches.iter().enumerate() {
            batch
                .validate(config.vocab_size, config.label_size)
                .with_context(|| format!("invalid batch {i}"))?;
            let gold = batch
                .labels_time_major()
                .with_context(|| format!("batch {i}"))?;
            let out = self.tagger.decode(&batch.sentences, self.strategy)?;

            let targets = Tensor::new(gold.as_slice(), self.tagger.device())?;
            let loss = candle_nn::loss::cross_entropy(&out.scores, &targets)?.to_scalar::<f32>()?;
            total_loss += f64::from(loss) * batch.len() as f64;

            counts.update(&out.labels_time_major(), &gold, background)?;
            debug!(batch = i, loss, "evaluated batch");
            predictions.extend(out.labels);
        }

        let instances = dataset.instance_count().max(1);
        Ok(Evaluation {
            loss: total_loss / instances as f64,
            counts,
            predictions,
        })
    }
}

/// Writes per-token result files for one split into a directory.
pub struct ResultWriter {
    dir: PathBuf,
}

impl ResultWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Writes `sen_`, `label_` and `pred_<split>.txt` (one index per line)
    /// and, with a vocabulary, `result_processed_<split>.txt` holding
    /// `token gold predicted` per line.
    pub fn write(
        &self,
        split: &str,
        dataset: &Dataset,
        predictions: &[Vec<u32>],
        vocab: Option<&Vocabulary>,
    ) -> Result<()> {
        let tokens: Vec<u32> = dataset
            .batches
            .iter()
            .flat_map(|b| b.sentences.iter().flatten().copied())
            .collect();
        let gold: Vec<u32> = dataset
            .batches
            .iter()
            .flat_map(|b| b.labels.iter().flatten().copied())
            .collect();
        let predicted: Vec<u32> = predictions.iter().flatten().copied().collect();

        check_len("tokens vs gold labels", tokens.len(), gold.len())?;
        check_len("tokens vs predictions", tokens.len(), predicted.len())?;

        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        write_lines(&self.path("sen", split), tokens.iter())?;
        write_lines(&self.path("label", split), gold.iter())?;
        write_lines(&self.path("pred", split), predicted.iter())?;

        if let Some(vocab) = vocab {
            let rows = tokens.iter().zip(&gold).zip(&predicted).map(|((&w, &g), &p)| {
                format!("{} {} {}", vocab.word(w), vocab.label(g), vocab.label(p))
            });
            write_lines(&self.path("result_processed", split), rows)?;
        }
        Ok(())
    }

    fn path(&self, prefix: &str, split: &str) -> PathBuf {
        self.dir.join(format!("{prefix}_{split}.txt"))
    }
}

fn check_len(what: &'static str, left: usize, right: usize) -> Result<()> {
    if left != right {
        return Err(SeqLabelError::LengthMismatch { what, left, right }.into());
    }
    Ok(())
}

fn write_lines<T: std::fmt::Display>(path: &Path, lines: impl Iterator<Item = T>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        writeln!(out, "{line}")?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use candle_core::Device;
    use seqlabel_core::{build_tagger, AttentionKind, Batch, ModelConfig};

    use super::*;

    fn fixture() -> (Tagger, Dataset) {
        let config = ModelConfig::new()
            .with_vocab(10, 12)
            .with_dims(6, 5, 4)
            .with_attention(Some(AttentionKind::Dot));
        let (_varmap, tagger) = build_tagger(&config, &Device::Cpu).unwrap();
        let dataset = Dataset::new(vec![
            Batch::new(vec![vec![1, 2, 3], vec![4, 5, 6]], vec![vec![4, 5, 4], vec![6, 4, 4]]),
            Batch::new(vec![vec![7, 8]], vec![vec![5, 5]]),
        ]);
        (tagger, dataset)
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("seqlabel-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn evaluation_covers_every_sentence() {
        let (tagger, dataset) = fixture();
        for strategy in [DecodeStrategy::Greedy, DecodeStrategy::Beam(3)] {
            let eval = Evaluator::new(&tagger, strategy).evaluate(&dataset).unwrap();
            assert_eq!(eval.predictions.len(), 3);
            assert_eq!(eval.predictions[2].len(), 2);
            assert!(eval.loss.is_finite() && eval.loss > 0.0);
            assert_eq!(eval.counts.gold, 4);
            assert!((0.0..=100.0).contains(&eval.f_score()));
        }
    }

    #[test]
    fn evaluation_requires_gold_labels() {
        let (tagger, _) = fixture();
        let dataset = Dataset::new(vec![Batch::unlabeled(vec![vec![1, 2]])]);
        assert!(Evaluator::new(&tagger, DecodeStrategy::Greedy).evaluate(&dataset).is_err());
    }

    #[test]
    fn ragged_gold_rows_are_reported() {
        let (tagger, _) = fixture();
        let dataset = Dataset::new(vec![Batch::new(
            vec![vec![1, 2, 3], vec![4, 5, 6]],
            vec![vec![4, 5, 4], vec![6, 4]],
        )]);
        let err = Evaluator::new(&tagger, DecodeStrategy::Greedy)
            .evaluate(&dataset)
            .unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<SeqLabelError>(),
            Some(SeqLabelError::RaggedBatch { row: 1, expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn out_of_range_tokens_are_reported() {
        let (tagger, _) = fixture();
        let dataset = Dataset::new(vec![Batch::new(vec![vec![1, 10]], vec![vec![4, 5]])]);
        let err = Evaluator::new(&tagger, DecodeStrategy::Beam(2))
            .evaluate(&dataset)
            .unwrap_err();
        assert!(matches!(
            err.root_cause().downcast_ref::<SeqLabelError>(),
            Some(SeqLabelError::TokenOutOfRange { index: 10, .. })
        ));
    }

    #[test]
    fn result_files_have_one_line_per_token() {
        let (tagger, dataset) = fixture();
        let eval = Evaluator::new(&tagger, DecodeStrategy::Greedy).evaluate(&dataset).unwrap();
        let vocab = Vocabulary {
            words: (0..10).map(|i| format!("w{i}")).collect(),
            labels: (0..12).map(|i| format!("L{i}")).collect(),
        };

        let dir = scratch_dir("results");
        ResultWriter::new(&dir)
            .write("test", &dataset, &eval.predictions, Some(&vocab))
            .unwrap();

        let sen = std::fs::read_to_string(dir.join("sen_test.txt")).unwrap();
        assert_eq!(sen.lines().collect::<Vec<_>>(), ["1", "2", "3", "4", "5", "6", "7", "8"]);
        let processed = std::fs::read_to_string(dir.join("result_processed_test.txt")).unwrap();
        let first = processed.lines().next().unwrap();
        assert!(first.starts_with("w1 L4 L"));
        assert_eq!(processed.lines().count(), 8);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn mismatched_predictions_are_rejected() {
        let (_, dataset) = fixture();
        let dir = scratch_dir("mismatch");
        let err = ResultWriter::new(&dir)
            .write("dev", &dataset, &[vec![4, 4, 4]], None)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SeqLabelError>(),
            Some(SeqLabelError::LengthMismatch { left: 8, right: 3, .. })
        ));
        assert!(!dir.join("sen_dev.txt").exists());
    }
}
