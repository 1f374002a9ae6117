//! Training loop for the tagger.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use candle_nn::{AdamW, VarMap};
use serde::Serialize;
use tracing::{debug, info};

use seqlabel_core::{training_loss, Batch, Tagger};

use crate::config::TrainConfig;
use crate::data::{Dataset, Splits};
use crate::evaluate::{Evaluator, SplitScore};
use crate::optim::{adam, GradientStep};

/// Outcome of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochSummary {
    pub epoch: usize,
    /// Training loss accumulated while the parameters were changing.
    pub accumulated_loss: f64,
    pub train: SplitScore,
    pub validation: SplitScore,
    pub test: SplitScore,
    pub elapsed_secs: f64,
}

impl EpochSummary {
    /// Tab-separated record as written to `log.txt`. Columns are epoch,
    /// accumulated loss, the train/validation/test losses, then the
    /// train/validation/test F-scores and the elapsed seconds.
    pub fn to_record(&self) -> String {
        format!(
            "{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.6}\t{:.3}",
            self.epoch,
            self.accumulated_loss,
            self.train.loss,
            self.validation.loss,
            self.test.loss,
            self.train.f_score,
            self.validation.f_score,
            self.test.f_score,
            self.elapsed_secs,
        )
    }
}

/// Per-epoch log file, truncated when opened.
pub struct EpochLog {
    out: BufWriter<File>,
}

impl EpochLog {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self {
            out: BufWriter::new(file),
        })
    }

    pub fn append(&mut self, summary: &EpochSummary) -> Result<()> {
        writeln!(self.out, "{}", summary.to_record())?;
        self.out.flush()?;
        Ok(())
    }
}

pub struct Trainer<O = AdamW> {
    tagger: Tagger,
    varmap: VarMap,
    optimizer: O,
    config: TrainConfig,
    rng: oorandom::Rand64,
}

impl Trainer<AdamW> {
    /// Trainer with Adam over every parameter of `varmap`.
    pub fn new(tagger: Tagger, varmap: VarMap, config: TrainConfig) -> Result<Self> {
        let optimizer = adam(&varmap, config.learning_rate)?;
        Ok(Self::with_optimizer(tagger, varmap, config, optimizer))
    }
}

impl<O: GradientStep> Trainer<O> {
    pub fn with_optimizer(tagger: Tagger, varmap: VarMap, config: TrainConfig, optimizer: O) -> Self {
        let rng = oorandom::Rand64::new(u128::from(config.seed));
        Self {
            tagger,
            varmap,
            optimizer,
            config,
            rng,
        }
    }

    pub fn tagger(&self) -> &Tagger {
        &self.tagger
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// One teacher-forced update on `batch`; returns the mean token loss.
    pub fn train_batch(&mut self, batch: &Batch) -> Result<f32> {
        let model = self.tagger.config();
        batch.validate(model.vocab_size, model.label_size)?;
        if !batch.is_labeled() {
            return Err(seqlabel_core::SeqLabelError::MissingLabels.into());
        }

        let encoded = self.tagger.encode_batch(&batch.sentences)?;
        let forced = self.tagger.teacher_forced().decode(
            &batch.labels,
            &encoded.init_state,
            &encoded.encoded.hidden_seq,
        )?;
        let loss = training_loss(
            &forced.scores,
            &batch.labels,
            model.background_index,
            self.config.background_penalty,
        )?;
        self.optimizer.accumulate_gradient_and_step(&loss)?;
        Ok(loss.to_scalar::<f32>()?)
    }

    /// Batch visiting order for the next epoch.
    fn epoch_order(&mut self, num_batches: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..num_batches).collect();
        if self.config.shuffle {
            for i in (1..order.len()).rev() {
                let j = self.rng.rand_range(0..(i as u64 + 1)) as usize;
                order.swap(i, j);
            }
        }
        order
    }

    /// One pass over `dataset`; returns the loss summed as
    /// `loss × batch_size` and divided by the number of sentences.
    pub fn train_epoch(&mut self, dataset: &Dataset) -> Result<f64> {
        let order = self.epoch_order(dataset.batches.len());
        let mut total = 0f64;
        for (step, &index) in order.iter().enumerate() {
            let batch = &dataset.batches[index];
            let loss = self
                .train_batch(batch)
                .with_context(|| format!("training batch {index}"))?;
            debug!(step, batch = index, loss, "trained batch");
            total += f64::from(loss) * batch.len() as f64;
        }
        Ok(total / dataset.instance_count().max(1) as f64)
    }

    /// Runs `max_epoch` epochs, evaluating every split after each one.
    pub fn fit(&mut self, splits: &Splits, mut log: Option<&mut EpochLog>) -> Result<Vec<EpochSummary>> {
        info!(
            epochs = self.config.max_epoch,
            train_batches = splits.train.batches.len(),
            strategy = ?self.config.strategy(),
            "starting training"
        );

        let mut summaries = Vec::with_capacity(self.config.max_epoch);
        for epoch in 0..self.config.max_epoch {
            let started = Instant::now();
            let accumulated_loss = self.train_epoch(&splits.train)?;

            let evaluator = Evaluator::new(&self.tagger, self.config.strategy());
            let [train, validation, test] = splits.named().map(|(name, dataset)| {
                evaluator
                    .evaluate(dataset)
                    .map(|eval| eval.score())
                    .with_context(|| format!("evaluating {name} split"))
            });

            let summary = EpochSummary {
                epoch,
                accumulated_loss,
                train: train?,
                validation: validation?,
                test: test?,
                elapsed_secs: started.elapsed().as_secs_f64(),
            };
            info!(
                epoch,
                accumulated_loss,
                train_loss = summary.train.loss,
                train_f = summary.train.f_score,
                validation_loss = summary.validation.loss,
                validation_f = summary.validation.f_score,
                test_loss = summary.test.loss,
                test_f = summary.test.f_score,
                elapsed_secs = summary.elapsed_secs,
                "epoch finished"
            );
            if let Some(log) = log.as_deref_mut() {
                log.append(&summary)?;
            }
            summaries.push(summary);
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use candle_core::Device;
    use candle_nn::{Optimizer, SGD};
    use seqlabel_core::{build_tagger, ModelConfig};

    use super::*;

    fn small_trainer(config: TrainConfig) -> Trainer {
        let model = ModelConfig::new().with_vocab(10, 12).with_dims(6, 5, 4);
        let (varmap, tagger) = build_tagger(&model, &Device::Cpu).unwrap();
        Trainer::new(tagger, varmap, config).unwrap()
    }

    fn toy_dataset() -> Dataset {
        Dataset::new(vec![
            Batch::new(vec![vec![1, 2, 3], vec![3, 2, 1]], vec![vec![5, 4, 4], vec![4, 4, 6]]),
            Batch::new(vec![vec![7, 8]], vec![vec![5, 6]]),
            Batch::new(vec![vec![9, 9, 9, 9]], vec![vec![4, 4, 4, 4]]),
        ])
    }

    #[test]
    fn shuffle_is_a_seeded_permutation() {
        let config = TrainConfig::new().with_shuffle(true, 7);
        let mut a = small_trainer(config.clone());
        let mut b = small_trainer(config);

        let first = a.epoch_order(10);
        assert_eq!(first, b.epoch_order(10));
        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn no_shuffle_keeps_dataset_order() {
        let mut trainer = small_trainer(TrainConfig::new().with_shuffle(false, 0));
        assert_eq!(trainer.epoch_order(4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn repeated_updates_lower_the_loss_on_one_batch() {
        let mut trainer = small_trainer(TrainConfig::new().with_learning_rate(0.05));
        let batch = &toy_dataset().batches[0];
        let first = trainer.train_batch(batch).unwrap();
        let mut last = first;
        for _ in 0..30 {
            last = trainer.train_batch(batch).unwrap();
        }
        assert!(last < first, "{last} !< {first}");
    }

    #[test]
    fn custom_optimizer_drives_the_epoch() {
        let model = ModelConfig::new().with_vocab(10, 12).with_dims(6, 5, 4);
        let (varmap, tagger) = build_tagger(&model, &Device::Cpu).unwrap();
        let sgd = SGD::new(varmap.all_vars(), 0.1).unwrap();
        let mut trainer = Trainer::with_optimizer(tagger, varmap, TrainConfig::new(), sgd);

        let loss = trainer.train_epoch(&toy_dataset()).unwrap();
        assert!(loss.is_finite() && loss > 0.0);
    }

    #[test]
    fn unlabeled_batch_is_rejected() {
        let mut trainer = small_trainer(TrainConfig::new());
        let err = trainer
            .train_batch(&Batch::unlabeled(vec![vec![1, 2]]))
            .unwrap_err();
        assert!(err.to_string().contains("no gold labels"));
    }

    #[test]
    fn record_is_tab_separated() {
        let summary = EpochSummary {
            epoch: 3,
            accumulated_loss: 1.25,
            train: SplitScore { loss: 1.0, f_score: 50.0 },
            validation: SplitScore { loss: 2.0, f_score: 60.0 },
            test: SplitScore { loss: 3.0, f_score: 70.0 },
            elapsed_secs: 0.5,
        };
        let record = summary.to_record();
        let fields: Vec<&str> = record.split('\t').collect();
        assert_eq!(
            fields,
            [
                "3", "1.250000", "1.000000", "2.000000", "3.000000", "50.000000", "60.000000",
                "70.000000", "0.500",
            ]
        );
    }
}
