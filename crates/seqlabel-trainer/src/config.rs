//! # Run Configuration
//!
//! Hyperparameters for one training or evaluation run, loaded from JSON.
//! Every field has a default so a config file only names what it changes.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::warn;

use seqlabel_core::{DecodeStrategy, ModelConfig, SeqLabelError};

/// Optimization and evaluation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Number of passes over the training split.
    pub max_epoch: usize,
    /// Shuffle batch order at the start of every epoch.
    pub shuffle: bool,
    /// Seed for the batch-order shuffle.
    pub seed: u64,
    /// Evaluation decoder: `0` greedy, otherwise the beam width.
    pub beam_size: usize,
    /// Added to the background score of positive gold positions in the training loss.
    pub background_penalty: f32,
    /// Run on the first CUDA device when one is available.
    pub gpu: bool,
    /// Where logs, checkpoints and result files go.
    pub result_dir: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_epoch: 300,
            shuffle: true,
            seed: 42,
            beam_size: 0,
            background_penalty: 1.5,
            gpu: false,
            result_dir: None,
        }
    }
}

impl TrainConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_epoch(mut self, max_epoch: usize) -> Self {
        self.max_epoch = max_epoch;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool, seed: u64) -> Self {
        self.shuffle = shuffle;
        self.seed = seed;
        self
    }

    pub fn with_beam_size(mut self, beam_size: usize) -> Self {
        self.beam_size = beam_size;
        self
    }

    pub fn with_background_penalty(mut self, penalty: f32) -> Self {
        self.background_penalty = penalty;
        self
    }

    pub fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }

    pub fn with_result_dir(mut self, result_dir: impl Into<PathBuf>) -> Self {
        self.result_dir = Some(result_dir.into());
        self
    }

    pub fn strategy(&self) -> DecodeStrategy {
        DecodeStrategy::from_beam_size(self.beam_size)
    }

    /// CUDA device 0 when `gpu` is set and available, otherwise the CPU.
    pub fn device(&self) -> Result<Device> {
        if !self.gpu {
            return Ok(Device::Cpu);
        }
        let device = Device::cuda_if_available(0).context("failed to open CUDA device 0")?;
        if device.is_cpu() {
            warn!("gpu requested but CUDA is unavailable, falling back to CPU");
        }
        Ok(device)
    }
}

/// Model and training settings of one run, as stored in a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub train: TrainConfig,
}

impl RunConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        ensure!(
            self.train.learning_rate > 0.0,
            "learning rate must be positive, got {}",
            self.train.learning_rate
        );
        ensure!(
            self.train.background_penalty.is_finite(),
            "background penalty must be finite"
        );
        if self.train.beam_size > self.model.label_size {
            return Err(SeqLabelError::BeamTooWide {
                beam_size: self.train.beam_size,
                label_size: self.model.label_size,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_defaults() {
        let config = TrainConfig::default();
        assert_eq!(config.max_epoch, 300);
        assert_eq!(config.background_penalty, 1.5);
        assert!(config.shuffle);
        assert_eq!(config.strategy(), DecodeStrategy::Greedy);
        assert!(config.device().unwrap().is_cpu());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{"model": {"vocab_size": 20, "attention": "dot"}, "train": {"beam_size": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.model.vocab_size, 20);
        assert_eq!(config.model.hidden_dim, 100);
        assert_eq!(config.train.strategy(), DecodeStrategy::Beam(3));
        assert_eq!(config.train.learning_rate, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn beam_wider_than_labels_is_rejected() {
        let config = RunConfig {
            model: ModelConfig::default(),
            train: TrainConfig::new().with_beam_size(13),
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SeqLabelError>(),
            Some(SeqLabelError::BeamTooWide { .. })
        ));
    }
}
