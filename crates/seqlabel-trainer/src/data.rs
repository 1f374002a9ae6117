//! Dataset, vocabulary and pretrained embedding files.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use seqlabel_core::{Batch, ModelConfig};

/// A split of pre-batched, index-encoded sentences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub batches: Vec<Batch>,
}

impl Dataset {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self { batches }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse dataset {}", path.display()))
    }

    /// Total number of sentences over all batches.
    pub fn instance_count(&self) -> usize {
        self.batches.iter().map(Batch::len).sum()
    }

    /// Checks every batch against the model's vocabulary sizes.
    pub fn validate(&self, config: &ModelConfig) -> Result<()> {
        ensure!(!self.batches.is_empty(), "dataset has no batches");
        for (i, batch) in self.batches.iter().enumerate() {
            batch
                .validate(config.vocab_size, config.label_size)
                .with_context(|| format!("invalid batch {i}"))?;
            ensure!(batch.is_labeled(), "batch {i} has no gold labels");
        }
        Ok(())
    }
}

/// Train, validation and test splits of one run.
#[derive(Debug, Clone)]
pub struct Splits {
    pub train: Dataset,
    pub validation: Dataset,
    pub test: Dataset,
}

impl Splits {
    pub fn load(
        train: impl AsRef<Path>,
        validation: impl AsRef<Path>,
        test: impl AsRef<Path>,
    ) -> Result<Self> {
        Ok(Self {
            train: Dataset::from_file(train)?,
            validation: Dataset::from_file(validation)?,
            test: Dataset::from_file(test)?,
        })
    }

    pub fn validate(&self, config: &ModelConfig) -> Result<()> {
        self.train.validate(config).context("train split")?;
        self.validation.validate(config).context("validation split")?;
        self.test.validate(config).context("test split")?;
        Ok(())
    }

    /// `(name, dataset)` pairs in reporting order.
    pub fn named(&self) -> [(&'static str, &Dataset); 3] {
        [
            ("train", &self.train),
            ("validation", &self.validation),
            ("test", &self.test),
        ]
    }
}

/// Index → text tables for words and labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    pub words: Vec<String>,
    pub labels: Vec<String>,
}

impl Vocabulary {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read vocabulary {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse vocabulary {}", path.display()))
    }

    pub fn check(&self, config: &ModelConfig) -> Result<()> {
        ensure!(
            self.words.len() == config.vocab_size,
            "vocabulary has {} words, model expects {}",
            self.words.len(),
            config.vocab_size
        );
        ensure!(
            self.labels.len() == config.label_size,
            "vocabulary has {} labels, model expects {}",
            self.labels.len(),
            config.label_size
        );
        Ok(())
    }

    pub fn word(&self, index: u32) -> &str {
        self.words.get(index as usize).map_or("<unk>", String::as_str)
    }

    pub fn label(&self, index: u32) -> &str {
        self.labels.get(index as usize).map_or("<unk>", String::as_str)
    }
}

/// Row-major embedding table read from a whitespace-separated text file.
#[derive(Debug, Clone, PartialEq)]
pub struct PretrainedEmbedding {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<f32>,
}

impl PretrainedEmbedding {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read embedding {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid embedding {}", path.display()))
    }

    /// One row per non-empty line; every row must have the same width.
    pub fn parse(text: &str) -> Result<Self> {
        let mut values = Vec::new();
        let mut cols = None;
        let mut rows = 0;

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let before = values.len();
            for field in line.split_whitespace() {
                let value: f32 = field
                    .parse()
                    .with_context(|| format!("line {}: bad number {field:?}", line_no + 1))?;
                values.push(value);
            }
            let width = values.len() - before;
            match cols {
                None => cols = Some(width),
                Some(expected) => ensure!(
                    width == expected,
                    "line {}: {width} columns, expected {expected}",
                    line_no + 1
                ),
            }
            rows += 1;
        }

        let cols = cols.context("embedding file is empty")?;
        Ok(Self { rows, cols, values })
    }
}
