//! Seqlabel command line
//!
//! Trains a tagger from JSON dataset files or evaluates a saved checkpoint.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use seqlabel_core::{build_tagger, Tagger};
use seqlabel_trainer::{
    Dataset, EpochLog, Evaluator, PretrainedEmbedding, ResultWriter, RunConfig, Splits, Trainer,
    Vocabulary, CHECKPOINT_FILE,
};

#[derive(Parser)]
#[command(name = "seqlabel")]
#[command(about = "Train and evaluate an attention encoder-decoder sequence labeler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a new model
    Train {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Training split
        #[arg(long)]
        train: PathBuf,
        /// Validation split
        #[arg(long)]
        validation: PathBuf,
        /// Test split
        #[arg(long)]
        test: PathBuf,
        /// Word and label vocabulary, enables readable result files
        #[arg(long)]
        vocab: Option<PathBuf>,
        /// Pretrained word embedding table (whitespace-separated text)
        #[arg(long)]
        pretrained: Option<PathBuf>,
        /// Output directory for log, checkpoint and results
        #[arg(short, long)]
        result_dir: Option<PathBuf>,
        /// Override the number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,
        /// Override the evaluation beam size (0 = greedy)
        #[arg(short, long)]
        beam_size: Option<usize>,
        /// Keep batch order fixed across epochs
        #[arg(long)]
        no_shuffle: bool,
        /// Use CUDA when available
        #[arg(long)]
        gpu: bool,
    },
    /// Evaluate a saved checkpoint on one dataset
    Evaluate {
        /// Run configuration the checkpoint was trained with (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Checkpoint written by `train`
        #[arg(long)]
        checkpoint: PathBuf,
        /// Dataset to evaluate
        #[arg(short, long)]
        data: PathBuf,
        /// Word and label vocabulary
        #[arg(long)]
        vocab: Option<PathBuf>,
        /// Directory for result files
        #[arg(short, long)]
        result_dir: Option<PathBuf>,
        /// Override the beam size (0 = greedy)
        #[arg(short, long)]
        beam_size: Option<usize>,
        /// Suffix of the result file names
        #[arg(long, default_value = "eval")]
        split_name: String,
    },
}

fn load_vocab(path: Option<&Path>, run: &RunConfig) -> Result<Option<Vocabulary>> {
    path.map(|path| -> Result<Vocabulary> {
        let vocab = Vocabulary::from_file(path)?;
        vocab.check(&run.model)?;
        Ok(vocab)
    })
    .transpose()
}

fn write_results(
    tagger: &Tagger,
    run: &RunConfig,
    dir: &Path,
    named: &[(&str, &Dataset)],
    vocab: Option<&Vocabulary>,
) -> Result<()> {
    let evaluator = Evaluator::new(tagger, run.train.strategy());
    let writer = ResultWriter::new(dir);
    for &(name, dataset) in named {
        let eval = evaluator.evaluate(dataset)?;
        writer.write(name, dataset, &eval.predictions, vocab)?;
        info!(split = name, loss = eval.loss, f_score = eval.f_score(), "wrote results");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn train(
    config: &Path,
    train: &Path,
    validation: &Path,
    test: &Path,
    vocab: Option<&Path>,
    pretrained: Option<&Path>,
    result_dir: Option<PathBuf>,
    epochs: Option<usize>,
    beam_size: Option<usize>,
    no_shuffle: bool,
    gpu: bool,
) -> Result<()> {
    let mut run = RunConfig::from_file(config)?;
    if let Some(epochs) = epochs {
        run.train.max_epoch = epochs;
    }
    if let Some(beam_size) = beam_size {
        run.train.beam_size = beam_size;
    }
    if no_shuffle {
        run.train.shuffle = false;
    }
    run.train.gpu |= gpu;
    if result_dir.is_some() {
        run.train.result_dir = result_dir;
    }
    run.validate()?;

    let splits = Splits::load(train, validation, test)?;
    splits.validate(&run.model)?;
    let vocab = load_vocab(vocab, &run)?;

    let device = run.train.device()?;
    let (mut varmap, tagger) = build_tagger(&run.model, &device)?;
    if let Some(path) = pretrained {
        let table = PretrainedEmbedding::from_file(path)?;
        tagger.load_pretrained_word_embedding(&mut varmap, table.rows, table.cols, table.values)?;
        info!(path = %path.display(), "loaded pretrained word embedding");
    }

    let result_dir = run.train.result_dir.clone();
    let mut log = match &result_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            Some(EpochLog::create(dir.join("log.txt"))?)
        }
        None => None,
    };

    let mut trainer = Trainer::new(tagger, varmap, run.train.clone())?;
    let summaries = trainer.fit(&splits, log.as_mut())?;

    if let Some(dir) = result_dir {
        let checkpoint = dir.join(CHECKPOINT_FILE);
        trainer
            .varmap()
            .save(&checkpoint)
            .with_context(|| format!("failed to save {}", checkpoint.display()))?;
        let summary = serde_json::to_string_pretty(&summaries)?;
        std::fs::write(dir.join("summary.json"), summary)?;
        write_results(trainer.tagger(), &run, &dir, &splits.named(), vocab.as_ref())?;
        info!(dir = %dir.display(), "saved checkpoint and results");
    }
    Ok(())
}

fn evaluate(
    config: &Path,
    checkpoint: &Path,
    data: &Path,
    vocab: Option<&Path>,
    result_dir: Option<PathBuf>,
    beam_size: Option<usize>,
    split_name: &str,
) -> Result<()> {
    let mut run = RunConfig::from_file(config)?;
    if let Some(beam_size) = beam_size {
        run.train.beam_size = beam_size;
    }
    run.validate()?;

    let dataset = Dataset::from_file(data)?;
    dataset.validate(&run.model)?;
    let vocab = load_vocab(vocab, &run)?;

    let device = run.train.device()?;
    let (mut varmap, tagger) = build_tagger(&run.model, &device)?;
    varmap
        .load(checkpoint)
        .with_context(|| format!("failed to load {}", checkpoint.display()))?;

    let eval = Evaluator::new(&tagger, run.train.strategy()).evaluate(&dataset)?;
    info!(
        split = split_name,
        loss = eval.loss,
        precision = eval.counts.precision(),
        recall = eval.counts.recall(),
        f_score = eval.f_score(),
        "evaluation finished"
    );
    println!("{}", serde_json::to_string(&eval.score())?);

    if let Some(dir) = result_dir {
        ResultWriter::new(&dir).write(split_name, &dataset, &eval.predictions, vocab.as_ref())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Train {
            config,
            train: train_path,
            validation,
            test,
            vocab,
            pretrained,
            result_dir,
            epochs,
            beam_size,
            no_shuffle,
            gpu,
        } => train(
            &config,
            &train_path,
            &validation,
            &test,
            vocab.as_deref(),
            pretrained.as_deref(),
            result_dir,
            epochs,
            beam_size,
            no_shuffle,
            gpu,
        ),
        Commands::Evaluate {
            config,
            checkpoint,
            data,
            vocab,
            result_dir,
            beam_size,
            split_name,
        } => evaluate(
            &config,
            &checkpoint,
            &data,
            vocab.as_deref(),
            result_dir,
            beam_size,
            &split_name,
        ),
    }
}
