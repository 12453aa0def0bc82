//! Dropout-Risk Pipeline - Main Entry Point
//!
//! `train` fits and publishes a model from labelled JSON lines, `score` scores
//! student records in parallel and `info` describes the active model.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dropout_risk_pipeline::{
    config::AppConfig,
    metrics::ScoringMetrics,
    models::{ArtifactStore, RiskScorer},
    training::Trainer,
    LabeledRecord, PipelineError, PredictionResult, StudentRecord,
};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dropout-risk", version, about = "Student dropout-risk training and scoring")]
struct Cli {
    /// Configuration file (defaults to config/config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train candidate models on labelled records and publish the best one
    Train {
        /// JSON lines of labelled student records
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Score student records against the active model
    Score {
        /// JSON lines of student records (stdin when omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Output file for JSON-lines results (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Describe the active model
    Info,
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let level = &config.logging.level;
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("dropout_risk_pipeline={}", level).parse()?)
        .add_directive(format!("dropout_risk={}", level).parse()?);

    // Logs go to stderr so stdout stays valid JSON
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
    Ok(())
}

fn read_lines(input: Option<&Path>) -> Result<Vec<String>> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.context("Failed to read input")?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn parse_jsonl<T: DeserializeOwned>(lines: &[String]) -> Result<Vec<T>> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid record on line {}", i + 1))
        })
        .collect()
}

async fn train(config: &AppConfig, input: &Path) -> Result<()> {
    let records: Vec<LabeledRecord> = parse_jsonl(&read_lines(Some(input))?)?;
    info!(records = records.len(), input = %input.display(), "Training records loaded");

    let store = ArtifactStore::from_config(&config.artifacts);
    let trainer = Trainer::new(config.training.clone());

    let outcome = tokio::task::spawn_blocking(move || trainer.train(&records, &store))
        .await
        .context("Training task panicked")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome.report() {
        Some(report) => {
            info!("Classification report:\n{}", report.classification_report);
            Ok(())
        }
        None => bail!("Training failed"),
    }
}

async fn score(config: &AppConfig, input: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let store = ArtifactStore::from_config(&config.artifacts);
    let scorer = Arc::new(RiskScorer::from_store(&store));
    if !scorer.is_trained() {
        warn!("No trained model available; every record will be reported as unknown");
    }

    let lines = read_lines(input)?;
    let num_workers = config.scoring.workers.max(1);
    info!(
        records = lines.len(),
        workers = num_workers,
        "Starting scoring"
    );

    // Semaphore to limit concurrent scoring
    let semaphore = Arc::new(Semaphore::new(num_workers));
    let metrics = Arc::new(ScoringMetrics::new());
    let mut handles = Vec::with_capacity(lines.len());

    for (index, line) in lines.into_iter().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        let scorer = scorer.clone();
        let metrics = metrics.clone();

        handles.push(tokio::spawn(async move {
            let start_time = Instant::now();
            let result = match serde_json::from_str::<StudentRecord>(&line) {
                Ok(record) => scorer.score(&record),
                Err(e) => {
                    warn!(line = index + 1, error = %e, "Failed to deserialize student record");
                    PredictionResult::failed(&PipelineError::Serialization(e))
                }
            };
            metrics.record(&result, start_time.elapsed());

            drop(permit);
            result
        }));
    }

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    // Joined in spawn order so results follow input order
    for handle in handles {
        let result = handle.await.context("Scoring task panicked")?;
        writeln!(out, "{}", serde_json::to_string(&result)?)?;
    }
    out.flush()?;

    metrics.print_summary();
    Ok(())
}

fn describe(config: &AppConfig) -> Result<()> {
    let store = ArtifactStore::from_config(&config.artifacts);
    let scorer = RiskScorer::from_store(&store);

    let summary = serde_json::json!({
        "model": scorer.model_info(),
        "active_bundle": store.active_bundle_id().ok().flatten(),
        "feature_importance": scorer.feature_importance(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    init_logging(&config)?;
    info!(artifacts = %config.artifacts.dir.display(), "Configuration loaded");

    match &cli.command {
        Command::Train { input } => train(&config, input).await,
        Command::Score { input, output } => {
            score(&config, input.as_deref(), output.as_deref()).await
        }
        Command::Info => describe(&config),
    }
}
