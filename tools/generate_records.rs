//! Synthetic Student Record Generator
//!
//! Writes labelled student records as JSON lines for training and scoring demos.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use dropout_risk_pipeline::synthetic::RecordGenerator;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "generate-records", about = "Generate labelled synthetic student records")]
struct Args {
    /// Number of records
    #[arg(short = 'n', long, default_value_t = 500)]
    count: usize,

    /// Random seed
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Class shares as low,medium,high
    #[arg(long, value_delimiter = ',', default_values_t = [0.5, 0.3, 0.2])]
    mix: Vec<f64>,

    /// Drop the risk label, producing records for scoring
    #[arg(long)]
    unlabeled: bool,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_records=info".parse()?),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    ensure!(
        args.mix.len() == 3 && args.mix.iter().all(|w| *w >= 0.0),
        "--mix takes three non-negative shares: low,medium,high"
    );
    let mix = [args.mix[0], args.mix[1], args.mix[2]];

    info!(
        count = args.count,
        seed = args.seed,
        mix = ?mix,
        "Generating records"
    );

    let records = RecordGenerator::new(args.seed).generate_mix(args.count, mix);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let mut counts = [0usize; 3];
    for labeled in &records {
        match labeled.risk_indicators.calculated_risk.as_deref() {
            Some("low") => counts[0] += 1,
            Some("medium") => counts[1] += 1,
            Some("high") => counts[2] += 1,
            _ => {}
        }
        let line = if args.unlabeled {
            serde_json::to_string(&labeled.record)?
        } else {
            serde_json::to_string(labeled)?
        };
        writeln!(out, "{}", line)?;
    }
    out.flush()?;

    info!(
        "Completed! Generated {} records ({} low, {} medium, {} high)",
        records.len(),
        counts[0],
        counts[1],
        counts[2]
    );

    Ok(())
}
