//! Command-line front end for the ingestion engine.
//!
//! **Usage:**
//! ```bash
//! affyingest --cdf HG-U133A.cdf 'arrays/*.CEL' [--threads 8] [--cache-dir cache/]
//!            [--probe-set AFFX-BioB-5_at] [--summary summary.json] [--metrics metrics.json]
//! ```
//!
//! Loads the chip description, validates every intensity file against it,
//! populates an in-memory column store and prints a JSON summary to stdout.

use affyingest::cdf::write_rme_cdf;
use affyingest::cel::write_rme_cel;
use affyingest::io::glob::expand_inputs;
use affyingest::store::DenseColumnStore;
use affyingest::{DatasetAssembler, ExecMode, IngestConfig};
use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

/// Microarray CDF/CEL ingestion
#[derive(Parser, Debug)]
#[command(name = "affyingest", version)]
#[command(about = "Decode a chip description and a batch of intensity files into a column store")]
struct Args {
    /// Chip description (text, XDA, Calvin or RME cache; optionally compressed)
    #[arg(long, value_name = "FILE")]
    cdf: PathBuf,

    /// Intensity files or glob patterns, in column order
    #[arg(required = true, value_name = "CEL")]
    inputs: Vec<String>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE", env = "AFFYINGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Decode files in parallel using all cores
    #[arg(long)]
    parallel: bool,

    /// Decode files in parallel on this many threads
    #[arg(long, value_name = "N", conflicts_with = "parallel")]
    threads: Option<usize>,

    /// Write RME caches of the chip description and every array here
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Print the cell indices of these probe sets
    #[arg(long = "probe-set", value_name = "NAME")]
    probe_sets: Vec<String>,

    /// Also write the JSON summary to this file
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Write ingest metrics as JSON to this file
    #[arg(long, value_name = "FILE")]
    metrics: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<IngestConfig> {
    let config = match &args.config {
        Some(path) => IngestConfig::from_json_file(path)?,
        None => IngestConfig::default(),
    };
    let config = if let Some(threads) = args.threads {
        config.with_mode(ExecMode::Parallel { threads: Some(threads) })
    } else if args.parallel {
        config.with_mode(ExecMode::Parallel { threads: None })
    } else {
        config
    };
    Ok(config)
}

fn write_caches(dir: &Path, assembler: &DatasetAssembler, store: &DenseColumnStore) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create cache directory {}", dir.display()))?;
    let (Some(chip), Some(batch)) = (assembler.chip(), assembler.batch()) else {
        return Ok(());
    };

    let cdf_path = dir.join(format!("{}.rme.cdf", chip.chip_type));
    let mut w = BufWriter::new(File::create(&cdf_path).with_context(|| format!("create {}", cdf_path.display()))?);
    write_rme_cdf(&mut w, chip).with_context(|| format!("write {}", cdf_path.display()))?;
    info!(path = %cdf_path.display(), "wrote chip description cache");

    for (array, values) in batch.arrays.iter().zip(store.columns()) {
        let cel_path = dir.join(format!("{}.rme.cel", array.array_name));
        let mut w = BufWriter::new(File::create(&cel_path).with_context(|| format!("create {}", cel_path.display()))?);
        write_rme_cel(&mut w, &array.array_name, &array.chip_type, array.geometry, values)
            .with_context(|| format!("write {}", cel_path.display()))?;
    }
    info!(dir = %dir.display(), arrays = batch.len(), "wrote intensity caches");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let mut assembler = DatasetAssembler::new(config);

    assembler
        .load_chip_description(&args.cdf)
        .with_context(|| format!("load chip description {}", args.cdf.display()))?;
    let paths = expand_inputs(&args.inputs)?;
    assembler.validate_batch(&paths).context("validate intensity files")?;

    let mut store = DenseColumnStore::new();
    let summary = assembler.populate(&mut store).context("populate column store")?;

    if let Some(dir) = &args.cache_dir {
        write_caches(dir, &assembler, &store)?;
    }

    let probe_sets: Vec<_> = args
        .probe_sets
        .iter()
        .map(|name| match assembler.probe_set(name) {
            Some(set) => json!({ "name": name, "pm": set.pm(), "mm": set.mm() }),
            None => json!({ "name": name, "missing": true }),
        })
        .collect();

    let report = json!({
        "summary": summary,
        "probe_sets": probe_sets,
        "metrics": assembler.metrics().to_json(),
    });
    let formatted = serde_json::to_string_pretty(&report)?;
    println!("{formatted}");

    if let Some(path) = &args.summary {
        fs::write(path, &formatted).with_context(|| format!("write summary to {}", path.display()))?;
    }
    if let Some(path) = &args.metrics {
        assembler.metrics().save_to_file(path)?;
    }
    assembler.metrics().log_summary();
    Ok(())
}
