//! Converter binary: turns a directory of pipe-delimited `.tbl` files into
//! one columnar table directory per table.
//!
//! ## Input
//!
//! `<indir>/<table>.tbl`, one file per table. The table name is the
//! lowercased file stem and must be known to the catalog (built-in TPC-C /
//! TPC-H tables, or `--catalog <json>`).
//!
//! ## Output
//!
//! `<outdir>/<table>/<column>` per column plus `<outdir>/<table>/__schema__`.
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin tbl2col -- data/tpcc data/tpcc.columns
//! cargo run --release --bin tbl2col -- --tables item,orderline data/tpcc data/tpcc.columns
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use tbl2col::catalog::Catalog;
use tbl2col::ingest::{TableReport, convert_dir};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(about = "Convert pipe-delimited .tbl files into per-column binary files")]
struct Args {
    /// Directory holding `<table>.tbl` input files.
    indir: PathBuf,

    /// Directory the table directories are written into.
    outdir: PathBuf,

    /// Only convert these tables (comma-separated, case-insensitive).
    #[arg(short, long, value_delimiter = ',')]
    tables: Option<Vec<String>>,

    /// JSON catalog replacing the built-in table schemas.
    #[arg(long)]
    catalog: Option<PathBuf>,
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let catalog = match &args.catalog {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::builtin(),
    };

    info!("Input:  {}", args.indir.display());
    info!("Output: {}", args.outdir.display());

    let start = Instant::now();
    let pb = ProgressBar::no_length();
    pb.set_style(
        ProgressStyle::with_template(
            "  Converting {bar:40.cyan/blue} {pos}/{len} tables [{elapsed_precise}] {msg}",
        )?
        .progress_chars("##-"),
    );

    let outcomes = convert_dir(
        &args.indir,
        &args.outdir,
        args.tables.as_deref(),
        &catalog,
        |outcome, total| {
            pb.set_length(total as u64);
            pb.set_message(outcome.table.clone());
            match &outcome.result {
                Ok(report) => pb.suspend(|| {
                    info!(
                        "  {}: {} rows, {} columns, {}",
                        report.table,
                        HumanCount(report.num_rows as u64),
                        report.num_cols,
                        HumanBytes(report.bytes_written)
                    )
                }),
                Err(e) => pb.suspend(|| error!("  {}: {e}", outcome.table)),
            }
            pb.inc(1);
        },
    )?;
    pb.finish_and_clear();

    let converted: Vec<&TableReport> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .collect();
    let failed: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| o.table.as_str())
        .collect();
    let total_rows: u64 = converted.iter().map(|r| r.num_rows as u64).sum();
    let total_bytes: u64 = converted.iter().map(|r| r.bytes_written).sum();

    info!(
        "Converted {} of {} tables ({} rows, {}) in {}",
        converted.len(),
        outcomes.len(),
        HumanCount(total_rows),
        HumanBytes(total_bytes),
        HumanDuration(start.elapsed())
    );

    if failed.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Failed tables: {}", failed.join(", "));
        Ok(ExitCode::FAILURE)
    }
}
