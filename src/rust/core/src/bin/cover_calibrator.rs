// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT

//! cover_calibrator: field-calibrated endmember selection
//!
//! Usage:
//!   cover_calibrator --sites sites.csv --scenes scenes.json \
//!       --library candidates.json --output endmembers.json [--config cover.json]
//!
//! 1. Loads field sites (CSV) and image acquisitions (JSON)
//! 2. Matches each site to its best clear pixel
//! 3. Searches candidate subsets for the lowest field error
//! 4. Writes the selected EndmemberSet and prints the calibration report
//!
//! Exit status 2 when there are too few matched samples to calibrate.

use clap::Parser;
use fcover_core::survey::loader::{load_acquisitions, load_field_sites};
use fcover_core::{CoverConfig, CoverError, CoverKernel, EndmemberLibrary};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "cover_calibrator")]
struct Args {
    /// Field survey CSV: site_id, lat, lon, observed, then one column per class
    #[clap(long)]
    sites: PathBuf,

    /// Image acquisitions, one JSON object or an array
    #[clap(long)]
    scenes: PathBuf,

    /// Candidate endmember library (JSON)
    #[clap(long)]
    library: PathBuf,

    /// Where to write the selected endmember set
    #[clap(short, long)]
    output: PathBuf,

    #[clap(long)]
    config: Option<PathBuf>,
}

fn run(args: &Args) -> fcover_core::Result<()> {
    let config = match &args.config {
        Some(path) => CoverConfig::from_json_file(path)?,
        None => CoverConfig::default(),
    };
    let table = load_field_sites(&args.sites, &config.survey)?;
    for row in &table.skipped {
        warn!(line = row.line, reason = row.reason.as_str(), "skipped survey row");
    }
    let scenes = load_acquisitions(&args.scenes)?;
    let library = EndmemberLibrary::load_json(&args.library)?;
    info!(
        sites = table.sites.len(),
        scenes = scenes.len(),
        candidates = library.len(),
        "loaded calibration inputs"
    );

    let mut kernel = CoverKernel::new(config);
    let run = kernel.calibrate(&table.sites, &scenes, &library)?;
    run.calibration.endmembers.save_json(&args.output)?;
    info!(path = %args.output.display(), fingerprint = run.fingerprint.as_str(), "wrote endmember set");

    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ CoverError::InsufficientSamples { .. }) => {
            error!("{e}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
