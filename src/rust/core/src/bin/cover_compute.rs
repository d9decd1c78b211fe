// SPDX-FileCopyrightText: 2026 Santhosh Shyamsundar, Prabhu S., and Studio Tyto
// SPDX-License-Identifier: MIT

//! cover_compute: unmix and rank a run of acquisitions
//!
//! Usage:
//!   cover_compute --endmembers endmembers.json --scene scenes.json \
//!       [--polygon paddock.geojson] [--config cover.json]
//!
//! Scenes are processed oldest first so each one is ranked against the
//! history built by those before it. Prints a JSON object holding the
//! endmember fingerprint and one run per acquisition: pixel counts, decile
//! flags and the optional region summary.

use clap::Parser;
use fcover_core::survey::loader::load_acquisitions;
use fcover_core::{CoverConfig, CoverError, CoverKernel, EndmemberSet, Polygon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(name = "cover_compute")]
struct Args {
    #[clap(long)]
    endmembers: PathBuf,

    /// Image acquisitions, one JSON object or an array
    #[clap(long)]
    scene: PathBuf,

    /// GeoJSON Polygon or Feature to summarize
    #[clap(long)]
    polygon: Option<PathBuf>,

    #[clap(long)]
    config: Option<PathBuf>,
}

fn run(args: &Args) -> fcover_core::Result<()> {
    let config = match &args.config {
        Some(path) => CoverConfig::from_json_file(path)?,
        None => CoverConfig::default(),
    };
    let endmembers = EndmemberSet::load_json(&args.endmembers)?;
    let polygon = match &args.polygon {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| CoverError::io(path, e))?;
            Some(Polygon::from_geojson(&text)?)
        }
        None => None,
    };
    let mut scenes = load_acquisitions(&args.scene)?;
    scenes.sort_by(|a, b| a.acquired().cmp(&b.acquired()).then_with(|| a.scene_id().cmp(b.scene_id())));

    let fingerprint = endmembers.fingerprint();
    let mut kernel = CoverKernel::with_endmembers(config, endmembers);
    let mut runs = Vec::with_capacity(scenes.len());
    for scene in &scenes {
        runs.push(kernel.process_acquisition(scene, polygon.as_ref())?);
    }
    info!(scenes = runs.len(), "compute complete");

    let output = serde_json::json!({
        "fingerprint": fingerprint,
        "runs": runs,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
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
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
