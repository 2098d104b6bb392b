#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch driver for the treatment map reports.
//!
//! Reads a TOML run config, ingests the listed agency exports, attributes
//! them against the reference layers, and writes the level-of-effort CSV,
//! one footprint `GeoJSON` per window and geometry kind, and the run's
//! diagnostics.
//!
//! Uses `indicatif-log-bridge` (via [`treatment_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;
mod pipeline;

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::BatchConfig;

#[derive(Parser)]
#[command(name = "treatment_map", about = "Wildfire treatment activity reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch and write every report
    Run {
        /// Path to the batch TOML config
        config: PathBuf,
        /// Comma-separated adapter ids to run (overrides `TREATMENT_MAP_SOURCES` env var)
        #[arg(long)]
        sources: Option<String>,
        /// Write reports here instead of the config's `output_dir`
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List the registered source adapters
    Sources,
    /// Check a batch config without running it
    Validate {
        /// Path to the batch TOML config
        config: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = treatment_map_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            sources,
            output,
        } => {
            let mut config = BatchConfig::load(&config)?;
            if let Some(output) = output {
                config.output_dir = output;
            }

            let enabled: BTreeSet<String> = treatment_map_ingest::enabled_sources(sources)
                .into_iter()
                .map(|definition| definition.id)
                .collect();
            let before = config.sources.len();
            config
                .sources
                .retain(|source| enabled.contains(&source.adapter));
            if config.sources.len() < before {
                log::info!(
                    "Running {} of {before} configured sources",
                    config.sources.len()
                );
            }
            if config.sources.is_empty() {
                return Err("No configured sources match the source filter".into());
            }

            pipeline::run(&config, &multi)?;
        }
        Commands::Sources => {
            let sources = treatment_map_ingest::all_sources();
            println!("{:<28} {:<18} {:<10} NAME", "ID", "AGENCY", "KIND");
            println!("{}", "-".repeat(90));
            for source in &sources {
                println!(
                    "{:<28} {:<18} {:<10} {}",
                    source.id,
                    source.agency.as_ref(),
                    source.geometry_kind.as_ref(),
                    source.name
                );
            }
        }
        Commands::Validate { config } => {
            let config = BatchConfig::load(&config)?;
            let layers = pipeline::load_reference_layers(&config)?;
            println!(
                "OK: {} sources, {} reference layers, {} footprint windows",
                config.sources.len(),
                layers.len(),
                config.footprint_windows().len()
            );
        }
    }

    Ok(())
}
