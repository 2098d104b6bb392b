//! Batch pipeline orchestrator.
//!
//! Chains reference loading -> ingest -> enrichment -> aggregation ->
//! report writing for one [`BatchConfig`]. Uses `indicatif` progress bars
//! for the long stages.

use std::path::PathBuf;
use std::time::Instant;

use treatment_map_activity_models::{ConfigurationError, Diagnostics};
use treatment_map_aggregate::{level_of_effort, reduce_windows};
use treatment_map_cli_utils::{IndicatifProgress, MultiProgress};
use treatment_map_ingest::normalize::ActivityNormalizer;
use treatment_map_ingest::{ActivityCollections, enrich_all, ingest_source};
use treatment_map_report::write::{
    write_activity_csv, write_diagnostics_json, write_footprint_geojson,
};
use treatment_map_report::{ReportError, build_activity_report, build_footprint_report};
use treatment_map_source::SourceError;
use treatment_map_spatial::{ReferenceError, ReferenceLayer, ReferenceLayers};

use crate::config::BatchConfig;

/// Errors that abort a batch run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The config is invalid.
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    /// A reference layer file could not be read.
    #[error("Failed to read reference layer {path}: {source}")]
    ReferenceIo {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A reference layer file could not be parsed.
    #[error("Failed to load reference layer: {0}")]
    Reference(#[from] ReferenceError),

    /// A source export could not be ingested.
    #[error("Failed to ingest {adapter}: {source}")]
    Source {
        /// Adapter id of the failing source.
        adapter: String,
        /// Underlying error.
        source: SourceError,
    },

    /// A report could not be built or written.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// The output directory could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        /// Directory that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Activities accepted across every source.
    pub activities: usize,
    /// Footprint files written.
    pub footprints_written: usize,
    /// Windows that produced no footprint.
    pub windows_failed: usize,
    /// Diagnostics recorded.
    pub diagnostics: usize,
}

/// Loads every configured reference layer.
///
/// # Errors
///
/// Returns [`BatchError`] if a layer file cannot be read or parsed.
pub fn load_reference_layers(config: &BatchConfig) -> Result<ReferenceLayers, BatchError> {
    let mut layers = ReferenceLayers::new();
    for layer_config in &config.reference_layers {
        let text = std::fs::read_to_string(&layer_config.path).map_err(|source| {
            BatchError::ReferenceIo {
                path: layer_config.path.clone(),
                source,
            }
        })?;
        layers.insert(ReferenceLayer::from_geojson(
            layer_config.kind,
            &text,
            &layer_config.value_field,
            layer_config.id_field.as_deref(),
        )?);
    }
    Ok(layers)
}

/// Runs the whole batch and writes every report into the output directory.
///
/// Per-record problems never abort the run; they are collected into
/// `diagnostics.json`. A window that yields no footprint is recorded and
/// skipped.
///
/// # Errors
///
/// Returns [`BatchError`] if an input file cannot be loaded or an output
/// file cannot be written.
#[allow(clippy::too_many_lines)]
pub fn run(config: &BatchConfig, multi: &MultiProgress) -> Result<RunSummary, BatchError> {
    let start = Instant::now();
    let mut diagnostics = Diagnostics::new();

    std::fs::create_dir_all(&config.output_dir).map_err(|source| BatchError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    // 1. Reference layers
    let layers = load_reference_layers(config)?;
    log::info!("Loaded {} reference layers", layers.len());

    // 2. Ingest
    let source_progress = IndicatifProgress::stage_line(multi, "Ingesting sources");
    source_progress.begin("Ingesting sources", config.sources.len() as u64);
    let mut normalizer = ActivityNormalizer::new();
    let mut collections = ActivityCollections::new();

    for source in &config.sources {
        let adapter = treatment_map_source::registry::adapter(&source.adapter).map_err(|e| {
            BatchError::Source {
                adapter: source.adapter.clone(),
                source: e,
            }
        })?;
        ingest_source(
            &adapter,
            &source.path,
            &mut normalizer,
            &mut collections,
            &mut diagnostics,
        )
        .map_err(|e| BatchError::Source {
            adapter: source.adapter.clone(),
            source: e,
        })?;
        source_progress.item_done();
    }
    source_progress.finish(&format!("Ingested {} activities", collections.len()));

    // 3. Enrichment
    let enrich_progress = IndicatifProgress::stage_line(multi, "Attributing activities");
    diagnostics.extend(enrich_all(
        &mut collections,
        &layers,
        config.tolerances.tie_epsilon,
        &enrich_progress,
    ));

    // 4. Level of effort
    let effort = level_of_effort(
        collections
            .iter()
            .flat_map(|collection| collection.activities()),
        config.activity_report.window,
    );
    write_activity_csv(
        &build_activity_report(&effort),
        &config.output_dir.join("activity_report.csv"),
    )?;

    // 5. Footprints
    let windows = config.footprint_windows();
    let mut summary = RunSummary {
        activities: collections.len(),
        ..RunSummary::default()
    };

    for kind in config.footprint_kinds() {
        let collection = collections.get(kind);
        if collection.is_empty() {
            log::info!("No {kind} activities, skipping {kind} footprints");
            continue;
        }

        let progress = IndicatifProgress::stage_line(multi, &format!("Reducing {kind} footprints"));
        let runs = reduce_windows(
            collection,
            &windows,
            config.tolerances.sliver_tolerance,
            &progress,
        );
        for window_run in runs {
            diagnostics.extend(window_run.diagnostics);
            match window_run.result {
                Ok(result) => {
                    let report = build_footprint_report(&result, collection)?;
                    write_footprint_geojson(&report, &config.output_dir.join(report.file_name()))?;
                    summary.footprints_written += 1;
                }
                Err(_) => summary.windows_failed += 1,
            }
        }
    }

    // 6. Diagnostics
    write_diagnostics_json(&diagnostics, &config.output_dir.join("diagnostics.json"))?;
    summary.diagnostics = diagnostics.len();

    for (label, count) in diagnostics.summary() {
        log::info!("  {label}: {count}");
    }
    log::info!(
        "Batch complete: {} activities, {} footprints ({} windows failed), {} diagnostics, took {:.1}s",
        summary.activities,
        summary.footprints_written,
        summary.windows_failed,
        summary.diagnostics,
        start.elapsed().as_secs_f64()
    );

    Ok(summary)
}
