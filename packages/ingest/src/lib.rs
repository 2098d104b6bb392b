#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for turning agency exports into enriched activity collections.
//!
//! Sources are adapted, normalized into one [`ActivityCollection`] per
//! geometry kind, and then attributed against the run's reference layers.

pub mod enrich;
pub mod normalize;
pub mod progress;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use treatment_map_activity_models::{ActivityCollection, Diagnostic, Diagnostics, GeometryKind};
use treatment_map_source::source_def::SourceDefinition;
use treatment_map_source::{SourceAdapter, SourceError};
use treatment_map_spatial::ReferenceLayers;

use crate::normalize::ActivityNormalizer;
use crate::progress::ProgressCallback;

/// Returns all configured sources from the TOML registry.
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    treatment_map_source::registry::all_sources()
}

/// Returns the sources to run, filtered by the `--sources` CLI flag or the
/// `TREATMENT_MAP_SOURCES` environment variable. If neither is set, all
/// sources are returned.
#[must_use]
pub fn enabled_sources(cli_filter: Option<String>) -> Vec<SourceDefinition> {
    let filter = cli_filter.or_else(|| std::env::var("TREATMENT_MAP_SOURCES").ok());

    let all = all_sources();

    let Some(filter_str) = filter else {
        return all;
    };

    let ids: Vec<&str> = filter_str.split(',').map(str::trim).collect();

    let filtered: Vec<SourceDefinition> = all
        .into_iter()
        .filter(|s| ids.contains(&s.id.as_str()))
        .collect();

    if filtered.is_empty() {
        log::warn!(
            "No matching sources found for filter {:?}. Available: {}",
            ids,
            all_sources()
                .iter()
                .map(|s| s.id.clone())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    filtered
}

/// One collection per geometry kind, filled across every source of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityCollections {
    polygons: ActivityCollection,
    lines: ActivityCollection,
    points: ActivityCollection,
}

impl Default for ActivityCollections {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityCollections {
    /// Creates three empty collections.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            polygons: ActivityCollection::new(GeometryKind::Polygon),
            lines: ActivityCollection::new(GeometryKind::Line),
            points: ActivityCollection::new(GeometryKind::Point),
        }
    }

    /// The collection holding `kind`.
    #[must_use]
    pub const fn get(&self, kind: GeometryKind) -> &ActivityCollection {
        match kind {
            GeometryKind::Polygon => &self.polygons,
            GeometryKind::Line => &self.lines,
            GeometryKind::Point => &self.points,
        }
    }

    /// Mutable access to the collection holding `kind`.
    pub const fn get_mut(&mut self, kind: GeometryKind) -> &mut ActivityCollection {
        match kind {
            GeometryKind::Polygon => &mut self.polygons,
            GeometryKind::Line => &mut self.lines,
            GeometryKind::Point => &mut self.points,
        }
    }

    /// Collections in polygon, line, point order.
    pub fn iter(&self) -> impl Iterator<Item = &ActivityCollection> {
        [&self.polygons, &self.lines, &self.points].into_iter()
    }

    /// Total activities across every kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().map(ActivityCollection::len).sum()
    }

    /// Whether no activities were accepted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().all(ActivityCollection::is_empty)
    }
}

/// Reads, adapts, and normalizes one source export into `collections`.
///
/// Features the adapter rejects and records the normalizer drops are both
/// reported through `diagnostics`.
/// Returns the number of activities accepted.
///
/// # Errors
///
/// Returns [`SourceError`] if the export cannot be read or adapted. Nothing
/// is added to `collections` in that case.
pub fn ingest_source(
    adapter: &dyn SourceAdapter,
    path: &Path,
    normalizer: &mut ActivityNormalizer,
    collections: &mut ActivityCollections,
    diagnostics: &mut Diagnostics,
) -> Result<usize, SourceError> {
    let start = Instant::now();
    log::info!("Ingesting source: {} ({})", adapter.name(), adapter.id());

    let adapted = treatment_map_source::load_geojson(adapter, path)?;
    let raw_count = adapted.records.len() + adapted.rejected.len();

    for rejected in adapted.rejected {
        diagnostics.push(Diagnostic::RecordRejected {
            agency: adapter.agency(),
            source_key: rejected.source_key,
            feature_index: rejected.index,
            reason: rejected.reason,
        });
    }

    let collection = collections.get_mut(adapter.geometry_kind());
    let accepted = normalizer.normalize_into(&adapted.records, collection, diagnostics);

    log::info!(
        "Ingest complete for {}: {accepted}/{raw_count} records accepted, took {:.1}s",
        adapter.name(),
        start.elapsed().as_secs_f64()
    );

    Ok(accepted)
}

/// Enriches every collection against the reference layers.
pub fn enrich_all(
    collections: &mut ActivityCollections,
    layers: &ReferenceLayers,
    tie_epsilon: f64,
    progress: &Arc<dyn ProgressCallback>,
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    for kind in [GeometryKind::Polygon, GeometryKind::Line, GeometryKind::Point] {
        let collection = collections.get_mut(kind);
        if collection.is_empty() {
            continue;
        }
        diagnostics.extend(enrich::enrich(collection, layers, tie_epsilon, progress));
    }
    diagnostics
}
