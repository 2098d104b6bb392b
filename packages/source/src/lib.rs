#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Agency source adapter trait and the config-driven adapter registry.
//!
//! Each agency export implements the [`SourceAdapter`] trait to define how
//! its features map onto the canonical [`RawActivityRecord`].

pub mod parsing;
pub mod registry;
pub mod source_def;

use std::path::Path;

use geojson::{FeatureCollection, GeoJson};
use treatment_map_activity_models::{Agency, GeometryKind, RawActivityRecord};

/// Errors that can occur during source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error (file read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parsing failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// No adapter is registered under the requested id.
    #[error("Unknown source adapter: {id}")]
    UnknownAdapter {
        /// Requested adapter id.
        id: String,
    },

    /// The export could not be interpreted.
    #[error("Adapter error: {message}")]
    Adapter {
        /// Description of what went wrong.
        message: String,
    },
}

/// Trait that all agency sources must implement.
///
/// Adapters only translate fields; validation and repair happen later in
/// the normalizer, so an adapter may hand over geometries that will be
/// rejected there.
pub trait SourceAdapter: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"usfs_polygons"`).
    fn id(&self) -> &str;

    /// Returns the human-readable name of this source.
    fn name(&self) -> &str;

    /// Agency every record is attributed to.
    fn agency(&self) -> Agency;

    /// Geometry kind of every record this source produces.
    fn geometry_kind(&self) -> GeometryKind;

    /// Maps an export's features onto raw activity records. Features that
    /// cannot be mapped are returned in [`AdaptedExport::rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the export as a whole cannot be read.
    fn adapt(&self, features: FeatureCollection) -> Result<AdaptedExport, SourceError>;
}

/// A feature the adapter could not map onto a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFeature {
    /// Position of the feature in the export.
    pub index: usize,
    /// Agency key of the feature, when it had one.
    pub source_key: Option<String>,
    /// Why it was rejected.
    pub reason: String,
}

/// Records mapped from one export, plus the features that were not.
///
/// Features excluded by a definition's include filter appear in neither
/// list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptedExport {
    /// Successfully mapped records, in export order.
    pub records: Vec<RawActivityRecord>,
    /// Unusable features, in export order.
    pub rejected: Vec<RejectedFeature>,
}

/// Reads a `GeoJSON` `FeatureCollection` from disk and adapts it.
///
/// # Errors
///
/// Returns [`SourceError`] if the file cannot be read, is not a
/// `FeatureCollection`, or the adapter rejects it.
pub fn load_geojson(
    adapter: &dyn SourceAdapter,
    path: &Path,
) -> Result<AdaptedExport, SourceError> {
    log::info!("[{}] Reading {}", adapter.id(), path.display());
    let text = std::fs::read_to_string(path)?;
    let GeoJson::FeatureCollection(features) = text.parse::<GeoJson>()? else {
        return Err(SourceError::Adapter {
            message: format!("{} is not a GeoJSON FeatureCollection", path.display()),
        });
    };
    adapter.adapt(features)
}
