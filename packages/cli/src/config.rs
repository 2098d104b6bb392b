//! Batch run configuration.
//!
//! A run is described by one TOML file naming the reference layers, the
//! agency exports (by registered adapter id), the report windows, and the
//! numeric tolerances. Relative paths are resolved against the directory
//! holding the config file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use treatment_map_activity_models::{ConfigurationError, GeometryKind, ReferenceLayerKind, YearWindow};
use treatment_map_aggregate::DEFAULT_SLIVER_TOLERANCE;
use treatment_map_spatial::attribute::DEFAULT_TIE_EPSILON;

/// A complete batch run.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Directory the reports are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Numeric tolerances.
    #[serde(default)]
    pub tolerances: Tolerances,
    /// Level-of-effort report settings.
    pub activity_report: ActivityReportConfig,
    /// Footprint report settings.
    #[serde(default)]
    pub footprint: FootprintConfig,
    /// Reference layers to attribute against.
    #[serde(default)]
    pub reference_layers: Vec<ReferenceLayerConfig>,
    /// Agency exports to ingest.
    #[serde(default)]
    pub sources: Vec<SourceFileConfig>,
}

/// Numeric tolerances for attribution and footprint reduction.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Tolerances {
    /// Relative tie tolerance for attribute weights.
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,
    /// Relative area below which overlay pieces count as slivers.
    #[serde(default = "default_sliver_tolerance")]
    pub sliver_tolerance: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            tie_epsilon: DEFAULT_TIE_EPSILON,
            sliver_tolerance: DEFAULT_SLIVER_TOLERANCE,
        }
    }
}

/// Level-of-effort report settings.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityReportConfig {
    /// Years the report covers.
    pub window: YearWindow,
}

/// Footprint report settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FootprintConfig {
    /// Explicit windows. Defaults to the activity report window.
    #[serde(default)]
    pub windows: Vec<YearWindow>,
    /// Also report every single year of every window.
    #[serde(default)]
    pub per_year: bool,
    /// Geometry kinds to reduce. Defaults to all of them.
    #[serde(default)]
    pub kinds: Vec<GeometryKind>,
}

/// One reference layer file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceLayerConfig {
    /// Which layer the file holds.
    pub kind: ReferenceLayerKind,
    /// `GeoJSON` `FeatureCollection` of polygons.
    pub path: PathBuf,
    /// Property holding the category value.
    pub value_field: String,
    /// Property holding a numeric polygon id, if any.
    #[serde(default)]
    pub id_field: Option<String>,
}

/// One agency export file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFileConfig {
    /// Registered adapter id (see `treatment_map sources`).
    pub adapter: String,
    /// `GeoJSON` export.
    pub path: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

const fn default_tie_epsilon() -> f64 {
    DEFAULT_TIE_EPSILON
}

const fn default_sliver_tolerance() -> f64 {
    DEFAULT_SLIVER_TOLERANCE
}

impl BatchConfig {
    /// Parses and validates a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the TOML is malformed, a window is
    /// inverted, or [`Self::validate`] fails.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigurationError::Invalid {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file and resolves its relative paths against the
    /// file's directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Invalid {
            message: format!("Failed to read {}: {e}", path.display()),
        })?;
        let mut config = Self::parse(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Checks everything the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Invalid`] naming the first problem.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, value) in [
            ("tie_epsilon", self.tolerances.tie_epsilon),
            ("sliver_tolerance", self.tolerances.sliver_tolerance),
        ] {
            if !value.is_finite() || !(0.0..1.0).contains(&value) {
                return Err(invalid(format!("{name} must be in [0, 1), got {value}")));
            }
        }

        let mut kinds = BTreeSet::new();
        for layer in &self.reference_layers {
            if !kinds.insert(layer.kind) {
                return Err(invalid(format!("Reference layer {} listed twice", layer.kind)));
            }
        }

        if self.sources.is_empty() {
            return Err(invalid("At least one source is required".to_string()));
        }
        for source in &self.sources {
            treatment_map_source::registry::adapter(&source.adapter)
                .map_err(|e| invalid(e.to_string()))?;
        }

        Ok(())
    }

    /// Footprint windows in report order, without duplicates.
    #[must_use]
    pub fn footprint_windows(&self) -> Vec<YearWindow> {
        let explicit = if self.footprint.windows.is_empty() {
            vec![self.activity_report.window]
        } else {
            self.footprint.windows.clone()
        };

        let mut windows: Vec<YearWindow> = Vec::new();
        for window in explicit {
            let expanded = std::iter::once(window).chain(
                self.footprint
                    .per_year
                    .then(|| window.per_year())
                    .unwrap_or_default(),
            );
            for candidate in expanded {
                if !windows.contains(&candidate) {
                    windows.push(candidate);
                }
            }
        }
        windows
    }

    /// Geometry kinds to reduce, in polygon, line, point order.
    #[must_use]
    pub fn footprint_kinds(&self) -> Vec<GeometryKind> {
        [GeometryKind::Polygon, GeometryKind::Line, GeometryKind::Point]
            .into_iter()
            .filter(|kind| self.footprint.kinds.is_empty() || self.footprint.kinds.contains(kind))
            .collect()
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.output_dir);
        for layer in &mut self.reference_layers {
            resolve(&mut layer.path);
        }
        for source in &mut self.sources {
            resolve(&mut source.path);
        }
    }
}

const fn invalid(message: String) -> ConfigurationError {
    ConfigurationError::Invalid { message }
}
