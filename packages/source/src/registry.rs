//! Source registry: loads all adapter definitions from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/sources/` is baked into the binary
//! at compile time via [`include_str!`]. Adding a new agency export is as
//! simple as creating a new TOML file and adding it to the list below.

use crate::SourceError;
use crate::source_def::{FieldMappingAdapter, SourceDefinition, parse_source_toml};

/// TOML configs embedded at compile time.
const SOURCE_TOMLS: &[(&str, &str)] = &[
    // ── Federal ──────────────────────────────────────────────────────
    ("usfs_polygons", include_str!("../sources/usfs_polygons.toml")),
    ("nfpors_points", include_str!("../sources/nfpors_points.toml")),
    // ── State ────────────────────────────────────────────────────────
    ("ifprs_polygons", include_str!("../sources/ifprs_polygons.toml")),
    ("caltrans_lines", include_str!("../sources/caltrans_lines.toml")),
    // ── Timber ───────────────────────────────────────────────────────
    (
        "timber_industry_polygons",
        include_str!("../sources/timber_industry_polygons.toml"),
    ),
];

/// Total number of configured sources (used in tests).
#[cfg(test)]
const EXPECTED_SOURCE_COUNT: usize = 5;

/// Returns all configured source definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_sources() -> Vec<SourceDefinition> {
    SOURCE_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_source_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Builds the adapter registered under `id`.
///
/// # Errors
///
/// Returns [`SourceError::UnknownAdapter`] if no definition has that id.
pub fn adapter(id: &str) -> Result<FieldMappingAdapter, SourceError> {
    all_sources()
        .into_iter()
        .find(|definition| definition.id == id)
        .map(FieldMappingAdapter::new)
        .ok_or_else(|| SourceError::UnknownAdapter { id: id.to_string() })
}

#[cfg(test)]
mod tests {
    use treatment_map_activity_models::GeometryKind;

    use super::*;
    use crate::SourceAdapter;

    #[test]
    fn loads_all_sources() {
        let sources = all_sources();
        assert_eq!(sources.len(), EXPECTED_SOURCE_COUNT);
    }

    #[test]
    fn source_ids_are_unique() {
        let sources = all_sources();
        let mut ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), EXPECTED_SOURCE_COUNT);
    }

    #[test]
    fn registry_names_match_ids() {
        for ((name, _), source) in SOURCE_TOMLS.iter().zip(all_sources()) {
            assert_eq!(*name, source.id, "{name}.toml declares id {}", source.id);
        }
    }

    #[test]
    fn line_and_point_sources_report_area() {
        for source in all_sources() {
            if source.geometry_kind != GeometryKind::Polygon {
                assert!(
                    source.fields.treated_area.is_some(),
                    "{} needs a treated_area field",
                    source.id
                );
            }
        }
    }

    #[test]
    fn looks_up_adapter_by_id() {
        let caltrans = adapter("caltrans_lines").unwrap();
        assert_eq!(caltrans.geometry_kind(), GeometryKind::Line);
        assert!(matches!(
            adapter("nope"),
            Err(SourceError::UnknownAdapter { .. })
        ));
    }
}
