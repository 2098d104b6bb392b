//! Config-driven agency source definition.
//!
//! [`SourceDefinition`] captures everything unique about an agency's
//! export in a serializable config struct. A single generic adapter,
//! [`FieldMappingAdapter`], handles every agency, so adding one is a matter
//! of writing a TOML file rather than code.

use chrono::NaiveDate;
use geojson::{Feature, FeatureCollection};
use serde::Deserialize;
use treatment_map_activity_models::{
    Agency, GeometryKind, RawActivityRecord, SQ_METERS_PER_ACRE,
};

use crate::parsing::{parse_epoch_ms, parse_iso_date, parse_mdy_date, parse_number};
use crate::{AdaptedExport, RejectedFeature, SourceAdapter, SourceError};

// ── Top-level source definition ──────────────────────────────────────────

/// A complete, config-driven agency source definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"usfs_polygons"`).
    pub id: String,
    /// Human-readable name (e.g., `"USDA Forest Service FACTS"`).
    pub name: String,
    /// Agency every record from this source is attributed to.
    pub agency: Agency,
    /// Geometry kind of every record in the export.
    pub geometry_kind: GeometryKind,
    /// Field name mappings for normalization.
    pub fields: FieldMapping,
    /// Optional record filter (e.g. only records that count toward the
    /// million-acre strategy).
    #[serde(default)]
    pub include_when: Option<IncludeFilter>,
}

/// Field name mappings from the export's properties to the canonical
/// record.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldMapping {
    /// Agency treatment key, if the export has one.
    pub key: Option<String>,
    /// Treatment start date.
    pub start_date: DateField,
    /// Treatment end date. Records without it are point-in-time.
    pub end_date: Option<DateField>,
    /// Reported treated area. Required for line and point sources.
    pub treated_area: Option<AreaField>,
}

/// A property that holds a date.
#[derive(Debug, Clone, Deserialize)]
pub struct DateField {
    /// Property name.
    pub field: String,
    /// How the date is encoded.
    #[serde(default)]
    pub format: DateFormat,
}

/// Date encodings seen in agency exports.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// ISO 8601 date or datetime text.
    #[default]
    Iso,
    /// `MM/DD/YYYY` text.
    Mdy,
    /// Epoch milliseconds.
    EpochMs,
}

/// A property that holds a reported area.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaField {
    /// Property name.
    pub field: String,
    /// Unit of the reported value.
    #[serde(default)]
    pub unit: AreaUnit,
}

/// Unit of a reported area.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    /// Acres, converted to square meters of the planar CRS.
    #[default]
    Acres,
    /// Already in square meters.
    SquareMeters,
}

impl AreaUnit {
    /// Factor converting this unit to square meters.
    #[must_use]
    pub const fn to_square_meters(self) -> f64 {
        match self {
            Self::Acres => SQ_METERS_PER_ACRE,
            Self::SquareMeters => 1.0,
        }
    }
}

/// Keeps only records whose `field` equals `equals` (case-insensitive).
#[derive(Debug, Clone, Deserialize)]
pub struct IncludeFilter {
    /// Property name.
    pub field: String,
    /// Required value.
    pub equals: String,
}

/// Parses a source definition from TOML.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or does not match the schema.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, toml::de::Error> {
    toml::from_str(toml_str)
}

// ── Extraction ───────────────────────────────────────────────────────────

impl DateField {
    fn extract(&self, feature: &Feature) -> Option<NaiveDate> {
        let value = feature.property(&self.field)?;
        match self.format {
            DateFormat::Iso => parse_iso_date(value.as_str()?),
            DateFormat::Mdy => parse_mdy_date(value.as_str()?),
            DateFormat::EpochMs => parse_epoch_ms(parse_number(value)?),
        }
    }
}

impl AreaField {
    fn extract(&self, feature: &Feature) -> Option<f64> {
        let value = parse_number(feature.property(&self.field)?)?;
        Some(value * self.unit.to_square_meters())
    }
}

impl IncludeFilter {
    fn matches(&self, feature: &Feature) -> bool {
        feature
            .property(&self.field)
            .and_then(serde_json::Value::as_str)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case(&self.equals))
    }
}

fn extract_key(feature: &Feature, field: &str) -> Option<String> {
    match feature.property(field)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ── Generic adapter ──────────────────────────────────────────────────────

/// The one [`SourceAdapter`] implementation, driven by a
/// [`SourceDefinition`].
#[derive(Debug, Clone)]
pub struct FieldMappingAdapter {
    definition: SourceDefinition,
}

impl FieldMappingAdapter {
    /// Wraps a definition.
    #[must_use]
    pub const fn new(definition: SourceDefinition) -> Self {
        Self { definition }
    }

    /// The underlying definition.
    #[must_use]
    pub const fn definition(&self) -> &SourceDefinition {
        &self.definition
    }

    /// Maps one feature. `Ok(None)` means the include filter excluded it.
    fn adapt_feature(
        &self,
        index: usize,
        feature: Feature,
    ) -> Result<Option<RawActivityRecord>, RejectedFeature> {
        let fields = &self.definition.fields;
        let source_key = fields.key.as_deref().and_then(|k| extract_key(&feature, k));
        let label = source_key
            .clone()
            .unwrap_or_else(|| format!("feature #{index}"));

        if let Some(filter) = &self.definition.include_when
            && !filter.matches(&feature)
        {
            log::trace!("[{}] {label} filtered out", self.definition.id);
            return Ok(None);
        }

        let reject = |reason: String| {
            log::warn!("[{}] Rejecting {label}: {reason}", self.definition.id);
            RejectedFeature {
                index,
                source_key: source_key.clone(),
                reason,
            }
        };

        let Some(start_date) = fields.start_date.extract(&feature) else {
            return Err(reject(format!(
                "no usable {} value",
                fields.start_date.field
            )));
        };
        let end_date = fields.end_date.as_ref().and_then(|f| f.extract(&feature));
        let treated_area = fields.treated_area.as_ref().and_then(|f| f.extract(&feature));

        let Some(geometry) = feature
            .geometry
            .and_then(|g| geo::Geometry::<f64>::try_from(g).ok())
        else {
            return Err(reject("no usable geometry".to_string()));
        };

        Ok(Some(RawActivityRecord {
            source_key,
            agency: self.definition.agency,
            geometry,
            start_date,
            end_date,
            treated_area,
        }))
    }
}

impl SourceAdapter for FieldMappingAdapter {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn name(&self) -> &str {
        &self.definition.name
    }

    fn agency(&self) -> Agency {
        self.definition.agency
    }

    fn geometry_kind(&self) -> GeometryKind {
        self.definition.geometry_kind
    }

    fn adapt(&self, features: FeatureCollection) -> Result<AdaptedExport, SourceError> {
        let total = features.features.len();
        let mut adapted = AdaptedExport::default();

        for (index, feature) in features.features.into_iter().enumerate() {
            match self.adapt_feature(index, feature) {
                Ok(Some(record)) => adapted.records.push(record),
                Ok(None) => {}
                Err(rejected) => adapted.rejected.push(rejected),
            }
        }

        log::info!(
            "[{}] Adapted {}/{total} features ({} rejected)",
            self.definition.id,
            adapted.records.len(),
            adapted.rejected.len()
        );

        Ok(adapted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"
        id = "test_lines"
        name = "Test line source"
        agency = "CALTRANS"
        geometry_kind = "line"

        [fields]
        key = "TRMT_ID"
        start_date = { field = "START", format = "mdy" }
        end_date = { field = "END", format = "epoch_ms" }
        treated_area = { field = "ACRES" }

        [include_when]
        field = "COUNTS_TO_MAS"
        equals = "yes"
    "#;

    fn collection(features: serde_json::Value) -> FeatureCollection {
        serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": features,
        }))
        .unwrap()
    }

    fn line_feature(properties: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "type": "Feature",
            "properties": properties,
            "geometry": {"type": "LineString", "coordinates": [[0.0, 0.0], [100.0, 0.0]]},
        })
    }

    #[test]
    fn parses_definition() {
        let definition = parse_source_toml(DEFINITION).unwrap();
        assert_eq!(definition.agency, Agency::Caltrans);
        assert_eq!(definition.geometry_kind, GeometryKind::Line);
        assert!(matches!(
            definition.fields.start_date.format,
            DateFormat::Mdy
        ));
    }

    #[test]
    fn adapts_matching_features() {
        let adapter = FieldMappingAdapter::new(parse_source_toml(DEFINITION).unwrap());
        let adapted = adapter
            .adapt(collection(serde_json::json!([
                line_feature(serde_json::json!({
                    "TRMT_ID": 881,
                    "START": "03/01/2022",
                    "END": 1_705_312_200_000_i64,
                    "ACRES": "2.5",
                    "COUNTS_TO_MAS": "YES",
                })),
                line_feature(serde_json::json!({
                    "TRMT_ID": 882,
                    "START": "03/01/2022",
                    "COUNTS_TO_MAS": "NO",
                })),
                line_feature(serde_json::json!({
                    "TRMT_ID": 883,
                    "START": "not a date",
                    "COUNTS_TO_MAS": "YES",
                })),
            ])))
            .unwrap();

        let records = &adapted.records;
        assert_eq!(records.len(), 1);
        // The filtered-out feature is not a rejection; the bad date is.
        assert_eq!(
            adapted.rejected,
            vec![RejectedFeature {
                index: 2,
                source_key: Some("883".to_string()),
                reason: "no usable START value".to_string(),
            }]
        );
        let record = &records[0];
        assert_eq!(record.source_key.as_deref(), Some("881"));
        assert_eq!(record.start_date, NaiveDate::from_ymd_opt(2022, 3, 1).unwrap());
        assert_eq!(record.end_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        let area = record.treated_area.unwrap();
        assert!((area - 2.5 * SQ_METERS_PER_ACRE).abs() < 1e-9);
        assert!(matches!(record.geometry, geo::Geometry::LineString(_)));
    }

    #[test]
    fn missing_optional_fields_stay_none() {
        let adapter = FieldMappingAdapter::new(parse_source_toml(DEFINITION).unwrap());
        let records = adapter
            .adapt(collection(serde_json::json!([line_feature(serde_json::json!({
                "START": "12/31/2021",
                "COUNTS_TO_MAS": "Yes",
            }))])))
            .unwrap()
            .records;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_key, None);
        assert_eq!(records[0].end_date, None);
        assert_eq!(records[0].treated_area, None);
    }

    #[test]
    fn null_geometry_is_rejected_with_its_key() {
        let adapter = FieldMappingAdapter::new(parse_source_toml(DEFINITION).unwrap());
        let adapted = adapter
            .adapt(collection(serde_json::json!([{
                "type": "Feature",
                "properties": {"TRMT_ID": "X-9", "START": "01/02/2023", "COUNTS_TO_MAS": "yes"},
                "geometry": null,
            }])))
            .unwrap();

        assert!(adapted.records.is_empty());
        assert_eq!(adapted.rejected.len(), 1);
        assert_eq!(adapted.rejected[0].index, 0);
        assert_eq!(adapted.rejected[0].source_key.as_deref(), Some("X-9"));
        assert_eq!(adapted.rejected[0].reason, "no usable geometry");
    }
}
