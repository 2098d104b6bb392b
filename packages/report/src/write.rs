//! Report file writers.

use std::io::{BufWriter, Write as _};
use std::path::Path;

use treatment_map_activity_models::Diagnostics;
use treatment_map_report_models::{ActivityReportRow, FootprintReport, FootprintReportRow};

use crate::ReportError;

/// Writes the activity report as CSV with a header row.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be created or written.
pub fn write_activity_csv(rows: &[ActivityReportRow], path: &Path) -> Result<(), ReportError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Wrote {} activity report rows to {}", rows.len(), path.display());
    Ok(())
}

/// Writes a footprint report as a `GeoJSON` `FeatureCollection`, one
/// feature per region. The window, geometry kind, area unit, and total
/// area are written as foreign members of the collection.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be created or written.
pub fn write_footprint_geojson(report: &FootprintReport, path: &Path) -> Result<(), ReportError> {
    let features: Vec<serde_json::Value> = report.rows.iter().map(region_feature).collect();

    let collection = serde_json::json!({
        "type": "FeatureCollection",
        "window": [report.window.start(), report.window.end()],
        "geometry_kind": report.kind,
        "area_unit": "acres",
        "total_footprint_area": report.total_footprint_area,
        "features": features,
    });

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &collection)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    log::info!(
        "Wrote {} {} footprint regions for {} to {}",
        report.rows.len(),
        report.kind,
        report.window,
        path.display()
    );
    Ok(())
}

/// Writes the run's diagnostics as a pretty-printed JSON array.
///
/// # Errors
///
/// Returns [`ReportError`] if the file cannot be created or written.
pub fn write_diagnostics_json(diagnostics: &Diagnostics, path: &Path) -> Result<(), ReportError> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, diagnostics.as_slice())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    log::info!("Wrote {} diagnostics to {}", diagnostics.len(), path.display());
    Ok(())
}

fn region_feature(row: &FootprintReportRow) -> serde_json::Value {
    let geometry = geojson::Geometry::new(geojson::Value::from(&row.geometry));

    let mut properties = serde_json::json!({
        "region_id": row.region_id,
        "area": row.area,
        "treatment_count": row.treatment_count,
        "contributing_activity_ids": row.contributing_activity_ids,
        "years_active": row.years_active,
        "primary_agency": row.primary_agency,
        "primary_entity_type": row.primary_entity_type,
    });

    if let Some(map) = properties.as_object_mut() {
        for (layer, value) in row.reference_attrs.iter() {
            map.insert(layer.as_ref().to_lowercase(), serde_json::json!(value));
        }
    }

    serde_json::json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use treatment_map_activity_models::{ActivityId, Diagnostic, ReferenceLayerKind};
    use treatment_map_aggregate::{DEFAULT_SLIVER_TOLERANCE, level_of_effort, reduce_window};

    use super::*;
    use crate::tests::sample;
    use crate::{build_activity_report, build_footprint_report};

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "treatment_map_report_{name}_{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn activity_csv_has_header_and_rows() {
        let (collection, window) = sample();
        let rows = build_activity_report(&level_of_effort(collection.activities(), window));

        let dir = scratch_dir("csv");
        let path = dir.join("activity_report.csv");
        write_activity_csv(&rows, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "agency,entity_type,year,summed_treated_area,activity_count"
        );
        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields[..3], ["USFS", "Federal", "2022"]);
        let acres: f64 = fields[3].parse().unwrap();
        assert!((acres - 400.0 / 4_046.856_422_4).abs() < 1e-9);
        assert_eq!(fields[4], "1");
        assert_eq!(lines.len(), 4);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn footprint_geojson_parses_back() {
        let (collection, window) = sample();
        let result = reduce_window(&collection, window, DEFAULT_SLIVER_TOLERANCE)
            .result
            .unwrap();
        let report = build_footprint_report(&result, &collection).unwrap();

        let dir = scratch_dir("geojson");
        let path = dir.join(report.file_name());
        write_footprint_geojson(&report, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["geometry_kind"], "polygon");
        assert_eq!(value["window"], serde_json::json!([2021, 2022]));
        assert_eq!(value["area_unit"], "acres");

        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), report.rows.len());
        let first = &features[0]["properties"];
        assert_eq!(first["region_id"], 1);
        assert!(first["county"].is_string());
        assert!(first["wui"].is_null());

        let parsed = text.parse::<geojson::GeoJson>().unwrap();
        assert!(matches!(parsed, geojson::GeoJson::FeatureCollection(_)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn diagnostics_are_tagged_json() {
        let diagnostics: Diagnostics = vec![Diagnostic::ReferenceCoverageGap {
            activity_id: ActivityId(7),
            layer: ReferenceLayerKind::Region,
        }]
        .into_iter()
        .collect();

        let dir = scratch_dir("diagnostics");
        let path = dir.join("diagnostics.json");
        write_diagnostics_json(&diagnostics, &path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "type": "reference_coverage_gap",
                "activity_id": 7,
                "layer": "REGION",
            }])
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
