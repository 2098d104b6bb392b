#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Turns aggregation results into the activity and footprint reports.
//!
//! Building is pure; the [`write`] module puts the reports on disk.
//! Aggregation works in square meters of the projected CRS; every area in
//! a report is in acres.

pub mod write;

use treatment_map_activity_models::{ActivityCollection, ActivityId, acres};
use treatment_map_aggregate::{EffortTable, FootprintResult};
use treatment_map_report_models::{
    ActivityReportRow, FootprintReport, FootprintReportRow,
};

/// Errors that can occur while building or writing reports.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A region references an activity the collection does not hold.
    #[error("Footprint region references unknown activity {id}")]
    MissingActivity {
        /// The unknown id.
        id: ActivityId,
    },
}

/// Flattens an effort table into rows ordered by agency, then year.
#[must_use]
pub fn build_activity_report(table: &EffortTable) -> Vec<ActivityReportRow> {
    table
        .iter()
        .map(|(agency, year, cell)| ActivityReportRow {
            agency,
            entity_type: agency.entity_type(),
            year,
            summed_treated_area: acres(cell.treated_area),
            activity_count: cell.activity_count,
        })
        .collect()
}

/// Labels every region with its primary activity and flattens the
/// partition into report rows.
///
/// # Errors
///
/// Returns [`ReportError::MissingActivity`] if `collection` is not the
/// collection the partition was built from.
pub fn build_footprint_report(
    result: &FootprintResult,
    collection: &ActivityCollection,
) -> Result<FootprintReport, ReportError> {
    let rows = result
        .regions
        .iter()
        .zip(1_u64..)
        .map(|(region, region_id)| {
            let primary = collection.get(region.primary_activity_id).ok_or(
                ReportError::MissingActivity {
                    id: region.primary_activity_id,
                },
            )?;

            Ok(FootprintReportRow {
                region_id,
                geometry: region.geometry.clone(),
                area: acres(region.area),
                treatment_count: region.treatment_count(),
                contributing_activity_ids: region
                    .contributing_activity_ids
                    .iter()
                    .copied()
                    .collect(),
                years_active: region.years_active.iter().copied().collect(),
                primary_agency: primary.agency,
                primary_entity_type: primary.agency.entity_type(),
                reference_attrs: primary.reference_attrs.clone().unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, ReportError>>()?;

    Ok(FootprintReport {
        window: result.window,
        kind: result.kind,
        rows,
        total_footprint_area: acres(result.total_footprint_area),
    })
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};
    use treatment_map_activity_models::{
        Activity, ActivityGeometry, Agency, EntityType, FiscalYears, GeometryKind,
        ReferenceAttributes, ReferenceLayerKind, YearWindow,
    };
    use treatment_map_aggregate::{DEFAULT_SLIVER_TOLERANCE, level_of_effort, reduce_window};

    use super::*;

    fn assert_acres(actual: f64, square_meters: f64) {
        let expected = square_meters / 4_046.856_422_4;
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected} acres, got {actual}"
        );
    }

    fn square(x0: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: 0.0),
            (x: x0 + size, y: 0.0),
            (x: x0 + size, y: size),
            (x: x0, y: size),
        ]])
    }

    fn activity(id: u64, agency: Agency, geometry: MultiPolygon<f64>, years: (i32, i32)) -> Activity {
        let mut attrs = ReferenceAttributes::default();
        attrs.set(ReferenceLayerKind::County, Some(format!("County {id}")));
        attrs.set(ReferenceLayerKind::Wui, None);

        Activity {
            id: ActivityId(id),
            source_key: Some(format!("K{id}")),
            agency,
            treated_area: geo::Area::unsigned_area(&geometry),
            geometry: ActivityGeometry::Polygon(geometry),
            start_year: years.0,
            end_year: years.1,
            fiscal_years: FiscalYears {
                federal: years.1,
                state: years.1,
            },
            reference_attrs: Some(attrs),
        }
    }

    pub(crate) fn sample() -> (ActivityCollection, YearWindow) {
        let mut collection = ActivityCollection::new(GeometryKind::Polygon);
        collection
            .push(activity(0, Agency::Cnra, square(0.0, 10.0), (2021, 2022)))
            .unwrap();
        collection
            .push(activity(1, Agency::Usfs, square(5.0, 20.0), (2022, 2022)))
            .unwrap();
        (collection, YearWindow::new(2021, 2022).unwrap())
    }

    #[test]
    fn activity_rows_carry_entity_type_in_order() {
        let (collection, window) = sample();
        let rows = build_activity_report(&level_of_effort(collection.activities(), window));

        let keys: Vec<(Agency, EntityType, i32)> = rows
            .iter()
            .map(|r| (r.agency, r.entity_type, r.year))
            .collect();
        assert_eq!(
            keys,
            vec![
                (Agency::Usfs, EntityType::Federal, 2022),
                (Agency::Cnra, EntityType::State, 2021),
                (Agency::Cnra, EntityType::State, 2022),
            ]
        );
        assert_acres(rows[0].summed_treated_area, 400.0);
        assert_eq!(rows[2].activity_count, 1);
    }

    #[test]
    fn footprint_rows_are_labelled_by_largest_member() {
        let (collection, window) = sample();
        let result = reduce_window(&collection, window, DEFAULT_SLIVER_TOLERANCE)
            .result
            .unwrap();
        let report = build_footprint_report(&result, &collection).unwrap();

        assert_eq!(report.rows.len(), result.regions.len());
        assert_eq!(
            report.rows.iter().map(|r| r.region_id).collect::<Vec<_>>(),
            (1..=report.rows.len() as u64).collect::<Vec<_>>()
        );

        let shared = report
            .rows
            .iter()
            .find(|r| r.treatment_count == 2)
            .unwrap();
        assert_eq!(shared.primary_agency, Agency::Usfs);
        assert_eq!(shared.primary_entity_type, EntityType::Federal);
        assert_eq!(
            shared.reference_attrs.get(ReferenceLayerKind::County),
            Some("County 1")
        );
        assert_eq!(shared.years_active, vec![2021, 2022]);
        assert_eq!(
            shared.contributing_activity_ids,
            vec![ActivityId(0), ActivityId(1)]
        );
        assert_acres(report.total_footprint_area, 450.0);
        let summed: f64 = report.rows.iter().map(|r| r.area).sum();
        assert!((summed - report.total_footprint_area).abs() < 1e-9);
    }

    #[test]
    fn mismatched_collection_is_an_error() {
        let (collection, window) = sample();
        let result = reduce_window(&collection, window, DEFAULT_SLIVER_TOLERANCE)
            .result
            .unwrap();
        let other = ActivityCollection::new(GeometryKind::Polygon);
        assert!(matches!(
            build_footprint_report(&result, &other),
            Err(ReportError::MissingActivity { .. })
        ));
    }

    #[test]
    fn one_acre_of_square_meters_reports_as_one() {
        let mut collection = ActivityCollection::new(GeometryKind::Polygon);
        let side = 4_046.856_422_4_f64.sqrt();
        collection
            .push(activity(0, Agency::Nps, square(0.0, side), (2020, 2020)))
            .unwrap();
        let window = YearWindow::single(2020);

        let rows = build_activity_report(&level_of_effort(collection.activities(), window));
        assert!((rows[0].summed_treated_area - 1.0).abs() < 1e-9);

        let result = reduce_window(&collection, window, DEFAULT_SLIVER_TOLERANCE)
            .result
            .unwrap();
        let report = build_footprint_report(&result, &collection).unwrap();
        assert!((report.rows[0].area - 1.0).abs() < 1e-9);
        assert!((report.total_footprint_area - 1.0).abs() < 1e-9);
    }
}
