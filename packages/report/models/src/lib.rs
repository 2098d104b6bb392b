#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Report row types.
//!
//! These are separate from the aggregation types so the report schemas can
//! evolve without touching the overlay engine.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use treatment_map_activity_models::{
    ActivityId, Agency, EntityType, GeometryKind, ReferenceAttributes, YearWindow,
};

/// One row of the level-of-effort report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityReportRow {
    /// Reporting agency.
    pub agency: Agency,
    /// Administrative level of the agency.
    pub entity_type: EntityType,
    /// Calendar year.
    pub year: i32,
    /// Treated area in acres, summed over every activity active that year.
    pub summed_treated_area: f64,
    /// Number of activities active that year.
    pub activity_count: u64,
}

/// One region of a footprint report.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintReportRow {
    /// 1-based position of the region within its report.
    pub region_id: u64,
    /// Region geometry.
    pub geometry: MultiPolygon<f64>,
    /// Area of the region in acres.
    pub area: f64,
    /// Number of distinct activities covering the region.
    pub treatment_count: usize,
    /// Covering activities, ascending.
    pub contributing_activity_ids: Vec<ActivityId>,
    /// Years any covering activity was active, ascending.
    pub years_active: Vec<i32>,
    /// Agency of the largest covering activity.
    pub primary_agency: Agency,
    /// Entity type of `primary_agency`.
    pub primary_entity_type: EntityType,
    /// Reference attributes of the largest covering activity.
    pub reference_attrs: ReferenceAttributes,
}

/// Deduplicated footprint for one window and geometry kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintReport {
    /// Window the report covers.
    pub window: YearWindow,
    /// Geometry kind the report covers.
    pub kind: GeometryKind,
    /// Regions in partition order.
    pub rows: Vec<FootprintReportRow>,
    /// Sum of region areas in acres.
    pub total_footprint_area: f64,
}

impl FootprintReport {
    /// File name the report is written under.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "footprint_{}_{}_{}.geojson",
            self.kind,
            self.window.start(),
            self.window.end()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_encodes_kind_and_window() {
        let report = FootprintReport {
            window: YearWindow::new(2021, 2023).unwrap(),
            kind: GeometryKind::Line,
            rows: vec![],
            total_footprint_area: 0.0,
        };
        assert_eq!(report.file_name(), "footprint_line_2021_2023.geojson");
    }
}
