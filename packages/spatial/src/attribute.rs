//! Area-weighted attribution of activities against reference layers.
//!
//! Each activity takes the value of the reference category it overlaps
//! most. Weights are cumulative per value, so a treatment straddling three
//! small "Conifer" polygons and one larger "Shrub" polygon can still come
//! out as "Conifer".

use std::collections::BTreeMap;

use geo::{Intersects, MultiPolygon};
use treatment_map_activity_models::{
    ActivityGeometry, ActivityId, Diagnostic, Diagnostics, ReferenceAttributes,
};

use crate::overlay::{self, OverlayError};
use crate::{ReferenceLayer, ReferenceLayers};

/// Default tie tolerance, relative to the activity's total measure.
pub const DEFAULT_TIE_EPSILON: f64 = 1e-6;

/// The winning reference value for one activity and one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeMatch {
    /// Assigned attribute value.
    pub value: String,
    /// Cumulative overlap of the activity with polygons carrying `value`
    /// (area for polygons, length for lines, count for points).
    pub weight: f64,
    /// Lowest id among the reference polygons that contributed to `value`.
    pub polygon_id: u64,
}

#[derive(Debug, Clone, Copy)]
struct Tally {
    weight: f64,
    min_polygon_id: u64,
}

/// Assigns the value of `layer` with the largest cumulative overlap.
///
/// Values whose weights are within `tie_epsilon` times the activity's total
/// measure of the maximum are tied; the one backed by the lowest
/// reference-polygon id wins. Returns `Ok(None)` when nothing in the layer
/// overlaps the activity.
///
/// # Errors
///
/// Returns [`OverlayError`] if an intersection with a candidate polygon is
/// degenerate.
pub fn attribute(
    geometry: &ActivityGeometry,
    layer: &ReferenceLayer,
    tie_epsilon: f64,
) -> Result<Option<AttributeMatch>, OverlayError> {
    let Some(envelope) = activity_envelope(geometry) else {
        return Ok(None);
    };

    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();

    for entry in layer.candidates(envelope) {
        let weight = overlap_weight(geometry, &entry.polygon)?;
        if weight <= 0.0 {
            continue;
        }
        tallies
            .entry(entry.value.as_str())
            .and_modify(|tally| {
                tally.weight += weight;
                tally.min_polygon_id = tally.min_polygon_id.min(entry.id);
            })
            .or_insert(Tally {
                weight,
                min_polygon_id: entry.id,
            });
    }

    let Some(max_weight) = tallies.values().map(|t| t.weight).reduce(f64::max) else {
        return Ok(None);
    };
    let tolerance = tie_epsilon * total_measure(geometry);

    Ok(tallies
        .into_iter()
        .filter(|(_, tally)| max_weight - tally.weight <= tolerance)
        .min_by_key(|(_, tally)| tally.min_polygon_id)
        .map(|(value, tally)| AttributeMatch {
            value: value.to_string(),
            weight: tally.weight,
            polygon_id: tally.min_polygon_id,
        }))
}

/// Runs [`attribute`] against every loaded layer independently.
///
/// A layer without coverage yields a null attribute and a
/// [`Diagnostic::ReferenceCoverageGap`]; a layer whose overlay fails yields
/// a null attribute and a [`Diagnostic::ReferenceJoinFailed`]. Neither stops
/// the remaining layers.
#[must_use]
pub fn attribute_all(
    activity_id: ActivityId,
    geometry: &ActivityGeometry,
    layers: &ReferenceLayers,
    tie_epsilon: f64,
) -> (ReferenceAttributes, Diagnostics) {
    let mut attrs = ReferenceAttributes::default();
    let mut diagnostics = Diagnostics::new();

    for (kind, layer) in layers.iter() {
        match attribute(geometry, layer, tie_epsilon) {
            Ok(Some(found)) => attrs.set(kind, Some(found.value)),
            Ok(None) => {
                log::debug!("Activity {activity_id} has no {kind} coverage");
                attrs.set(kind, None);
                diagnostics.push(Diagnostic::ReferenceCoverageGap {
                    activity_id,
                    layer: kind,
                });
            }
            Err(e) => {
                log::warn!("Activity {activity_id}: {kind} join failed: {e}");
                attrs.set(kind, None);
                diagnostics.push(Diagnostic::ReferenceJoinFailed {
                    activity_id,
                    layer: kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    (attrs, diagnostics)
}

fn overlap_weight(
    geometry: &ActivityGeometry,
    reference: &MultiPolygon<f64>,
) -> Result<f64, OverlayError> {
    Ok(match geometry {
        ActivityGeometry::Polygon(polygons) => {
            overlay::area(&overlay::intersection(polygons, reference)?)
        }
        ActivityGeometry::Line(lines) => {
            overlay::line_length(&overlay::clip_lines(reference, lines)?)
        }
        ActivityGeometry::Point(points) => {
            #[allow(clippy::cast_precision_loss)]
            let inside = points.0.iter().filter(|p| reference.intersects(*p)).count() as f64;
            inside
        }
    })
}

fn total_measure(geometry: &ActivityGeometry) -> f64 {
    match geometry {
        ActivityGeometry::Polygon(polygons) => overlay::area(polygons),
        ActivityGeometry::Line(lines) => overlay::line_length(lines),
        #[allow(clippy::cast_precision_loss)]
        ActivityGeometry::Point(points) => points.0.len() as f64,
    }
}

fn activity_envelope(geometry: &ActivityGeometry) -> Option<geo::Rect<f64>> {
    use geo::BoundingRect;

    match geometry {
        ActivityGeometry::Polygon(polygons) => polygons.bounding_rect(),
        ActivityGeometry::Line(lines) => lines.bounding_rect(),
        ActivityGeometry::Point(points) => points.bounding_rect(),
    }
}

#[cfg(test)]
mod tests {
    use geo::{LineString, MultiLineString, MultiPoint, Point, polygon};
    use treatment_map_activity_models::ReferenceLayerKind;

    use super::*;
    use crate::ReferenceFeature;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
        ]])
    }

    fn feature(id: u64, value: &str, geometry: MultiPolygon<f64>) -> ReferenceFeature {
        ReferenceFeature {
            id,
            value: value.to_string(),
            geometry,
        }
    }

    fn vegetation() -> ReferenceLayer {
        ReferenceLayer::from_features(
            ReferenceLayerKind::Vegetation,
            vec![
                feature(1, "Conifer", rect(0.0, 0.0, 3.0, 10.0)),
                feature(2, "Shrub", rect(3.0, 0.0, 7.0, 10.0)),
                feature(3, "Conifer", rect(7.0, 0.0, 10.0, 10.0)),
            ],
        )
    }

    #[test]
    fn cumulative_area_wins_over_largest_single_polygon() {
        let activity = ActivityGeometry::Polygon(rect(0.0, 0.0, 10.0, 10.0));
        let found = attribute(&activity, &vegetation(), DEFAULT_TIE_EPSILON)
            .unwrap()
            .unwrap();
        assert_eq!(found.value, "Conifer");
        assert!((found.weight - 60.0).abs() < 1e-9);
        assert_eq!(found.polygon_id, 1);
    }

    #[test]
    fn ties_resolve_to_lowest_polygon_id() {
        let layer = ReferenceLayer::from_features(
            ReferenceLayerKind::Ownership,
            vec![
                feature(4, "Private", rect(0.0, 0.0, 5.0, 10.0)),
                feature(9, "Federal", rect(5.0, 0.0, 10.0, 10.0)),
            ],
        );
        // "Private" is short by 1e-7, well inside 1e-6 of the total area.
        let activity = ActivityGeometry::Polygon(rect(0.000_000_01, 0.0, 10.0, 10.0));

        for _ in 0..5 {
            let found = attribute(&activity, &layer, DEFAULT_TIE_EPSILON)
                .unwrap()
                .unwrap();
            assert_eq!(found.value, "Private");
            assert_eq!(found.polygon_id, 4);
        }
    }

    #[test]
    fn outside_coverage_is_none() {
        let activity = ActivityGeometry::Polygon(rect(100.0, 100.0, 110.0, 110.0));
        assert_eq!(
            attribute(&activity, &vegetation(), DEFAULT_TIE_EPSILON).unwrap(),
            None
        );
    }

    #[test]
    fn lines_weighted_by_clipped_length() {
        let activity = ActivityGeometry::Line(MultiLineString::new(vec![LineString::from(vec![
            (2.0, 5.0),
            (8.0, 5.0),
        ])]));
        let found = attribute(&activity, &vegetation(), DEFAULT_TIE_EPSILON)
            .unwrap()
            .unwrap();
        assert_eq!(found.value, "Shrub");
        assert!((found.weight - 4.0).abs() < 1e-9);
    }

    #[test]
    fn points_weighted_by_count() {
        let activity = ActivityGeometry::Point(MultiPoint::new(vec![
            Point::new(1.0, 1.0),
            Point::new(5.0, 1.0),
            Point::new(6.0, 1.0),
        ]));
        let found = attribute(&activity, &vegetation(), DEFAULT_TIE_EPSILON)
            .unwrap()
            .unwrap();
        assert_eq!(found.value, "Shrub");
    }

    #[test]
    fn uncovered_activity_gets_null_for_every_layer() {
        let mut layers = ReferenceLayers::new();
        layers.insert(vegetation());
        layers.insert(ReferenceLayer::from_features(
            ReferenceLayerKind::County,
            vec![feature(1, "Plumas", rect(0.0, 0.0, 10.0, 10.0))],
        ));

        let activity = ActivityGeometry::Polygon(rect(-50.0, -50.0, -40.0, -40.0));
        let (attrs, diagnostics) =
            attribute_all(ActivityId(12), &activity, &layers, DEFAULT_TIE_EPSILON);

        assert_eq!(attrs.get(ReferenceLayerKind::Vegetation), None);
        assert_eq!(attrs.get(ReferenceLayerKind::County), None);
        assert_eq!(attrs.iter().count(), 2);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.as_slice().iter().all(|d| matches!(
            d,
            Diagnostic::ReferenceCoverageGap {
                activity_id: ActivityId(12),
                ..
            }
        )));
    }

    #[test]
    fn partial_coverage_still_attributes() {
        let mut layers = ReferenceLayers::new();
        layers.insert(vegetation());
        layers.insert(ReferenceLayer::from_features(
            ReferenceLayerKind::Wui,
            vec![feature(1, "WUI", rect(50.0, 50.0, 60.0, 60.0))],
        ));

        let activity = ActivityGeometry::Polygon(rect(1.0, 1.0, 2.0, 2.0));
        let (attrs, diagnostics) =
            attribute_all(ActivityId(3), &activity, &layers, DEFAULT_TIE_EPSILON);

        assert_eq!(attrs.get(ReferenceLayerKind::Vegetation), Some("Conifer"));
        assert_eq!(attrs.get(ReferenceLayerKind::Wui), None);
        assert_eq!(diagnostics.len(), 1);
    }
}
