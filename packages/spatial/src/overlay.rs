//! Guarded wrappers over `geo`'s planar boolean operations.
//!
//! The overlay engine itself comes from `geo` (backed by `i_overlay`).
//! These wrappers add the checks the aggregation stages rely on: a panic
//! inside the library, non-finite output, or an output area larger than
//! its inputs allow is reported as an [`OverlayError`] instead of flowing
//! into acreage totals.

use std::panic::{AssertUnwindSafe, catch_unwind};

use geo::{
    Area, BooleanOps, BoundingRect, CoordsIter, LineString, MultiLineString, MultiPolygon, Rect,
};

/// Relative slack allowed when checking output area against its bound.
const AREA_BOUND_TOLERANCE: f64 = 1e-7;

/// A numerically invalid overlay result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OverlayError {
    /// The geometry library panicked.
    #[error("{operation} panicked inside the geometry library")]
    Panicked {
        /// Operation that failed.
        operation: &'static str,
    },

    /// The output contains NaN or infinite coordinates.
    #[error("{operation} produced non-finite coordinates")]
    NonFinite {
        /// Operation that failed.
        operation: &'static str,
    },

    /// The output area exceeds what the inputs can produce.
    #[error("{operation} produced area {produced} above bound {bound}")]
    AreaInflation {
        /// Operation that failed.
        operation: &'static str,
        /// Area of the output.
        produced: f64,
        /// Largest area the inputs allow.
        bound: f64,
    },
}

/// Planar area of a multipolygon.
#[must_use]
pub fn area(geometry: &MultiPolygon<f64>) -> f64 {
    geometry.unsigned_area()
}

/// Planar length of line work.
#[must_use]
pub fn line_length(lines: &MultiLineString<f64>) -> f64 {
    lines
        .0
        .iter()
        .flat_map(LineString::lines)
        .map(|line| line.dx().hypot(line.dy()))
        .sum()
}

/// Bounding rectangle, `None` for empty geometries.
#[must_use]
pub fn envelope(geometry: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    geometry.bounding_rect()
}

/// Whether two bounding rectangles overlap or touch.
#[must_use]
pub fn envelopes_intersect(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && b.min().x <= a.max().x && a.min().y <= b.max().y && b.min().y <= a.max().y
}

/// `a ∩ b`.
///
/// # Errors
///
/// Returns [`OverlayError`] if the result is degenerate.
pub fn intersection(
    a: &MultiPolygon<f64>,
    b: &MultiPolygon<f64>,
) -> Result<MultiPolygon<f64>, OverlayError> {
    let result = guarded("intersection", || a.intersection(b))?;
    check_area_bound("intersection", &result, area(a).min(area(b)))?;
    Ok(result)
}

/// `a − b`.
///
/// # Errors
///
/// Returns [`OverlayError`] if the result is degenerate.
pub fn difference(
    a: &MultiPolygon<f64>,
    b: &MultiPolygon<f64>,
) -> Result<MultiPolygon<f64>, OverlayError> {
    let result = guarded("difference", || a.difference(b))?;
    check_area_bound("difference", &result, area(a))?;
    Ok(result)
}

/// `a ∪ b`.
///
/// # Errors
///
/// Returns [`OverlayError`] if the result is degenerate.
pub fn union(
    a: &MultiPolygon<f64>,
    b: &MultiPolygon<f64>,
) -> Result<MultiPolygon<f64>, OverlayError> {
    let result = guarded("union", || a.union(b))?;
    check_area_bound("union", &result, area(a) + area(b))?;
    Ok(result)
}

/// The parts of `lines` inside `polygons`.
///
/// # Errors
///
/// Returns [`OverlayError`] if the clip fails.
pub fn clip_lines(
    polygons: &MultiPolygon<f64>,
    lines: &MultiLineString<f64>,
) -> Result<MultiLineString<f64>, OverlayError> {
    let result = guarded("clip", || polygons.clip(lines, false))?;
    if !result.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite()) {
        return Err(OverlayError::NonFinite { operation: "clip" });
    }
    Ok(result)
}

/// Resolves self-intersections and overlapping parts by re-unioning every
/// polygon through the overlay engine (the zero-distance buffer idiom).
/// Parts with no area are dropped, so the result may be empty.
///
/// # Errors
///
/// Returns [`OverlayError`] if the input cannot be rebuilt.
pub fn repair(geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, OverlayError> {
    if !is_finite(geometry) {
        return Err(OverlayError::NonFinite { operation: "repair" });
    }

    let empty = MultiPolygon::<f64>::new(vec![]);
    let mut repaired = MultiPolygon::<f64>::new(vec![]);

    for polygon in &geometry.0 {
        let single = MultiPolygon::new(vec![polygon.clone()]);
        let cleaned = guarded("repair", || single.union(&empty))?;
        if area(&cleaned) <= 0.0 {
            continue;
        }
        repaired = if repaired.0.is_empty() {
            cleaned
        } else {
            guarded("repair", || repaired.union(&cleaned))?
        };
    }

    if !is_finite(&repaired) {
        return Err(OverlayError::NonFinite { operation: "repair" });
    }

    repaired.0.retain(|polygon| polygon.unsigned_area() > 0.0);
    Ok(repaired)
}

/// Whether every coordinate is finite.
#[must_use]
pub fn is_finite(geometry: &MultiPolygon<f64>) -> bool {
    geometry
        .coords_iter()
        .all(|c| c.x.is_finite() && c.y.is_finite())
}

fn guarded<T>(operation: &'static str, op: impl FnOnce() -> T) -> Result<T, OverlayError> {
    catch_unwind(AssertUnwindSafe(op)).map_err(|_| {
        log::error!("Geometry library panicked during {operation}");
        OverlayError::Panicked { operation }
    })
}

fn check_area_bound(
    operation: &'static str,
    result: &MultiPolygon<f64>,
    bound: f64,
) -> Result<(), OverlayError> {
    if !is_finite(result) {
        return Err(OverlayError::NonFinite { operation });
    }
    let produced = area(result);
    if produced > bound.mul_add(AREA_BOUND_TOLERANCE, bound) + f64::EPSILON {
        return Err(OverlayError::AreaInflation {
            operation,
            produced,
            bound,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use geo::{Coord, LineString, Polygon, line_string, polygon};

    use super::*;

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
        ]])
    }

    #[test]
    fn intersection_and_difference_partition_the_input() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(8.0, 0.0, 10.0);

        let inside = intersection(&a, &b).unwrap();
        let outside = difference(&a, &b).unwrap();

        assert!((area(&inside) - 20.0).abs() < 1e-9);
        assert!((area(&outside) - 80.0).abs() < 1e-9);
        assert!((area(&union(&a, &b).unwrap()) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn repair_splits_bowtie() {
        let bowtie = MultiPolygon::new(vec![Polygon::new(
            LineString::from(vec![
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 2.0, y: 2.0 },
                Coord { x: 2.0, y: 0.0 },
                Coord { x: 0.0, y: 2.0 },
                Coord { x: 0.0, y: 0.0 },
            ]),
            vec![],
        )]);

        let repaired = repair(&bowtie).unwrap();
        assert!((area(&repaired) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn repair_merges_overlapping_parts() {
        let mut overlapping = square(0.0, 0.0, 10.0);
        overlapping.0.extend(square(5.0, 0.0, 10.0).0);

        let repaired = repair(&overlapping).unwrap();
        assert!((area(&repaired) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn repair_drops_zero_area_rings() {
        let flat = MultiPolygon::new(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 10.0, y: 0.0),
        ]]);
        assert!(repair(&flat).unwrap().0.is_empty());
    }

    #[test]
    fn repair_rejects_non_finite() {
        let broken = square(f64::NAN, 0.0, 1.0);
        assert_eq!(
            repair(&broken),
            Err(OverlayError::NonFinite { operation: "repair" })
        );
    }

    #[test]
    fn clips_lines_to_polygon() {
        let lines = MultiLineString::new(vec![line_string![(x: -5.0, y: 5.0), (x: 15.0, y: 5.0)]]);
        let inside = clip_lines(&square(0.0, 0.0, 10.0), &lines).unwrap();
        assert!((line_length(&inside) - 10.0).abs() < 1e-9);
        assert!((line_length(&lines) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn envelope_overlap() {
        let a = envelope(&square(0.0, 0.0, 1.0)).unwrap();
        let b = envelope(&square(1.0, 1.0, 1.0)).unwrap();
        let c = envelope(&square(3.0, 3.0, 1.0)).unwrap();
        assert!(envelopes_intersect(&a, &b));
        assert!(!envelopes_intersect(&a, &c));
    }
}
