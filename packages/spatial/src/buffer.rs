//! Footprint polygons for point and line treatments.
//!
//! Point and line records carry a reported acreage rather than an areal
//! geometry. Before they can take part in a footprint overlay they are
//! expanded to polygons whose area matches what was reported: points become
//! discs, lines become corridors of constant width with flat ends.

use std::f64::consts::TAU;

use geo::{Coord, LineString, MultiLineString, MultiPoint, MultiPolygon, Polygon};

use crate::overlay::{self, OverlayError};

/// Vertices used to approximate a disc.
pub const DISC_SEGMENTS: usize = 64;

/// A regular polygon centred on `center` whose area is exactly `area`.
#[must_use]
pub fn disc(center: Coord<f64>, area: f64, segments: usize) -> Polygon<f64> {
    let segments = segments.max(3);
    #[allow(clippy::cast_precision_loss)]
    let n = segments as f64;
    // Area of a regular n-gon with circumradius r is n/2 * r^2 * sin(2pi/n).
    let radius = (2.0 * area / (n * (TAU / n).sin())).sqrt();

    let ring: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let angle = TAU * i as f64 / n;
            Coord {
                x: radius.mul_add(angle.cos(), center.x),
                y: radius.mul_add(angle.sin(), center.y),
            }
        })
        .collect();

    Polygon::new(LineString::from(ring), vec![])
}

/// Expands points to discs sharing `treated_area` equally.
///
/// # Errors
///
/// Returns [`OverlayError`] if unioning overlapping discs fails.
pub fn point_footprint(
    points: &MultiPoint<f64>,
    treated_area: f64,
) -> Result<MultiPolygon<f64>, OverlayError> {
    if points.0.is_empty() || treated_area <= 0.0 {
        return Ok(MultiPolygon::new(vec![]));
    }

    #[allow(clippy::cast_precision_loss)]
    let share = treated_area / points.0.len() as f64;
    let discs = points
        .0
        .iter()
        .map(|point| disc(point.0, share, DISC_SEGMENTS));

    union_all(discs)
}

/// Expands lines to a flat-capped corridor whose area approximates
/// `treated_area`: the corridor width is `treated_area / length`, with
/// round joins at interior vertices.
///
/// # Errors
///
/// Returns [`OverlayError`] if unioning the corridor pieces fails.
pub fn line_footprint(
    lines: &MultiLineString<f64>,
    treated_area: f64,
) -> Result<MultiPolygon<f64>, OverlayError> {
    let length = overlay::line_length(lines);
    if length <= 0.0 || treated_area <= 0.0 {
        return Ok(MultiPolygon::new(vec![]));
    }

    let half_width = treated_area / length / 2.0;
    let joint_area = std::f64::consts::PI * half_width * half_width;
    let mut pieces = Vec::new();

    for line_string in &lines.0 {
        for segment in line_string.lines() {
            let dx = segment.dx();
            let dy = segment.dy();
            let segment_length = dx.hypot(dy);
            if segment_length <= 0.0 {
                continue;
            }
            let nx = -dy / segment_length * half_width;
            let ny = dx / segment_length * half_width;
            let (a, b) = (segment.start, segment.end);

            pieces.push(Polygon::new(
                LineString::from(vec![
                    Coord { x: a.x + nx, y: a.y + ny },
                    Coord { x: b.x + nx, y: b.y + ny },
                    Coord { x: b.x - nx, y: b.y - ny },
                    Coord { x: a.x - nx, y: a.y - ny },
                ]),
                vec![],
            ));
        }

        let coords = &line_string.0;
        if coords.len() > 2 {
            for joint in &coords[1..coords.len() - 1] {
                pieces.push(disc(*joint, joint_area, DISC_SEGMENTS / 4));
            }
        }
    }

    union_all(pieces.into_iter())
}

fn union_all(
    polygons: impl Iterator<Item = Polygon<f64>>,
) -> Result<MultiPolygon<f64>, OverlayError> {
    let mut merged = MultiPolygon::new(vec![]);
    for polygon in polygons {
        let piece = MultiPolygon::new(vec![polygon]);
        merged = if merged.0.is_empty() {
            piece
        } else {
            overlay::union(&merged, &piece)?
        };
    }
    Ok(merged)
}
