//! Turns adapter output into validated [`Activity`] records.
//!
//! The normalizer is the only place that assigns [`ActivityId`]s. It owns a
//! run-scoped counter, so activities from every source and geometry kind
//! share one id space.

use chrono::Datelike;
use geo::{Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon};
use treatment_map_activity_models::{
    Activity, ActivityCollection, ActivityGeometry, ActivityId, CollectionError, Diagnostic,
    Diagnostics, FiscalYears, GeometryKind, RawActivityRecord,
};
use treatment_map_spatial::overlay;

/// Why a raw record was rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// The geometry type cannot represent a treatment.
    #[error("Unsupported geometry type {type_name}")]
    UnsupportedType {
        /// Name of the rejected type.
        type_name: &'static str,
    },

    /// The geometry kind differs from the collection's kind.
    #[error("Expected {expected} geometry, found {found}")]
    KindMismatch {
        /// Kind of the target collection.
        expected: GeometryKind,
        /// Kind of the record.
        found: GeometryKind,
    },

    /// The geometry has no coordinates.
    #[error("Empty geometry")]
    Empty,

    /// The geometry contains NaN or infinite coordinates.
    #[error("Geometry has non-finite coordinates")]
    NonFinite,

    /// Validity repair failed inside the overlay engine.
    #[error("Geometry could not be repaired: {reason}")]
    Unrepairable {
        /// Underlying overlay error.
        reason: String,
    },

    /// The polygon has no area, before or after repair.
    #[error("Polygon has no area after repair")]
    ZeroArea,

    /// The end date precedes the start date.
    #[error("End date {end} precedes start date {start}")]
    InvertedDates {
        /// Reported start date.
        start: chrono::NaiveDate,
        /// Reported end date.
        end: chrono::NaiveDate,
    },

    /// The reported area is negative or not a number.
    #[error("Invalid treated area {value}")]
    InvalidArea {
        /// Reported value.
        value: f64,
    },

    /// A line or point record without a reported area.
    #[error("{kind} records must report a treated area")]
    MissingTreatedArea {
        /// Kind of the record.
        kind: GeometryKind,
    },

    /// The target collection refused the activity.
    #[error(transparent)]
    Collection(#[from] CollectionError),
}

/// Run-scoped normalizer.
#[derive(Debug, Default)]
pub struct ActivityNormalizer {
    next_id: u64,
}

impl ActivityNormalizer {
    /// Creates a normalizer whose first id is `0`.
    #[must_use]
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Number of activities accepted so far.
    #[must_use]
    pub const fn accepted(&self) -> u64 {
        self.next_id
    }

    /// Validates and repairs one record, assigning it the next id.
    ///
    /// Ids are consumed only by records that normalize successfully.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the record cannot become a well-formed
    /// activity of kind `expected`.
    pub fn normalize(
        &mut self,
        record: &RawActivityRecord,
        expected: GeometryKind,
    ) -> Result<Activity, GeometryError> {
        let geometry = normalize_geometry(&record.geometry, expected)?;

        let end_date = record.end_date.unwrap_or(record.start_date);
        if end_date < record.start_date {
            return Err(GeometryError::InvertedDates {
                start: record.start_date,
                end: end_date,
            });
        }

        let treated_area = match (record.treated_area, &geometry) {
            (Some(value), _) if !value.is_finite() || value < 0.0 => {
                return Err(GeometryError::InvalidArea { value });
            }
            (Some(value), _) => value,
            (None, ActivityGeometry::Polygon(polygons)) => overlay::area(polygons),
            (None, other) => {
                return Err(GeometryError::MissingTreatedArea { kind: other.kind() });
            }
        };

        let id = ActivityId(self.next_id);
        self.next_id += 1;

        Ok(Activity {
            id,
            source_key: record.source_key.clone(),
            agency: record.agency,
            geometry,
            start_year: record.start_date.year(),
            end_year: end_date.year(),
            fiscal_years: FiscalYears::of(end_date),
            treated_area,
            reference_attrs: None,
        })
    }

    /// Normalizes a batch into `collection`, recording a diagnostic for
    /// every dropped record.
    ///
    /// Returns the number of records accepted.
    pub fn normalize_into(
        &mut self,
        records: &[RawActivityRecord],
        collection: &mut ActivityCollection,
        diagnostics: &mut Diagnostics,
    ) -> usize {
        let mut accepted = 0;

        for record in records {
            let result = self
                .normalize(record, collection.kind())
                .and_then(|activity| collection.push(activity).map_err(GeometryError::from));

            match result {
                Ok(()) => accepted += 1,
                Err(e) => {
                    log::warn!(
                        "Dropping {} record {}: {e}",
                        record.agency,
                        record.source_key.as_deref().unwrap_or("<no key>")
                    );
                    diagnostics.push(Diagnostic::GeometryError {
                        agency: record.agency,
                        source_key: record.source_key.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Normalized {accepted}/{} {} records",
            records.len(),
            collection.kind()
        );

        accepted
    }

    /// Normalizes a batch into a fresh collection of `kind`.
    #[must_use]
    pub fn normalize_batch(
        &mut self,
        records: &[RawActivityRecord],
        kind: GeometryKind,
    ) -> (ActivityCollection, Diagnostics) {
        let mut collection = ActivityCollection::new(kind);
        let mut diagnostics = Diagnostics::new();
        self.normalize_into(records, &mut collection, &mut diagnostics);
        (collection, diagnostics)
    }
}

fn normalize_geometry(
    geometry: &Geometry<f64>,
    expected: GeometryKind,
) -> Result<ActivityGeometry, GeometryError> {
    let Some(found) = GeometryKind::of(geometry) else {
        return Err(GeometryError::UnsupportedType {
            type_name: geometry_type_name(geometry),
        });
    };
    if found != expected {
        return Err(GeometryError::KindMismatch { expected, found });
    }

    match geometry {
        Geometry::Polygon(polygon) => repair_polygons(&MultiPolygon::new(vec![polygon.clone()])),
        Geometry::Rect(rect) => repair_polygons(&MultiPolygon::new(vec![rect.to_polygon()])),
        Geometry::MultiPolygon(polygons) => repair_polygons(polygons),
        Geometry::LineString(line) => clean_lines(MultiLineString::new(vec![line.clone()])),
        Geometry::MultiLineString(lines) => clean_lines(lines.clone()),
        Geometry::Point(point) => clean_points(MultiPoint::new(vec![*point])),
        Geometry::MultiPoint(points) => clean_points(points.clone()),
        Geometry::Line(_) | Geometry::Triangle(_) | Geometry::GeometryCollection(_) => {
            Err(GeometryError::UnsupportedType {
                type_name: geometry_type_name(geometry),
            })
        }
    }
}

fn repair_polygons(polygons: &MultiPolygon<f64>) -> Result<ActivityGeometry, GeometryError> {
    if polygons.0.iter().all(|p| p.exterior().0.is_empty()) {
        return Err(GeometryError::Empty);
    }
    if !overlay::is_finite(polygons) {
        return Err(GeometryError::NonFinite);
    }

    let repaired = overlay::repair(polygons).map_err(|e| GeometryError::Unrepairable {
        reason: e.to_string(),
    })?;

    if repaired.0.is_empty() || overlay::area(&repaired) <= 0.0 {
        return Err(GeometryError::ZeroArea);
    }

    Ok(ActivityGeometry::Polygon(repaired))
}

fn clean_lines(mut lines: MultiLineString<f64>) -> Result<ActivityGeometry, GeometryError> {
    if lines
        .0
        .iter()
        .flat_map(|line| line.0.iter())
        .any(|c| !c.x.is_finite() || !c.y.is_finite())
    {
        return Err(GeometryError::NonFinite);
    }

    lines.0.retain(|line: &LineString<f64>| line.0.len() >= 2);
    if lines.0.is_empty() || overlay::line_length(&lines) <= 0.0 {
        return Err(GeometryError::Empty);
    }

    Ok(ActivityGeometry::Line(lines))
}

fn clean_points(points: MultiPoint<f64>) -> Result<ActivityGeometry, GeometryError> {
    if points.0.is_empty() {
        return Err(GeometryError::Empty);
    }
    if points.0.iter().any(|p| !p.x().is_finite() || !p.y().is_finite()) {
        return Err(GeometryError::NonFinite);
    }
    Ok(ActivityGeometry::Point(points))
}

const fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
