#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical activity data model for the treatment map.
//!
//! Every agency adapter produces [`RawActivityRecord`] values. The
//! normalizer turns them into [`Activity`] records grouped in an
//! [`ActivityCollection`] of a single [`GeometryKind`], which is what the
//! enrichment and aggregation stages consume.

pub mod diagnostics;
pub mod window;

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use geo::{Geometry, MultiLineString, MultiPoint, MultiPolygon};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

pub use diagnostics::{Diagnostic, Diagnostics};
pub use window::{ConfigurationError, YearWindow};

/// Square meters per international acre.
pub const SQ_METERS_PER_ACRE: f64 = 4_046.856_422_4;

/// Converts a planar area in square meters to acres.
#[must_use]
pub const fn acres(square_meters: f64) -> f64 {
    square_meters / SQ_METERS_PER_ACRE
}

/// Agency that reported an activity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Agency {
    /// USDA Forest Service
    Usfs,
    /// Bureau of Land Management
    Blm,
    /// National Park Service
    Nps,
    /// National Fire Plan Operations and Reporting System (DOI bureaus)
    Nfpors,
    /// Interagency Fuels Treatment Planning and Reporting System (CAL FIRE)
    Ifprs,
    /// California Natural Resources Agency
    Cnra,
    /// Prescribed Fire Information Reporting System (CalEPA air districts)
    Pfirs,
    /// California State Transportation Agency
    Caltrans,
    /// Industrial timberland owners, spatial harvest records
    TimberIndustry,
    /// Industrial timberland owners, reported without geometry
    TimberNonspatial,
}

impl Agency {
    /// Returns the kind of entity that administers this agency's work.
    #[must_use]
    pub const fn entity_type(self) -> EntityType {
        match self {
            Self::Usfs | Self::Blm | Self::Nps | Self::Nfpors => EntityType::Federal,
            Self::Ifprs | Self::Cnra | Self::Pfirs | Self::Caltrans => EntityType::State,
            Self::TimberIndustry | Self::TimberNonspatial => EntityType::TimberCompanies,
        }
    }
}

/// Administrative level of the entity that performed a treatment.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum EntityType {
    /// State of California departments and boards.
    State,
    /// Federal land management agencies.
    Federal,
    /// Private industrial timberland owners.
    #[strum(serialize = "Timber Companies")]
    #[serde(rename = "Timber Companies")]
    TimberCompanies,
}

/// Geometry type shared by every activity in a collection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GeometryKind {
    /// Areal treatments.
    Polygon,
    /// Linear treatments (roadside clearing, fuel breaks).
    Line,
    /// Point-located treatments with a reported acreage.
    Point,
}

impl GeometryKind {
    /// Classifies a raw geometry, returning `None` for types that cannot
    /// represent a treatment (collections, bare lines, triangles, ...).
    #[must_use]
    pub const fn of(geometry: &Geometry<f64>) -> Option<Self> {
        match geometry {
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) => {
                Some(Self::Polygon)
            }
            Geometry::LineString(_) | Geometry::MultiLineString(_) => Some(Self::Line),
            Geometry::Point(_) | Geometry::MultiPoint(_) => Some(Self::Point),
            Geometry::Line(_) | Geometry::Triangle(_) | Geometry::GeometryCollection(_) => None,
        }
    }
}

/// Run-scoped activity identifier.
///
/// Assigned by the normalizer in arrival order and never reused within a
/// run. Agency-provided keys are not unique across sources, so they are
/// kept separately as [`Activity::source_key`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActivityId(pub u64);

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A record as handed over by an agency adapter, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawActivityRecord {
    /// Agency-provided treatment key, if any.
    pub source_key: Option<String>,
    /// Reporting agency.
    pub agency: Agency,
    /// Geometry in the projected planar CRS shared by the whole run.
    pub geometry: Geometry<f64>,
    /// Date the treatment started.
    pub start_date: NaiveDate,
    /// Date the treatment ended. `None` for point-in-time treatments.
    pub end_date: Option<NaiveDate>,
    /// Reported treated area in planar square units. Optional for polygon
    /// sources, where it can be derived from the geometry.
    pub treated_area: Option<f64>,
}

/// A validated activity geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityGeometry {
    /// Repaired, positive-area polygons.
    Polygon(MultiPolygon<f64>),
    /// Non-empty line work.
    Line(MultiLineString<f64>),
    /// Non-empty point set.
    Point(MultiPoint<f64>),
}

impl ActivityGeometry {
    /// Returns the kind of this geometry.
    #[must_use]
    pub const fn kind(&self) -> GeometryKind {
        match self {
            Self::Polygon(_) => GeometryKind::Polygon,
            Self::Line(_) => GeometryKind::Line,
            Self::Point(_) => GeometryKind::Point,
        }
    }
}

/// Federal and state fiscal years of an activity's end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalYears {
    /// Federal fiscal year (begins October 1).
    pub federal: i32,
    /// California state fiscal year (begins July 1).
    pub state: i32,
}

impl FiscalYears {
    /// Computes both fiscal years for a date.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        let year = date.year();
        let federal = if date.month() >= 10 { year + 1 } else { year };
        let state = if date.month() >= 7 { year + 1 } else { year };
        Self { federal, state }
    }
}

/// Reference layers an activity is attributed against.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceLayerKind {
    /// Broad vegetation type.
    Vegetation,
    /// Primary ownership group.
    Ownership,
    /// County name.
    County,
    /// Wildfire and Forest Resilience Task Force region.
    Region,
    /// Wildland-urban interface class.
    Wui,
}

/// Attribute values assigned by enrichment, one slot per layer.
///
/// A `None` value means the activity had no coverage in that layer; it is
/// never replaced by a default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceAttributes(BTreeMap<ReferenceLayerKind, Option<String>>);

impl ReferenceAttributes {
    /// Records the outcome of one layer's join.
    pub fn set(&mut self, kind: ReferenceLayerKind, value: Option<String>) {
        self.0.insert(kind, value);
    }

    /// Returns the value assigned for a layer, if any.
    #[must_use]
    pub fn get(&self, kind: ReferenceLayerKind) -> Option<&str> {
        self.0.get(&kind).and_then(Option::as_deref)
    }

    /// Iterates over every layer that was joined, including null results.
    pub fn iter(&self) -> impl Iterator<Item = (ReferenceLayerKind, Option<&str>)> {
        self.0.iter().map(|(kind, value)| (*kind, value.as_deref()))
    }
}

/// One normalized treatment record.
#[derive(Debug, Clone, PartialEq)]
pub struct Activity {
    /// Run-scoped identifier.
    pub id: ActivityId,
    /// Agency-provided key, kept for traceability only.
    pub source_key: Option<String>,
    /// Reporting agency.
    pub agency: Agency,
    /// Validated geometry.
    pub geometry: ActivityGeometry,
    /// First calendar year the treatment is active.
    pub start_year: i32,
    /// Last calendar year the treatment is active (inclusive).
    pub end_year: i32,
    /// Fiscal years of the treatment's end date.
    pub fiscal_years: FiscalYears,
    /// Treated area in planar square units.
    pub treated_area: f64,
    /// Enrichment output; `None` until the attributor has run.
    pub reference_attrs: Option<ReferenceAttributes>,
}

impl Activity {
    /// Whether the activity's year span intersects the window.
    #[must_use]
    pub const fn is_active_in(&self, window: YearWindow) -> bool {
        self.start_year <= window.end() && self.end_year >= window.start()
    }

    /// Years of the activity's span that fall inside the window.
    pub fn years_within(&self, window: YearWindow) -> impl Iterator<Item = i32> {
        self.start_year.max(window.start())..=self.end_year.min(window.end())
    }
}

/// Why an activity could not join a collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectionError {
    /// The activity's geometry kind differs from the collection's.
    #[error("Expected {expected} activity, found {found}")]
    KindMismatch {
        /// Kind of the collection.
        expected: GeometryKind,
        /// Kind of the rejected activity.
        found: GeometryKind,
    },

    /// The activity's id does not follow the last member's.
    #[error("Activity {id} does not follow activity {last}")]
    OutOfOrder {
        /// Rejected id.
        id: ActivityId,
        /// Id of the current last member.
        last: ActivityId,
    },
}

/// The parts of one activity the attributor may touch.
#[derive(Debug)]
pub struct EnrichmentSlot<'a> {
    /// Activity being attributed.
    pub id: ActivityId,
    /// Its geometry, read-only.
    pub geometry: &'a ActivityGeometry,
    /// Where the attributes go.
    pub reference_attrs: &'a mut Option<ReferenceAttributes>,
}

/// Activities that share one geometry kind, kept in strictly increasing id
/// order.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityCollection {
    kind: GeometryKind,
    activities: Vec<Activity>,
}

impl ActivityCollection {
    /// Creates an empty collection for a geometry kind.
    #[must_use]
    pub const fn new(kind: GeometryKind) -> Self {
        Self {
            kind,
            activities: Vec::new(),
        }
    }

    /// Appends an activity.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError`] if the activity's kind differs from the
    /// collection's or its id is not above every member's. The collection
    /// is unchanged in that case.
    pub fn push(&mut self, activity: Activity) -> Result<(), CollectionError> {
        let found = activity.geometry.kind();
        if found != self.kind {
            return Err(CollectionError::KindMismatch {
                expected: self.kind,
                found,
            });
        }
        if let Some(last) = self.activities.last()
            && activity.id <= last.id
        {
            return Err(CollectionError::OutOfOrder {
                id: activity.id,
                last: last.id,
            });
        }
        self.activities.push(activity);
        Ok(())
    }

    /// Geometry kind of every member.
    #[must_use]
    pub const fn kind(&self) -> GeometryKind {
        self.kind
    }

    /// Members in id order.
    #[must_use]
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    /// Mutable access to each member's reference attributes, in id order.
    /// Nothing else about a member can change through a slot.
    pub fn enrichment_slots(&mut self) -> Vec<EnrichmentSlot<'_>> {
        self.activities
            .iter_mut()
            .map(|activity| EnrichmentSlot {
                id: activity.id,
                geometry: &activity.geometry,
                reference_attrs: &mut activity.reference_attrs,
            })
            .collect()
    }

    /// Looks up an activity by id.
    #[must_use]
    pub fn get(&self, id: ActivityId) -> Option<&Activity> {
        self.activities
            .binary_search_by_key(&id, |a| a.id)
            .ok()
            .map(|idx| &self.activities[idx])
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.activities.len()
    }

    /// Whether the collection has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.activities.is_empty()
    }
}
