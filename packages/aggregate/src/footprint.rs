//! Deduplicated footprint arrangement.
//!
//! [`FootprintAccumulator`] maintains a set of pairwise-disjoint regions,
//! each tagged with the activities that cover it. Adding an activity splits
//! every region it overlaps into the part it covers and the part it does
//! not, then appends whatever ground no region covered yet. Re-treated
//! ground therefore lives in exactly one region no matter how many
//! activities touch it.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use geo::{Intersects, MultiPolygon, Rect};
use treatment_map_activity_models::{
    Activity, ActivityCollection, ActivityGeometry, ActivityId, GeometryKind, YearWindow,
};
use treatment_map_spatial::buffer;
use treatment_map_spatial::overlay::{self, OverlayError};

use crate::WindowError;

/// Default sliver tolerance, relative to the area of the activity being
/// added.
pub const DEFAULT_SLIVER_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone)]
struct Region {
    geometry: MultiPolygon<f64>,
    envelope: Option<Rect<f64>>,
    area: f64,
    members: BTreeSet<ActivityId>,
}

impl Region {
    fn new(geometry: MultiPolygon<f64>, members: BTreeSet<ActivityId>) -> Self {
        Self {
            envelope: overlay::envelope(&geometry),
            area: overlay::area(&geometry),
            geometry,
            members,
        }
    }

    fn touches(&self, envelope: &Rect<f64>) -> bool {
        self.envelope
            .as_ref()
            .is_some_and(|own| overlay::envelopes_intersect(own, envelope))
    }

    /// Shares at least a boundary point with `sliver`.
    fn borders(&self, sliver: &MultiPolygon<f64>, sliver_envelope: &Rect<f64>) -> bool {
        self.touches(sliver_envelope) && self.geometry.intersects(sliver)
    }
}

/// Where a leftover sliver gets merged.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Existing(usize),
    Piece(usize, usize),
}

/// Arena of disjoint footprint regions.
#[derive(Debug, Clone)]
pub struct FootprintAccumulator {
    regions: Vec<Region>,
    sliver_tolerance: f64,
}

impl Default for FootprintAccumulator {
    fn default() -> Self {
        Self::new(DEFAULT_SLIVER_TOLERANCE)
    }
}

impl FootprintAccumulator {
    /// Creates an empty arrangement.
    #[must_use]
    pub const fn new(sliver_tolerance: f64) -> Self {
        Self {
            regions: Vec::new(),
            sliver_tolerance,
        }
    }

    /// Number of regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no region exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of region areas.
    #[must_use]
    pub fn total_area(&self) -> f64 {
        self.regions.iter().map(|r| r.area).sum()
    }

    /// Inserts one activity's footprint.
    ///
    /// Returns `false` when the footprint has no area and nothing changed.
    /// All overlay work is staged first; the arrangement is only modified
    /// once every operation has succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`OverlayError`] if the footprint is non-finite or any
    /// overlay step is degenerate. The arrangement is unchanged.
    pub fn add(&mut self, id: ActivityId, footprint: &MultiPolygon<f64>) -> Result<bool, OverlayError> {
        if !overlay::is_finite(footprint) {
            return Err(OverlayError::NonFinite {
                operation: "footprint",
            });
        }
        let footprint_area = overlay::area(footprint);
        let Some(footprint_envelope) = overlay::envelope(footprint) else {
            return Ok(false);
        };
        if footprint_area <= 0.0 {
            return Ok(false);
        }

        let threshold = self.sliver_tolerance * footprint_area;
        let mut replacements: BTreeMap<usize, Vec<Region>> = BTreeMap::new();
        let mut remainder = footprint.clone();

        for (idx, region) in self.regions.iter().enumerate() {
            if !region.touches(&footprint_envelope) {
                continue;
            }

            let inside = overlay::intersection(&region.geometry, footprint)?;
            let inside_area = overlay::area(&inside);
            if inside_area <= 0.0 {
                continue;
            }
            remainder = overlay::difference(&remainder, &region.geometry)?;
            if inside_area <= threshold {
                log::debug!("Activity {id}: ignoring {inside_area} sliver inside region {idx}");
                continue;
            }

            let mut members = region.members.clone();
            members.insert(id);

            let outside = overlay::difference(&region.geometry, footprint)?;
            let outside_area = overlay::area(&outside);

            let pieces = if outside_area <= threshold {
                if outside_area > 0.0 {
                    log::debug!(
                        "Activity {id}: absorbing {outside_area} sliver outside region {idx}"
                    );
                }
                vec![Region::new(region.geometry.clone(), members)]
            } else {
                vec![
                    Region::new(outside, region.members.clone()),
                    Region::new(inside, members),
                ]
            };
            replacements.insert(idx, pieces);
        }

        let leftover_area = overlay::area(&remainder);
        let mut singleton = None;

        if leftover_area > threshold {
            singleton = Some(Region::new(remainder, BTreeSet::from([id])));
        } else if leftover_area > 0.0 {
            self.merge_sliver(id, remainder, &mut replacements)?;
        }

        let previous = std::mem::take(&mut self.regions);
        for (idx, region) in previous.into_iter().enumerate() {
            match replacements.remove(&idx) {
                Some(pieces) => self.regions.extend(pieces),
                None => self.regions.push(region),
            }
        }
        self.regions.extend(singleton);

        Ok(true)
    }

    /// Unions a leftover sliver into the largest staged region it actually
    /// borders, staging the result in `replacements`.
    fn merge_sliver(
        &self,
        id: ActivityId,
        sliver: MultiPolygon<f64>,
        replacements: &mut BTreeMap<usize, Vec<Region>>,
    ) -> Result<(), OverlayError> {
        let Some(sliver_envelope) = overlay::envelope(&sliver) else {
            return Ok(());
        };

        let mut best: Option<(Slot, f64)> = None;
        for (idx, region) in self.regions.iter().enumerate() {
            if let Some(pieces) = replacements.get(&idx) {
                for (piece_idx, piece) in pieces.iter().enumerate() {
                    if best.is_none_or(|(_, a)| piece.area > a)
                        && piece.borders(&sliver, &sliver_envelope)
                    {
                        best = Some((Slot::Piece(idx, piece_idx), piece.area));
                    }
                }
            } else if best.is_none_or(|(_, a)| region.area > a)
                && region.borders(&sliver, &sliver_envelope)
            {
                best = Some((Slot::Existing(idx), region.area));
            }
        }

        match best {
            None => {
                log::debug!(
                    "Activity {id}: dropping {} leftover sliver with no neighbour",
                    overlay::area(&sliver)
                );
            }
            Some((Slot::Existing(idx), _)) => {
                let region = &self.regions[idx];
                let merged = overlay::union(&region.geometry, &sliver)?;
                replacements.insert(idx, vec![Region::new(merged, region.members.clone())]);
                log::debug!("Activity {id}: merged leftover sliver into region {idx}");
            }
            Some((Slot::Piece(idx, piece_idx), _)) => {
                if let Some(piece) = replacements
                    .get_mut(&idx)
                    .and_then(|pieces| pieces.get_mut(piece_idx))
                {
                    let merged = overlay::union(&piece.geometry, &sliver)?;
                    *piece = Region::new(merged, std::mem::take(&mut piece.members));
                    log::debug!("Activity {id}: merged leftover sliver into split region {idx}");
                }
            }
        }

        Ok(())
    }

    /// Labels the regions with the activities of `collection` and returns
    /// the finished partition.
    ///
    /// # Errors
    ///
    /// Returns [`WindowError::UnknownActivity`] if a region names an
    /// activity that `collection` does not hold.
    pub fn finish(
        self,
        collection: &ActivityCollection,
        window: YearWindow,
    ) -> Result<FootprintResult, WindowError> {
        let kind = collection.kind();
        let mut regions = Vec::with_capacity(self.regions.len());

        for region in self.regions {
            let members = region
                .members
                .iter()
                .map(|id| {
                    collection
                        .get(*id)
                        .ok_or(WindowError::UnknownActivity { window, kind, id: *id })
                })
                .collect::<Result<Vec<&Activity>, _>>()?;
            let Some(primary) = primary_activity(&members) else {
                continue;
            };
            let years_active = members
                .iter()
                .flat_map(|activity| activity.years_within(window))
                .collect();

            regions.push(FootprintRegion {
                primary_activity_id: primary.id,
                geometry: region.geometry,
                area: region.area,
                contributing_activity_ids: region.members,
                years_active,
            });
        }

        Ok(FootprintResult {
            window,
            kind,
            total_footprint_area: regions.iter().map(|r| r.area).sum(),
            regions,
        })
    }
}

/// Largest treated area wins; ties go to the lowest id.
fn primary_activity<'a>(members: &[&'a Activity]) -> Option<&'a Activity> {
    members.iter().copied().reduce(|best, candidate| {
        match candidate.treated_area.total_cmp(&best.treated_area) {
            Ordering::Greater => candidate,
            Ordering::Equal if candidate.id < best.id => candidate,
            _ => best,
        }
    })
}

/// Polygon footprint of an activity: its own geometry for polygons, a
/// corridor or disc of the reported area for lines and points.
///
/// # Errors
///
/// Returns [`OverlayError`] if building the buffer fails.
pub fn activity_footprint(activity: &Activity) -> Result<MultiPolygon<f64>, OverlayError> {
    match &activity.geometry {
        ActivityGeometry::Polygon(polygons) => Ok(polygons.clone()),
        ActivityGeometry::Line(lines) => buffer::line_footprint(lines, activity.treated_area),
        ActivityGeometry::Point(points) => buffer::point_footprint(points, activity.treated_area),
    }
}

/// One cell of the footprint partition.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintRegion {
    /// Region geometry, disjoint from every other region's.
    pub geometry: MultiPolygon<f64>,
    /// Planar area of `geometry`.
    pub area: f64,
    /// Activities covering this region.
    pub contributing_activity_ids: BTreeSet<ActivityId>,
    /// Union of the members' active years, clipped to the window.
    pub years_active: BTreeSet<i32>,
    /// Member with the largest treated area (ties: lowest id).
    pub primary_activity_id: ActivityId,
}

impl FootprintRegion {
    /// Number of distinct activities covering the region.
    #[must_use]
    pub fn treatment_count(&self) -> usize {
        self.contributing_activity_ids.len()
    }
}

/// Finished partition for one window and geometry kind.
#[derive(Debug, Clone, PartialEq)]
pub struct FootprintResult {
    /// Window the activities were selected for.
    pub window: YearWindow,
    /// Geometry kind of the reduction.
    pub kind: GeometryKind,
    /// Regions in creation order.
    pub regions: Vec<FootprintRegion>,
    /// Sum of region areas.
    pub total_footprint_area: f64,
}
