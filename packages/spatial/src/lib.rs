#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory reference layers and planar overlay for activity attribution.
//!
//! Loads vegetation, ownership, county, region, and WUI polygons once per
//! run, builds an R-tree per layer, and exposes the guarded overlay
//! primitives used by both enrichment and footprint aggregation.

pub mod attribute;
pub mod buffer;
pub mod overlay;

use std::collections::BTreeMap;

use geo::MultiPolygon;
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use treatment_map_activity_models::ReferenceLayerKind;

/// Errors that can occur while loading a reference layer.
#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    /// The document is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The document parsed but is not a `FeatureCollection`.
    #[error("Reference layer {layer} must be a GeoJSON FeatureCollection")]
    NotFeatureCollection {
        /// Layer being loaded.
        layer: ReferenceLayerKind,
    },
}

/// One categorical reference polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceFeature {
    /// Stable identifier used to break attribution ties.
    pub id: u64,
    /// Category carried by the polygon.
    pub value: String,
    /// Polygon geometry in the run's planar CRS.
    pub geometry: MultiPolygon<f64>,
}

/// A reference polygon stored in the R-tree with its metadata.
pub(crate) struct ReferenceEntry {
    pub(crate) id: u64,
    pub(crate) value: String,
    envelope: AABB<[f64; 2]>,
    pub(crate) polygon: MultiPolygon<f64>,
}

impl RTreeObject for ReferenceEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// An immutable, spatially indexed reference layer.
///
/// Polygons within a layer are assumed not to overlap. The layer is never
/// mutated after construction, so it can be shared across threads freely.
pub struct ReferenceLayer {
    kind: ReferenceLayerKind,
    entries: RTree<ReferenceEntry>,
}

impl ReferenceLayer {
    /// Builds a layer from already-parsed features.
    ///
    /// Features with empty geometry are skipped.
    #[must_use]
    pub fn from_features(kind: ReferenceLayerKind, features: Vec<ReferenceFeature>) -> Self {
        let entries: Vec<ReferenceEntry> = features
            .into_iter()
            .filter_map(|feature| {
                let Some(envelope) = compute_envelope(&feature.geometry) else {
                    log::warn!("Skipping empty {kind} reference polygon {}", feature.id);
                    return None;
                };
                Some(ReferenceEntry {
                    id: feature.id,
                    value: feature.value,
                    envelope,
                    polygon: feature.geometry,
                })
            })
            .collect();

        let entries = RTree::bulk_load(entries);
        log::info!("Loaded {} {kind} polygons into spatial index", entries.size());

        Self { kind, entries }
    }

    /// Parses a `GeoJSON` `FeatureCollection`.
    ///
    /// The category is read from `value_field`. The polygon id comes from
    /// `id_field` when given and numeric. Features lacking it are numbered
    /// by position, offset past the largest explicit id so the two never
    /// collide. Features without a polygon geometry or without a value are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ReferenceError`] if the text is not a `GeoJSON`
    /// `FeatureCollection`.
    pub fn from_geojson(
        kind: ReferenceLayerKind,
        geojson_str: &str,
        value_field: &str,
        id_field: Option<&str>,
    ) -> Result<Self, ReferenceError> {
        let GeoJson::FeatureCollection(collection) = geojson_str.parse::<GeoJson>()? else {
            return Err(ReferenceError::NotFeatureCollection { layer: kind });
        };

        let explicit_ids: Vec<Option<u64>> = collection
            .features
            .iter()
            .map(|feature| {
                id_field
                    .and_then(|field| feature.property(field))
                    .and_then(serde_json::Value::as_u64)
            })
            .collect();
        let fallback_base = explicit_ids
            .iter()
            .flatten()
            .max()
            .map_or(0, |max| max.saturating_add(1));

        if let Some(field) = id_field {
            let missing = explicit_ids.iter().filter(|id| id.is_none()).count();
            if missing > 0 {
                log::warn!(
                    "{missing} {kind} features have no numeric {field}, numbering them from {fallback_base}"
                );
            }
        }

        let mut features = Vec::with_capacity(collection.features.len());

        for (index, (feature, explicit)) in collection
            .features
            .into_iter()
            .zip(explicit_ids)
            .enumerate()
        {
            let id = explicit.unwrap_or_else(|| fallback_base.saturating_add(index as u64));

            let Some(value) = feature
                .property(value_field)
                .and_then(serde_json::Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
            else {
                log::warn!("{kind} feature {id} has no {value_field} value");
                continue;
            };

            let Some(geometry) = feature.geometry.and_then(to_multipolygon) else {
                log::warn!("Failed to parse polygon geometry for {kind} feature {id}");
                continue;
            };

            features.push(ReferenceFeature {
                id,
                value,
                geometry,
            });
        }

        Ok(Self::from_features(kind, features))
    }

    /// Which layer this is.
    #[must_use]
    pub const fn kind(&self) -> ReferenceLayerKind {
        self.kind
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.size()
    }

    /// Whether the layer has no polygons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.size() == 0
    }

    /// Polygons whose bounding box intersects `rect`.
    pub(crate) fn candidates(
        &self,
        rect: geo::Rect<f64>,
    ) -> impl Iterator<Item = &ReferenceEntry> {
        let query = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        self.entries.locate_in_envelope_intersecting(&query)
    }
}

/// Every reference layer loaded for a run.
///
/// Built once at run start and passed explicitly to the enrichment and
/// aggregation stages.
#[derive(Default)]
pub struct ReferenceLayers {
    layers: BTreeMap<ReferenceLayerKind, ReferenceLayer>,
}

impl ReferenceLayers {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            layers: BTreeMap::new(),
        }
    }

    /// Adds a layer, replacing any previous layer of the same kind.
    pub fn insert(&mut self, layer: ReferenceLayer) {
        if let Some(previous) = self.layers.insert(layer.kind(), layer) {
            log::warn!("Replaced previously loaded {} layer", previous.kind());
        }
    }

    /// Looks up a layer by kind.
    #[must_use]
    pub fn get(&self, kind: ReferenceLayerKind) -> Option<&ReferenceLayer> {
        self.layers.get(&kind)
    }

    /// Iterates loaded layers in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (ReferenceLayerKind, &ReferenceLayer)> {
        self.layers.iter().map(|(kind, layer)| (*kind, layer))
    }

    /// Number of loaded layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no layers are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    use geo::BoundingRect;

    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNTIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"NAME": "Plumas", "OBJECTID": 17},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"NAME": "Sierra"},
                "geometry": {"type": "MultiPolygon", "coordinates": [[[[10,0],[20,0],[20,10],[10,10],[10,0]]]]}
            },
            {
                "type": "Feature",
                "properties": {"NAME": ""},
                "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}
            },
            {
                "type": "Feature",
                "properties": {"NAME": "Nowhere"},
                "geometry": {"type": "Point", "coordinates": [5, 5]}
            }
        ]
    }"#;

    #[test]
    fn loads_geojson_layer() {
        let layer =
            ReferenceLayer::from_geojson(ReferenceLayerKind::County, COUNTIES, "NAME", Some("OBJECTID"))
                .unwrap();
        assert_eq!(layer.kind(), ReferenceLayerKind::County);
        assert_eq!(layer.len(), 2);

        let mut ids: Vec<u64> = layer.entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        // Second feature has no OBJECTID and is numbered past the largest one.
        assert_eq!(ids, vec![17, 19]);
    }

    #[test]
    fn positional_ids_never_collide_with_explicit_ones() {
        let layer = ReferenceLayer::from_geojson(
            ReferenceLayerKind::Wui,
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "properties": {"WUI": "Interface", "OBJECTID": 1},
                        "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
                    },
                    {
                        "type": "Feature",
                        "properties": {"WUI": "Intermix"},
                        "geometry": {"type": "Polygon", "coordinates": [[[2,0],[3,0],[3,1],[2,1],[2,0]]]}
                    },
                    {
                        "type": "Feature",
                        "properties": {"WUI": "Interface", "OBJECTID": 2},
                        "geometry": {"type": "Polygon", "coordinates": [[[4,0],[5,0],[5,1],[4,1],[4,0]]]}
                    }
                ]
            }"#,
            "WUI",
            Some("OBJECTID"),
        )
        .unwrap();

        let mut ids: Vec<u64> = layer.entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn without_id_field_ids_are_positions() {
        let layer =
            ReferenceLayer::from_geojson(ReferenceLayerKind::County, COUNTIES, "NAME", None).unwrap();
        let mut ids: Vec<u64> = layer.entries.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn rejects_bare_geometry() {
        let result = ReferenceLayer::from_geojson(
            ReferenceLayerKind::Region,
            r#"{"type": "Point", "coordinates": [0, 0]}"#,
            "NAME",
            None,
        );
        assert!(matches!(
            result,
            Err(ReferenceError::NotFeatureCollection { .. })
        ));
    }

    #[test]
    fn candidate_lookup_prunes_by_envelope() {
        let layer =
            ReferenceLayer::from_geojson(ReferenceLayerKind::County, COUNTIES, "NAME", None).unwrap();
        let query = geo::Rect::new(geo::coord! { x: 12.0, y: 2.0 }, geo::coord! { x: 14.0, y: 4.0 });
        let values: Vec<&str> = layer.candidates(query).map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["Sierra"]);
    }

    #[test]
    fn layers_iterate_in_fixed_order() {
        let mut layers = ReferenceLayers::new();
        layers.insert(ReferenceLayer::from_features(ReferenceLayerKind::Wui, vec![]));
        layers.insert(ReferenceLayer::from_features(ReferenceLayerKind::Vegetation, vec![]));
        let kinds: Vec<ReferenceLayerKind> = layers.iter().map(|(kind, _)| kind).collect();
        assert_eq!(
            kinds,
            vec![ReferenceLayerKind::Vegetation, ReferenceLayerKind::Wui]
        );
    }
}
