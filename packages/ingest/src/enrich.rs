//! Attaches reference attributes to every activity in a collection.

use std::sync::Arc;

use rayon::prelude::*;
use treatment_map_activity_models::{ActivityCollection, Diagnostics};
use treatment_map_spatial::ReferenceLayers;
use treatment_map_spatial::attribute::attribute_all;

use crate::progress::ProgressCallback;

/// Runs attribution for every activity in parallel.
///
/// Each activity is written by exactly one worker and the reference layers
/// are only read. Diagnostics come back in activity-id order regardless of
/// scheduling.
pub fn enrich(
    collection: &mut ActivityCollection,
    layers: &ReferenceLayers,
    tie_epsilon: f64,
    progress: &Arc<dyn ProgressCallback>,
) -> Diagnostics {
    let kind = collection.kind();
    progress.begin(
        &format!("Attributing {kind} activities"),
        collection.len() as u64,
    );

    let per_activity: Vec<Diagnostics> = collection
        .enrichment_slots()
        .into_par_iter()
        .map(|slot| {
            let (attrs, diagnostics) = attribute_all(slot.id, slot.geometry, layers, tie_epsilon);
            *slot.reference_attrs = Some(attrs);
            progress.item_done();
            diagnostics
        })
        .collect();

    let mut diagnostics = Diagnostics::new();
    for found in per_activity {
        diagnostics.extend(found);
    }

    log::info!(
        "Enriched {} {kind} activities against {} layers ({} diagnostics)",
        collection.len(),
        layers.len(),
        diagnostics.len()
    );
    progress.finish(&format!("{kind} attribution complete"));

    diagnostics
}
