#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Overlap resolution for enriched activity collections.
//!
//! Produces the two reductions the reports are built from: a
//! level-of-effort table that counts re-treated ground every time, and a
//! footprint partition that counts every parcel of ground once.

pub mod effort;
pub mod footprint;

use std::sync::Arc;

use rayon::prelude::*;
use treatment_map_activity_models::{
    ActivityCollection, ActivityId, Diagnostic, Diagnostics, GeometryKind, YearWindow,
};
use treatment_map_ingest::progress::ProgressCallback;

pub use effort::{EffortCell, EffortTable, level_of_effort};
pub use footprint::{
    DEFAULT_SLIVER_TOLERANCE, FootprintAccumulator, FootprintRegion, FootprintResult,
};

/// Why a footprint window produced no result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WindowError {
    /// Nothing in the window could be reduced.
    #[error("No usable {kind} activities in window {window} ({selected} selected)")]
    NoUsableInput {
        /// Window being reduced.
        window: YearWindow,
        /// Geometry kind of the reduction.
        kind: GeometryKind,
        /// Activities active in the window before overlay.
        selected: usize,
    },

    /// A region was labelled with an activity the collection does not hold.
    #[error("{kind} footprint {window} references unknown activity {id}")]
    UnknownActivity {
        /// Window being reduced.
        window: YearWindow,
        /// Geometry kind of the reduction.
        kind: GeometryKind,
        /// The missing activity.
        id: ActivityId,
    },
}

/// Outcome of one footprint reduction.
#[derive(Debug, Clone)]
pub struct WindowRun {
    /// Window that was reduced.
    pub window: YearWindow,
    /// Geometry kind that was reduced.
    pub kind: GeometryKind,
    /// The partition, or why there is none.
    pub result: Result<FootprintResult, WindowError>,
    /// Activities excluded along the way.
    pub diagnostics: Diagnostics,
}

/// Reduces the activities of `collection` active in `window` to a
/// footprint partition.
///
/// Activities whose overlay degenerates are excluded with a
/// [`Diagnostic::OverlayDegeneracy`]; the rest of the window proceeds.
#[must_use]
pub fn reduce_window(
    collection: &ActivityCollection,
    window: YearWindow,
    sliver_tolerance: f64,
) -> WindowRun {
    let kind = collection.kind();
    let mut diagnostics = Diagnostics::new();
    let mut accumulator = FootprintAccumulator::new(sliver_tolerance);
    let mut selected = 0_usize;
    let mut usable = 0_usize;

    for activity in collection
        .activities()
        .iter()
        .filter(|a| a.is_active_in(window))
    {
        selected += 1;

        let added = footprint::activity_footprint(activity)
            .and_then(|footprint| accumulator.add(activity.id, &footprint));

        match added {
            Ok(true) => usable += 1,
            Ok(false) => {
                log::debug!("Activity {} has an empty {kind} footprint", activity.id);
            }
            Err(e) => {
                log::warn!("Excluding activity {} from {kind} footprint {window}: {e}", activity.id);
                diagnostics.push(Diagnostic::OverlayDegeneracy {
                    activity_id: activity.id,
                    window,
                    kind,
                    reason: e.to_string(),
                });
            }
        }
    }

    let result = if usable == 0 {
        Err(WindowError::NoUsableInput {
            window,
            kind,
            selected,
        })
    } else {
        accumulator.finish(collection, window)
    };

    match &result {
        Ok(result) => log::info!(
            "{kind} footprint {window}: {usable}/{selected} activities into {} regions, {:.1} total area",
            result.regions.len(),
            result.total_footprint_area
        ),
        Err(error) => {
            log::warn!("{error}");
            diagnostics.push(Diagnostic::WindowFailed {
                window,
                kind,
                reason: error.to_string(),
            });
        }
    }

    WindowRun {
        window,
        kind,
        result,
        diagnostics,
    }
}

/// Reduces several windows of one collection in parallel.
///
/// Runs come back in the order of `windows`. A failed window never affects
/// its siblings.
#[must_use]
pub fn reduce_windows(
    collection: &ActivityCollection,
    windows: &[YearWindow],
    sliver_tolerance: f64,
    progress: &Arc<dyn ProgressCallback>,
) -> Vec<WindowRun> {
    progress.begin(
        &format!("Reducing {} footprints", collection.kind()),
        windows.len() as u64,
    );

    let runs: Vec<WindowRun> = windows
        .par_iter()
        .map(|window| {
            let run = reduce_window(collection, *window, sliver_tolerance);
            progress.item_done();
            run
        })
        .collect();

    progress.finish(&format!("{} footprints complete", collection.kind()));
    runs
}
