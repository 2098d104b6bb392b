//! Stage progress reporting.
//!
//! Ingest, enrichment and footprint reduction each work through a known
//! number of items (sources, activities, windows). They announce the stage,
//! tick once per finished item, and close it with a one-line summary. How
//! that is rendered is up to the binary.

use std::sync::Arc;

/// Receives progress from one stage at a time.
///
/// Implementations must be `Send + Sync`: enrichment and window reduction
/// tick from rayon worker threads.
pub trait ProgressCallback: Send + Sync {
    /// A stage over `total` items begins, replacing any previous stage.
    fn begin(&self, stage: &str, total: u64);

    /// One item of the current stage finished.
    fn item_done(&self);

    /// The current stage ended.
    fn finish(&self, summary: &str);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn begin(&self, _stage: &str, _total: u64) {}
    fn item_done(&self) {}
    fn finish(&self, _summary: &str) {}
}

/// Shared [`NullProgress`] for library callers and tests.
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
