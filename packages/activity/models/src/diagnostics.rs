//! Run-level data-quality diagnostics.
//!
//! Per-record problems never abort a run. Each stage reports them here and
//! the batch returns the accumulated list next to its reports.

use serde::{Deserialize, Serialize};

use crate::{ActivityId, Agency, GeometryKind, ReferenceLayerKind, YearWindow};

/// A single per-record problem encountered during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An export feature could not be mapped onto a raw record.
    RecordRejected {
        /// Agency that supplied the feature.
        agency: Agency,
        /// Agency key of the feature, when it had one.
        source_key: Option<String>,
        /// Position of the feature in its export.
        feature_index: usize,
        /// Why the feature was rejected.
        reason: String,
    },
    /// A raw record was dropped by the normalizer.
    GeometryError {
        /// Agency that supplied the record.
        agency: Agency,
        /// Agency key of the record, when it had one.
        source_key: Option<String>,
        /// Why the record was rejected.
        reason: String,
    },
    /// An activity had no overlapping polygon in a reference layer.
    ReferenceCoverageGap {
        /// Affected activity.
        activity_id: ActivityId,
        /// Layer without coverage.
        layer: ReferenceLayerKind,
    },
    /// The overlay for one reference layer failed; the attribute is null.
    ReferenceJoinFailed {
        /// Affected activity.
        activity_id: ActivityId,
        /// Layer whose join failed.
        layer: ReferenceLayerKind,
        /// Underlying overlay error.
        reason: String,
    },
    /// An activity was excluded from a footprint partition.
    OverlayDegeneracy {
        /// Excluded activity.
        activity_id: ActivityId,
        /// Window being reduced.
        window: YearWindow,
        /// Geometry kind of the reduction.
        kind: GeometryKind,
        /// Underlying overlay error.
        reason: String,
    },
    /// A whole window produced no report.
    WindowFailed {
        /// Window that failed.
        window: YearWindow,
        /// Geometry kind of the reduction.
        kind: GeometryKind,
        /// Why the window failed.
        reason: String,
    },
}

impl Diagnostic {
    /// Short machine-readable label for summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::RecordRejected { .. } => "record_rejected",
            Self::GeometryError { .. } => "geometry_error",
            Self::ReferenceCoverageGap { .. } => "reference_coverage_gap",
            Self::ReferenceJoinFailed { .. } => "reference_join_failed",
            Self::OverlayDegeneracy { .. } => "overlay_degeneracy",
            Self::WindowFailed { .. } => "window_failed",
        }
    }
}

/// Accumulated diagnostics for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Records one diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    /// Appends every diagnostic from another list.
    pub fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// All diagnostics in the order they were recorded.
    #[must_use]
    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.0
    }

    /// Number of diagnostics recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Counts diagnostics per [`Diagnostic::label`].
    #[must_use]
    pub fn summary(&self) -> std::collections::BTreeMap<&'static str, usize> {
        let mut counts = std::collections::BTreeMap::new();
        for diagnostic in &self.0 {
            *counts.entry(diagnostic.label()).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
