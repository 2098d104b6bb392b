//! Level-of-effort aggregation.
//!
//! Effort counts treated acreage once per year a treatment is active, so
//! ground re-treated across years is counted every time. No geometry is
//! involved.

use std::collections::BTreeMap;

use treatment_map_activity_models::{Activity, Agency, YearWindow};

/// Summed effort for one agency and year.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EffortCell {
    /// Sum of `treated_area` over contributing activities.
    pub treated_area: f64,
    /// Number of contributing activities.
    pub activity_count: u64,
}

/// Effort keyed by `(agency, year)`, restricted to one window.
#[derive(Debug, Clone, PartialEq)]
pub struct EffortTable {
    window: YearWindow,
    cells: BTreeMap<(Agency, i32), EffortCell>,
}

impl EffortTable {
    /// Creates an empty table.
    #[must_use]
    pub const fn new(window: YearWindow) -> Self {
        Self {
            window,
            cells: BTreeMap::new(),
        }
    }

    /// Adds an activity's full area to every year it is active within the
    /// window.
    pub fn add(&mut self, activity: &Activity) {
        for year in activity.years_within(self.window) {
            let cell = self.cells.entry((activity.agency, year)).or_default();
            cell.treated_area += activity.treated_area;
            cell.activity_count += 1;
        }
    }

    /// Window the table covers.
    #[must_use]
    pub const fn window(&self) -> YearWindow {
        self.window
    }

    /// Effort for one agency and year.
    #[must_use]
    pub fn get(&self, agency: Agency, year: i32) -> Option<&EffortCell> {
        self.cells.get(&(agency, year))
    }

    /// Cells ordered by agency, then year.
    pub fn iter(&self) -> impl Iterator<Item = (Agency, i32, &EffortCell)> {
        self.cells
            .iter()
            .map(|((agency, year), cell)| (*agency, *year, cell))
    }

    /// Sum of every cell.
    #[must_use]
    pub fn total_area(&self) -> f64 {
        self.cells.values().map(|c| c.treated_area).sum()
    }

    /// Number of non-empty cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether no activity fell inside the window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Builds the effort table for `window`.
pub fn level_of_effort<'a>(
    activities: impl IntoIterator<Item = &'a Activity>,
    window: YearWindow,
) -> EffortTable {
    let mut table = EffortTable::new(window);
    let mut seen = 0_usize;
    for activity in activities {
        table.add(activity);
        seen += 1;
    }
    log::info!(
        "Level of effort for {window}: {seen} activities into {} cells",
        table.len()
    );
    table
}
