//! Inclusive calendar-year query windows.

use serde::{Deserialize, Serialize};

/// Errors raised while validating run configuration at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// The window starts after it ends.
    #[error("Invalid year window: start year {start} is after end year {end}")]
    InvertedWindow {
        /// Requested first year.
        start: i32,
        /// Requested last year.
        end: i32,
    },

    /// Any other malformed setting.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

/// An inclusive `[start, end]` range of calendar years.
///
/// Only constructible through [`YearWindow::new`], so every window that
/// reaches the aggregation core is already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "(i32, i32)", into = "(i32, i32)")]
pub struct YearWindow {
    start: i32,
    end: i32,
}

impl YearWindow {
    /// Validates and builds a window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvertedWindow`] if `start > end`.
    pub const fn new(start: i32, end: i32) -> Result<Self, ConfigurationError> {
        if start > end {
            return Err(ConfigurationError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// A window covering a single year.
    #[must_use]
    pub const fn single(year: i32) -> Self {
        Self {
            start: year,
            end: year,
        }
    }

    /// First year of the window.
    #[must_use]
    pub const fn start(self) -> i32 {
        self.start
    }

    /// Last year of the window (inclusive).
    #[must_use]
    pub const fn end(self) -> i32 {
        self.end
    }

    /// Whether `year` falls inside the window.
    #[must_use]
    pub const fn contains(self, year: i32) -> bool {
        self.start <= year && year <= self.end
    }

    /// Iterates the years of the window in order.
    pub fn years(self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    /// Splits the window into one single-year window per year.
    #[must_use]
    pub fn per_year(self) -> Vec<Self> {
        self.years().map(Self::single).collect()
    }
}

impl TryFrom<(i32, i32)> for YearWindow {
    type Error = ConfigurationError;

    fn try_from((start, end): (i32, i32)) -> Result<Self, Self::Error> {
        Self::new(start, end)
    }
}

impl From<YearWindow> for (i32, i32) {
    fn from(window: YearWindow) -> Self {
        (window.start, window.end)
    }
}

impl std::fmt::Display for YearWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}
