#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing for the treatment map binary.
//!
//! [`IndicatifProgress`] renders pipeline stages reported through
//! [`ProgressCallback`]. [`init_logger`] routes `log` output through the same
//! [`MultiProgress`] so log lines print above the stage bars instead of
//! tearing them.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use treatment_map_ingest::progress::ProgressCallback;

pub use indicatif::MultiProgress;

/// One terminal line showing the current stage.
///
/// Spins until a stage begins, then shows a bar over the stage's items.
/// Reusable: each [`ProgressCallback::begin`] resets the bar.
pub struct IndicatifProgress {
    bar: ProgressBar,
    stage_style: ProgressStyle,
}

impl IndicatifProgress {
    /// Adds a stage line to `multi`, labelled `label` until its first stage
    /// begins.
    #[must_use]
    pub fn stage_line(multi: &MultiProgress, label: &str) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.yellow} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(label.to_string());

        let stage_style = ProgressStyle::with_template(
            "{msg} {wide_bar:.green/dim} {pos}/{len} {percent}% [{elapsed_precise}<{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Arc::new(Self { bar, stage_style })
    }
}

impl ProgressCallback for IndicatifProgress {
    fn begin(&self, stage: &str, total: u64) {
        self.bar.reset();
        self.bar.set_length(total);
        self.bar.set_style(self.stage_style.clone());
        self.bar.set_message(stage.to_string());
    }

    fn item_done(&self) {
        self.bar.inc(1);
    }

    fn finish(&self, summary: &str) {
        self.bar.finish_with_message(summary.to_string());
    }
}

/// Installs `pretty_env_logger` (filtered by `RUST_LOG`) behind
/// `indicatif-log-bridge`.
///
/// Returns the [`MultiProgress`] every stage line must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok(); // already installed

    log::set_max_level(level);

    multi
}

#[cfg(test)]
mod tests {
    use indicatif::ProgressDrawTarget;

    use super::*;

    #[test]
    fn each_stage_starts_from_zero() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let progress = IndicatifProgress {
            bar: multi.add(ProgressBar::new_spinner()),
            stage_style: ProgressStyle::default_bar(),
        };

        progress.begin("Attributing polygon activities", 3);
        for _ in 0..3 {
            progress.item_done();
        }
        assert_eq!(progress.bar.position(), 3);
        progress.finish("polygon attribution complete");

        progress.begin("Attributing line activities", 2);
        assert_eq!(progress.bar.position(), 0);
        assert_eq!(progress.bar.length(), Some(2));
        progress.item_done();
        assert_eq!(progress.bar.position(), 1);
    }
}
