//! Event types emitted by the batch runner for progress display
//!
//! These are plain data; rendering them (console, UI, log) is the job of a
//! progress sink.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Emitted once per category after its scrape completes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProgress {
    /// 1-based position of the category in discovery order
    pub index: usize,
    pub total: usize,
    pub name: String,
    /// Kept items per page, in page order
    pub item_counts: Vec<usize>,
    pub unique_items: usize,
    pub failed: bool,
    /// Wall time spent on this category
    pub elapsed_ms: u64,
    /// Running totals at the time of the event
    pub totals: RunTotals,
}

/// Running totals threaded through a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_items: usize,
    pub elapsed_ms: u64,
}

impl RunTotals {
    /// Fold one finished category into the totals
    pub fn record(&mut self, items: usize, failed: bool) {
        self.processed += 1;
        self.total_items += items;
        if failed || items == 0 {
            self.failed += 1;
        } else {
            self.successful += 1;
        }
    }

    /// Linear estimate of the time left for `total` categories
    pub fn eta(&self, total: usize) -> Duration {
        if self.processed == 0 || total <= self.processed {
            return Duration::ZERO;
        }
        let per_category = self.elapsed_ms / self.processed as u64;
        Duration::from_millis(per_category * (total - self.processed) as u64)
    }
}

/// Emitted when a category finishes with fewer unique items than expected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowYieldWarning {
    pub name: String,
    pub unique_items: usize,
    pub threshold: usize,
}

/// Final summary of a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_categories: usize,
    pub totals: RunTotals,
    /// The run stopped at a category boundary before every category was processed
    pub cancelled: bool,
}

impl RunSummary {
    pub fn average_secs_per_category(&self) -> f64 {
        if self.totals.processed == 0 {
            return 0.0;
        }
        self.totals.elapsed_ms as f64 / 1000.0 / self.totals.processed as f64
    }

    pub fn items_per_second(&self) -> f64 {
        if self.totals.elapsed_ms == 0 {
            return 0.0;
        }
        self.totals.total_items as f64 / (self.totals.elapsed_ms as f64 / 1000.0)
    }
}

/// `HH:MM:SS` for progress lines
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
