//! Per-category results handed from the scraper to the batch runner.

use serde::{Deserialize, Serialize};

use super::category::Category;
use super::product::{ProductRecord, RejectReason, StrategyKind};

/// Rejected raw records, counted by reason tag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    #[serde(rename = "missing-link")]
    pub missing_link: usize,
    #[serde(rename = "invalid-link-pattern")]
    pub invalid_link_pattern: usize,
    #[serde(rename = "missing-rank-and-name")]
    pub missing_rank_and_name: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::MissingLink => self.missing_link += 1,
            RejectReason::InvalidLinkPattern => self.invalid_link_pattern += 1,
            RejectReason::MissingRankAndName => self.missing_rank_and_name += 1,
        }
    }

    pub fn get(&self, reason: RejectReason) -> usize {
        match reason {
            RejectReason::MissingLink => self.missing_link,
            RejectReason::InvalidLinkPattern => self.invalid_link_pattern,
            RejectReason::MissingRankAndName => self.missing_rank_and_name,
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.missing_link += other.missing_link;
        self.invalid_link_pattern += other.invalid_link_pattern;
        self.missing_rank_and_name += other.missing_rank_and_name;
    }
}

/// What happened on a single result page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageStats {
    /// 1-based result page number
    pub page: u32,
    /// False when navigation never reached this page
    pub reached: bool,
    /// Raw records returned by the accepted extraction strategy
    pub raw_count: usize,
    /// Records kept after normalization and the per-page cap
    pub item_count: usize,
    pub strategy: Option<StrategyKind>,
    pub container_count: usize,
    pub stabilization_rounds: u32,
    /// False when the container count never settled within the round budget
    pub stabilized: bool,
    pub rejections: RejectionCounts,
}

impl PageStats {
    pub fn unreached(page: u32) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// One entry per configured page, in page order
    pub pages: Vec<PageStats>,
    pub total_before_dedup: usize,
    pub final_unique_items: usize,
    /// Record containers seen right after the first navigation
    pub initial_container_count: usize,
    /// Kept records lacking rank or name
    pub incomplete_items: usize,
    pub failed: bool,
    pub error: Option<String>,
}

impl ExtractionStats {
    /// Kept item count per page, in page order
    pub fn per_page_counts(&self) -> Vec<usize> {
        self.pages.iter().map(|p| p.item_count).collect()
    }

    /// Kept item count for a 1-based page number; 0 when the page was never reached
    pub fn page_items(&self, page: u32) -> usize {
        self.pages
            .iter()
            .find(|p| p.page == page)
            .map_or(0, |p| p.item_count)
    }

    pub fn rejections(&self) -> RejectionCounts {
        let mut total = RejectionCounts::default();
        for page in &self.pages {
            total.merge(&page.rejections);
        }
        total
    }

    pub fn low_confidence_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.reached && !p.stabilized).count()
    }
}

/// Outcome of scraping one category. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub category: Category,
    /// Deduplicated, in page-then-rank order
    pub records: Vec<ProductRecord>,
    pub stats: ExtractionStats,
}

impl CategoryResult {
    /// Result for a category whose scrape could not proceed at all
    pub fn failed(category: Category, page_count: u32, error: impl Into<String>) -> Self {
        Self {
            category,
            records: Vec::new(),
            stats: ExtractionStats {
                pages: (1..=page_count).map(PageStats::unreached).collect(),
                failed: true,
                error: Some(error.into()),
                ..ExtractionStats::default()
            },
        }
    }

    pub fn item_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_failed(&self) -> bool {
        self.stats.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_reports_zero_for_every_page() {
        let result = CategoryResult::failed(
            Category::new("Books", "https://www.amazon.in/gp/bestsellers/books"),
            2,
            "session lost",
        );
        assert!(result.is_failed());
        assert_eq!(result.item_count(), 0);
        assert_eq!(result.stats.per_page_counts(), vec![0, 0]);
        assert_eq!(result.stats.error.as_deref(), Some("session lost"));
    }

    #[test]
    fn page_items_defaults_to_zero() {
        let stats = ExtractionStats {
            pages: vec![PageStats {
                page: 1,
                reached: true,
                item_count: 46,
                stabilized: true,
                ..PageStats::default()
            }],
            ..ExtractionStats::default()
        };
        assert_eq!(stats.page_items(1), 46);
        assert_eq!(stats.page_items(2), 0);
        assert_eq!(stats.low_confidence_pages(), 0);
    }

    #[test]
    fn rejection_counts_merge_across_pages() {
        let mut first = RejectionCounts::default();
        first.record(RejectReason::MissingLink);
        first.record(RejectReason::MissingLink);
        let mut second = RejectionCounts::default();
        second.record(RejectReason::InvalidLinkPattern);

        let stats = ExtractionStats {
            pages: vec![
                PageStats { page: 1, rejections: first, ..PageStats::default() },
                PageStats { page: 2, rejections: second, ..PageStats::default() },
            ],
            ..ExtractionStats::default()
        };
        let total = stats.rejections();
        assert_eq!(total.get(RejectReason::MissingLink), 2);
        assert_eq!(total.get(RejectReason::InvalidLinkPattern), 1);
        assert_eq!(total.get(RejectReason::MissingRankAndName), 0);
    }
}
