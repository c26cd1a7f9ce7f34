//! # Bestseller extraction engine
//!
//! Per page: [`StabilizationDetector`] waits for the container count to settle,
//! [`ExtractionStrategyChain`] pulls raw records, [`RecordNormalizer`] turns
//! them into canonical records. [`PaginatedCategoryScraper`] runs that over
//! every result page of one category and deduplicates; [`CategoryBatchRunner`]
//! drives all categories with failure isolation and pacing.

use thiserror::Error;

use crate::infrastructure::render::RenderError;

pub mod batch_runner;
pub mod category_scraper;
pub mod normalizer;
pub mod stabilization;
pub mod strategies;

pub use batch_runner::{
    BatchReport, CategoryBatchRunner, ChannelProgressSink, ProgressEvent, ProgressSink,
    TracingProgressSink,
};
pub use category_scraper::{CategoryPhase, PaginatedCategoryScraper};
pub use normalizer::{Normalized, RecordNormalizer, deduplicate};
pub use stabilization::{StabilizationDetector, StabilizationOutcome};
pub use strategies::{
    ChainOutcome, ExtractionRules, ExtractionStrategy, ExtractionStrategyChain, StrategyAttempt,
};

/// Category-level failure; the only error that crosses the scraper boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("Category '{category}' failed while {phase}: {source}")]
    CategoryFailure {
        category: String,
        phase: CategoryPhase,
        #[source]
        source: RenderError,
    },
}

impl ScrapeError {
    pub fn category_failure(category: &str, phase: CategoryPhase, source: RenderError) -> Self {
        Self::CategoryFailure {
            category: category.to_string(),
            phase,
            source,
        }
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
