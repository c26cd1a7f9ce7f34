//! Bestseller Harvest - marketplace bestseller list extraction
//!
//! Walks every bestseller category, waits for lazily loaded result pages to
//! settle, extracts ranked product records through an ordered chain of
//! strategies and exports the deduplicated results as JSON and CSV.

// Module declarations
pub mod crawling;
pub mod domain;
pub mod infrastructure;

// Re-export the main entry points
pub use crawling::{BatchReport, CategoryBatchRunner, PaginatedCategoryScraper, ScrapeError};
pub use domain::{Category, CategoryResult, ProductRecord};
pub use infrastructure::{AppConfig, ConfigManager, PageRenderHandle};
