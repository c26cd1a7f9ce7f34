//! Domain module - plain data shared by the extraction engine
//!
//! Categories, raw and canonical product records, per-category results and
//! progress events. Nothing here touches the rendering engine.

pub mod category;
pub mod events;
pub mod product;
pub mod results;

pub use category::Category;
pub use events::{CategoryProgress, LowYieldWarning, RunSummary, RunTotals};
pub use product::{clean_text, ProductIdentifier, ProductRecord, RawRecord, RejectReason, StrategyKind};
pub use results::{CategoryResult, ExtractionStats, PageStats, RejectionCounts};
