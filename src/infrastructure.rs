//! Infrastructure layer for configuration, logging, rendering and I/O
//!
//! Everything that touches the outside world lives here: the config file,
//! log sinks, the rendering engine adapters, category discovery and export.

pub mod config; // Configuration file and defaults
pub mod discovery; // Category link scrape
pub mod export; // JSON + CSV writers
pub mod logging; // Logging infrastructure
pub mod render; // Rendering engine interface and adapters

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, LoggingConfig, ScrapeConfig, SelectorConfig};
pub use discovery::discover_categories;
pub use export::{ExportPaths, export_results};
pub use logging::{get_log_directory, init_logging_with_config};
pub use render::{
    ElementHandle, PageRenderHandle, RemoteRenderSession, RenderError, RenderResult,
    SnapshotPage, WaitUntil,
};
