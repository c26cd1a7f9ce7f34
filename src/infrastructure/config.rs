//! Configuration infrastructure
//!
//! Contains configuration loading and management for bestseller scraping.
//!
//! Configuration is organized into sections:
//! 1. Scrape settings (pages, limits, stabilization, timeouts)
//! 2. Pacing and run control
//! 3. Site selectors (config file only)
//! 4. Rendering backend and logging

#![allow(clippy::derivable_impls)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scrape: ScrapeConfig,
    pub pacing: PacingConfig,
    pub selectors: SelectorConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

/// Per-category scraping behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Result pages visited per category
    pub page_count: u32,

    /// Maximum records kept from a single result page
    pub page_limit_per_page: usize,

    /// Upper bound on stabilization sampling rounds
    pub max_stabilization_rounds: u32,

    /// Pause between stabilization rounds in milliseconds
    pub stabilization_pause_ms: u64,

    /// Page navigation timeout in milliseconds
    pub navigation_timeout_ms: u64,

    /// Network idle wait timeout in milliseconds
    pub network_idle_timeout_ms: u64,

    /// A strategy is accepted once it yields at least
    /// `min(min_acceptable_yield, page_limit_per_page / 2)` records
    pub min_acceptable_yield: usize,

    /// Warn when a category ends with fewer unique items than this
    pub low_yield_warning_threshold: usize,

    /// Reload the first page once when fewer containers than this are present
    pub reload_below_containers: usize,

    /// Container count that confirms a page change when the URL does not
    pub page_change_min_containers: usize,

    /// Link text must be longer than this to count as a product name
    pub min_name_chars: usize,

    /// Cap on anchors inspected by identifier-anchored extraction
    pub max_anchors_per_page: usize,

    pub max_name_chars: usize,

    pub max_rating_chars: usize,
}

/// Pacing between categories and run-level control
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Base delay between categories in milliseconds
    pub inter_category_pace_ms_base: u64,

    /// Delay varies uniformly within base ± jitter
    pub inter_category_pace_ms_jitter: u64,

    /// Independent rendering sessions working through categories
    pub session_pool_size: usize,

    /// Stop starting new categories after this many seconds
    pub run_timeout_secs: Option<u64>,
}

/// CSS selectors for bestseller result pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Attribute that marks product containers and carries the product token
    pub identifier_attribute: String,

    /// Links to product detail pages
    pub product_link: String,

    /// Pattern a resolved link must match to count as a product detail URL
    pub product_link_pattern: String,

    /// Any anchor scanned by link-only extraction
    pub product_anchor: String,

    /// Rank badges (`#1`, `#2`, ...)
    pub rank_badge: String,

    /// Price selectors, tried in order
    pub price: Vec<String>,

    /// Rating links whose `aria-label` holds the rating phrase
    pub rating_link: String,

    /// Star icon whose parent text holds the rating phrase
    pub rating_icon: String,

    /// Elements whose own text may hold the rating phrase
    pub rating_text: String,

    /// Next-page controls, `{page}` is replaced by the target page number
    pub next_page: Vec<String>,

    /// Query parameter carrying the page number
    pub page_param: String,

    /// Category navigation links on the bestseller landing page
    pub category_nav_link: String,
}

/// Where rendered HTML comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Browserless-style `/content` endpoint; plain HTTP GET when absent
    pub endpoint: Option<String>,

    pub token: Option<String>,

    /// Re-render on scroll requests (remote endpoint only)
    pub rerender_on_scroll: bool,

    pub user_agent: String,

    pub accept_language: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; next to the executable when absent
    pub directory: Option<PathBuf>,

    /// Log file name
    pub file_name: String,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl ScrapeConfig {
    pub fn stabilization_pause(&self) -> Duration {
        Duration::from_millis(self.stabilization_pause_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    /// Upper bound on records a single category can produce
    pub fn max_records_per_category(&self) -> usize {
        self.page_count as usize * self.page_limit_per_page
    }
}

impl PacingConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

impl SelectorConfig {
    /// Elements carrying a non-empty identifier marker
    pub fn record_container(&self) -> String {
        format!(
            r#"[{attr}]:not([{attr}=""])"#,
            attr = self.identifier_attribute
        )
    }

    pub fn next_page_for(&self, page: u32) -> Vec<String> {
        self.next_page
            .iter()
            .map(|s| s.replace("{page}", &page.to_string()))
            .collect()
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            page_count: defaults::PAGE_COUNT,
            page_limit_per_page: defaults::PAGE_LIMIT_PER_PAGE,
            max_stabilization_rounds: defaults::MAX_STABILIZATION_ROUNDS,
            stabilization_pause_ms: defaults::STABILIZATION_PAUSE_MS,
            navigation_timeout_ms: defaults::NAVIGATION_TIMEOUT_MS,
            network_idle_timeout_ms: defaults::NETWORK_IDLE_TIMEOUT_MS,
            min_acceptable_yield: defaults::MIN_ACCEPTABLE_YIELD,
            low_yield_warning_threshold: defaults::LOW_YIELD_WARNING_THRESHOLD,
            reload_below_containers: defaults::RELOAD_BELOW_CONTAINERS,
            page_change_min_containers: defaults::PAGE_CHANGE_MIN_CONTAINERS,
            min_name_chars: defaults::MIN_NAME_CHARS,
            max_anchors_per_page: defaults::MAX_ANCHORS_PER_PAGE,
            max_name_chars: defaults::MAX_NAME_CHARS,
            max_rating_chars: defaults::MAX_RATING_CHARS,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            inter_category_pace_ms_base: defaults::PACE_MS_BASE,
            inter_category_pace_ms_jitter: defaults::PACE_MS_JITTER,
            session_pool_size: defaults::SESSION_POOL_SIZE,
            run_timeout_secs: None,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            identifier_attribute: "data-asin".to_string(),
            product_link: r#"a.a-link-normal[href*="/dp/"]"#.to_string(),
            product_link_pattern: r"/(?:dp|gp/product)/".to_string(),
            product_anchor: "a[href]".to_string(),
            rank_badge: ".zg-bdg-text".to_string(),
            price: vec![
                "span._cDEzb_p13n-sc-price_3mJ9Z".to_string(),
                ".a-price .a-offscreen".to_string(),
                ".a-price-whole".to_string(),
                r#"[class*="price"]:not([class*="strike"])"#.to_string(),
            ],
            rating_link: r#"a[aria-label*="out of 5"]"#.to_string(),
            rating_icon: ".a-icon-star-small".to_string(),
            rating_text: r#"[class*="rating"]"#.to_string(),
            next_page: vec![
                "li.a-last a".to_string(),
                r#"a[href*="pg={page}"]"#.to_string(),
            ],
            page_param: "pg".to_string(),
            category_nav_link: r#"ul[class*="zg-browse-group"] li a"#.to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            rerender_on_scroll: false,
            user_agent: defaults::USER_AGENT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            directory: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(site::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Manager for the default config location
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join("config.json");
        Ok(Self { config_path })
    }

    /// Manager for an explicit config file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration parse error: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Marketplace URLs
pub mod site {
    /// Base URL for resolving relative links
    pub const BASE_URL: &str = "https://www.amazon.in";

    /// Bestseller landing page holding the category navigation
    pub const BESTSELLERS_URL: &str = "https://www.amazon.in/gp/bestsellers/";

    /// Directory name under the user config/data dirs
    pub const APP_DIR_NAME: &str = "bestseller-harvest";
}

/// Default scraping configuration values
pub mod defaults {
    pub const PAGE_COUNT: u32 = 2;
    pub const PAGE_LIMIT_PER_PAGE: usize = 50;
    pub const MAX_STABILIZATION_ROUNDS: u32 = 8;
    pub const STABILIZATION_PAUSE_MS: u64 = 2000;
    pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;
    pub const NETWORK_IDLE_TIMEOUT_MS: u64 = 8000;
    pub const MIN_ACCEPTABLE_YIELD: usize = 10;
    pub const LOW_YIELD_WARNING_THRESHOLD: usize = 10;
    pub const RELOAD_BELOW_CONTAINERS: usize = 5;
    pub const PAGE_CHANGE_MIN_CONTAINERS: usize = 10;
    pub const MIN_NAME_CHARS: usize = 15;
    pub const MAX_ANCHORS_PER_PAGE: usize = 100;
    pub const MAX_NAME_CHARS: usize = 500;
    pub const MAX_RATING_CHARS: usize = 100;

    /// Pacing: 1500..=2100 ms between categories
    pub const PACE_MS_BASE: u64 = 1800;
    pub const PACE_MS_JITTER: u64 = 300;
    pub const SESSION_POOL_SIZE: usize = 1;

    pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
    pub const ACCEPT_LANGUAGE: &str = "en-IN,en;q=0.9";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_FILE_NAME: &str = "bestseller-harvest.log";
}
