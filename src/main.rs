use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bestseller_harvest::crawling::{CategoryBatchRunner, TracingProgressSink};
use bestseller_harvest::domain::events::format_duration;
use bestseller_harvest::infrastructure::config::{AppConfig, ConfigManager, site};
use bestseller_harvest::infrastructure::{
    RemoteRenderSession, discover_categories, export_results, init_logging_with_config,
};

/// Scrape every bestseller category and export the ranked products
#[derive(Parser, Debug)]
#[command(name = "bestseller-harvest", version)]
#[command(about = "Extract bestseller rankings per category into JSON and CSV", long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Result pages per category
    #[arg(long)]
    pages: Option<u32>,

    /// Maximum records kept per result page
    #[arg(long)]
    page_limit: Option<usize>,

    /// Independent rendering sessions
    #[arg(long)]
    sessions: Option<usize>,

    /// Only scrape the first N discovered categories
    #[arg(long)]
    limit: Option<usize>,

    /// Only scrape categories with these names (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Stop starting new categories after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Browserless-style rendering endpoint; plain HTTP when absent
    #[arg(long)]
    render_endpoint: Option<String>,

    /// Output directory for the JSON and CSV files
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Output file name prefix
    #[arg(long, default_value = "bestsellers")]
    prefix: String,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(pages) = self.pages {
            config.scrape.page_count = pages;
        }
        if let Some(limit) = self.page_limit {
            config.scrape.page_limit_per_page = limit;
        }
        if let Some(sessions) = self.sessions {
            config.pacing.session_pool_size = sessions;
        }
        if let Some(secs) = self.timeout_secs {
            config.pacing.run_timeout_secs = Some(secs);
        }
        if let Some(endpoint) = &self.render_endpoint {
            config.render.endpoint = Some(endpoint.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    let mut config = manager.load_config().await?;
    cli.apply(&mut config);
    init_logging_with_config(&config.logging)?;

    let pool_size = config.pacing.session_pool_size.max(1);
    let mut sessions = (0..pool_size)
        .map(|_| RemoteRenderSession::new(&config.render))
        .collect::<Result<Vec<_>>>()?;

    let discovery_started = std::time::Instant::now();
    let mut categories = discover_categories(
        &mut sessions[0],
        site::BESTSELLERS_URL,
        site::BASE_URL,
        &config.selectors,
        config.scrape.navigation_timeout(),
    )
    .await
    .context("Category discovery failed")?;
    info!(
        "Found {} categories (took {:.2}s)",
        categories.len(),
        discovery_started.elapsed().as_secs_f64()
    );

    if !cli.categories.is_empty() {
        categories.retain(|c| cli.categories.iter().any(|name| name.eq_ignore_ascii_case(&c.name)));
        if categories.is_empty() {
            bail!("None of the requested categories were discovered");
        }
    }
    if let Some(limit) = cli.limit {
        categories.truncate(limit);
    }

    let cancellation = CancellationToken::new();
    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current category");
            interrupt.cancel();
        }
    });

    let runner = CategoryBatchRunner::from_config(&config, site::BASE_URL)?.with_cancellation(cancellation);
    let report = runner.run(&mut sessions, &categories, &TracingProgressSink).await;

    let paths = export_results(&cli.output, &cli.prefix, &report.results)?;

    let summary = report.summary;
    println!("\n{}", "=".repeat(60));
    println!("SCRAPING COMPLETED{}", if summary.cancelled { " (stopped early)" } else { "" });
    println!("{}", "=".repeat(60));
    println!(
        "Total time: {}",
        format_duration(Duration::from_millis(summary.totals.elapsed_ms))
    );
    println!(
        "Categories processed: {}/{} successful",
        summary.totals.successful, summary.total_categories
    );
    println!("Failed categories: {}", summary.totals.failed);
    println!("Total items scraped: {}", summary.totals.total_items);
    println!("Average time per category: {:.2}s", summary.average_secs_per_category());
    println!("Average items per second: {:.2}", summary.items_per_second());
    println!("JSON saved to: {}", paths.json.display());
    if let Some(csv) = &paths.csv {
        println!("CSV saved to: {}", csv.display());
    }

    Ok(())
}
