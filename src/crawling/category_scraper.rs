//! Per-category scraping across result pages
//!
//! Page 1 is loaded from the category URL; later pages are reached through
//! the next-page control or, failing that, by rewriting the page parameter.
//! Records from all reached pages are merged and deduplicated.

use std::fmt;

use anyhow::Result;
use tracing::{debug, info, warn};
use url::Url;

use super::normalizer::{RecordNormalizer, deduplicate};
use super::stabilization::StabilizationDetector;
use super::strategies::ExtractionStrategyChain;
use super::{ScrapeError, ScrapeResult};
use crate::domain::{Category, CategoryResult, ExtractionStats, PageStats, ProductRecord};
use crate::infrastructure::config::{AppConfig, ScrapeConfig, SelectorConfig};
use crate::infrastructure::render::{PageRenderHandle, RenderResult, WaitUntil};

/// Where a category scrape is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryPhase {
    NotStarted,
    Loading(u32),
    Extracted(u32),
    Navigating(u32),
    NavigationFailed(u32),
    Deduplicated,
    Done,
}

impl fmt::Display for CategoryPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "starting"),
            Self::Loading(page) => write!(f, "loading page {page}"),
            Self::Extracted(page) => write!(f, "finishing page {page}"),
            Self::Navigating(page) => write!(f, "navigating to page {page}"),
            Self::NavigationFailed(page) => write!(f, "giving up on page {page}"),
            Self::Deduplicated => write!(f, "deduplicating"),
            Self::Done => write!(f, "done"),
        }
    }
}

pub struct PaginatedCategoryScraper {
    scrape: ScrapeConfig,
    selectors: SelectorConfig,
    detector: StabilizationDetector,
    chain: ExtractionStrategyChain,
    normalizer: RecordNormalizer,
}

impl PaginatedCategoryScraper {
    pub fn new(
        scrape: ScrapeConfig,
        selectors: SelectorConfig,
        detector: StabilizationDetector,
        chain: ExtractionStrategyChain,
        normalizer: RecordNormalizer,
    ) -> Self {
        Self {
            scrape,
            selectors,
            detector,
            chain,
            normalizer,
        }
    }

    /// Build every stage from configuration; links resolve against `base_url`
    pub fn from_config(config: &AppConfig, base_url: &str) -> Result<Self> {
        let chain = ExtractionStrategyChain::from_config(&config.selectors, &config.scrape)?;
        let normalizer = RecordNormalizer::from_config(base_url, &config.selectors, &config.scrape)?;
        Ok(Self::new(
            config.scrape.clone(),
            config.selectors.clone(),
            StabilizationDetector::from_config(&config.scrape),
            chain,
            normalizer,
        ))
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.scrape
    }

    /// Scrape every configured page of one category.
    ///
    /// A fatal render fault before page 1 is extracted is a
    /// [`ScrapeError::CategoryFailure`]; later faults keep what was collected
    /// and record the error in the stats.
    pub async fn scrape_category<P>(&self, page: &mut P, category: &Category) -> ScrapeResult<CategoryResult>
    where
        P: PageRenderHandle + ?Sized,
    {
        let page_count = self.scrape.page_count.max(1);
        let page_limit = self.scrape.page_limit_per_page;
        let fail = |phase, source| ScrapeError::category_failure(&category.name, phase, source);

        let mut phase = CategoryPhase::NotStarted;
        debug!("{}: {}", category.name, phase);
        let mut pages: Vec<PageStats> = Vec::with_capacity(page_count as usize);
        let mut collected: Vec<ProductRecord> = Vec::new();
        let mut initial_container_count = 0;
        let mut error = None;

        for number in 1..=page_count {
            if number == 1 {
                phase = CategoryPhase::Loading(1);
                initial_container_count = self
                    .open_first_page(page, category)
                    .await
                    .map_err(|e| fail(phase, e))?;
            } else {
                phase = CategoryPhase::Navigating(number);
                match self.navigate_to_page(page, category, number).await {
                    Ok(true) => info!("{}: reached page {}", category.name, number),
                    Ok(false) => {
                        phase = CategoryPhase::NavigationFailed(number);
                        warn!("{}: page {} navigation failed, keeping earlier pages", category.name, number);
                        break;
                    }
                    Err(e) => {
                        warn!("{}: {} while navigating to page {}", category.name, e, number);
                        error = Some(e.to_string());
                        break;
                    }
                }
                phase = CategoryPhase::Loading(number);
            }

            match self.extract_page(page, number, page_limit).await {
                Ok((stats, records)) => {
                    info!(
                        "{}: page {} extracted {} items ({} raw, {})",
                        category.name,
                        number,
                        stats.item_count,
                        stats.raw_count,
                        stats.strategy.map_or("none", |s| s.as_str())
                    );
                    pages.push(stats);
                    collected.extend(records);
                }
                Err(e) if number == 1 => return Err(fail(phase, e)),
                Err(e) => {
                    warn!("{}: {} on page {}, keeping earlier pages", category.name, e, number);
                    error = Some(e.to_string());
                    break;
                }
            }
            phase = CategoryPhase::Extracted(number);
        }
        debug!("{}: stopped after {}", category.name, phase);

        let reached = pages.len() as u32;
        pages.extend((reached + 1..=page_count).map(PageStats::unreached));

        let total_before_dedup = collected.len();
        let mut records = deduplicate(collected);
        records.truncate(self.scrape.max_records_per_category());
        phase = CategoryPhase::Deduplicated;
        debug!("{}: {} -> {} unique", category.name, phase, records.len());

        if records.len() < self.scrape.low_yield_warning_threshold {
            warn!("{}: low item count ({} unique)", category.name, records.len());
        }

        let stats = ExtractionStats {
            pages,
            total_before_dedup,
            final_unique_items: records.len(),
            initial_container_count,
            incomplete_items: records.iter().filter(|r| !r.is_complete()).count(),
            failed: false,
            error,
        };
        phase = CategoryPhase::Done;
        debug!("{}: {}", category.name, phase);

        Ok(CategoryResult {
            category: category.clone(),
            records,
            stats,
        })
    }

    /// Load page 1, reloading once when it looks empty. Returns the container count.
    async fn open_first_page<P>(&self, page: &mut P, category: &Category) -> RenderResult<usize>
    where
        P: PageRenderHandle + ?Sized,
    {
        let container = self.selectors.record_container();

        self.load(page, &category.source_url).await?;
        let mut count = count_or_zero(page, &container)?;
        debug!("{}: {} initial containers", category.name, count);

        if count < self.scrape.reload_below_containers {
            info!("{}: only {} containers, reloading once", category.name, count);
            self.load(page, &category.source_url).await?;
            count = count_or_zero(page, &container)?;
            debug!("{}: {} containers after reload", category.name, count);
        }
        Ok(count)
    }

    /// Navigate, tolerating everything except a lost session
    async fn load<P>(&self, page: &mut P, url: &str) -> RenderResult<()>
    where
        P: PageRenderHandle + ?Sized,
    {
        match page
            .navigate(url, self.scrape.navigation_timeout(), WaitUntil::DomContentLoaded)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("{}; extracting whatever rendered", e);
                Ok(())
            }
        }
    }

    async fn extract_page<P>(
        &self,
        page: &mut P,
        number: u32,
        page_limit: usize,
    ) -> RenderResult<(PageStats, Vec<ProductRecord>)>
    where
        P: PageRenderHandle + ?Sized,
    {
        let settled = self
            .detector
            .stabilize(page, &self.selectors.record_container())
            .await;
        if !settled.stable {
            debug!("Page {} never stabilized, extracting as-is", number);
        }

        let outcome = self.chain.extract(page, page_limit)?;
        let (mut records, rejections) = self.normalizer.normalize_all(&outcome.records);
        records.truncate(page_limit);

        let stats = PageStats {
            page: number,
            reached: true,
            raw_count: outcome.records.len(),
            item_count: records.len(),
            strategy: Some(outcome.strategy),
            container_count: settled.final_count,
            stabilization_rounds: settled.rounds,
            stabilized: settled.stable,
            rejections,
        };
        Ok((stats, records))
    }

    /// Move from page `target - 1` to `target`. `Ok(false)` when every route failed.
    async fn navigate_to_page<P>(&self, page: &mut P, category: &Category, target: u32) -> RenderResult<bool>
    where
        P: PageRenderHandle + ?Sized,
    {
        let current = page
            .current_url()
            .unwrap_or_else(|| category.source_url.clone());

        for selector in self.selectors.next_page_for(target) {
            let Some(href) = first_href(page, &selector)? else {
                continue;
            };
            let Some(next) = resolve(&current, &href) else {
                continue;
            };
            if next == current {
                continue;
            }
            debug!("Following next-page control {} -> {}", selector, next);
            if self.try_page(page, &next, target).await? {
                return Ok(true);
            }
        }

        let Some(next) = with_page_param(&current, &self.selectors.page_param, target) else {
            return Ok(false);
        };
        debug!("Rewriting page parameter -> {}", next);
        self.try_page(page, &next, target).await
    }

    async fn try_page<P>(&self, page: &mut P, url: &str, target: u32) -> RenderResult<bool>
    where
        P: PageRenderHandle + ?Sized,
    {
        match page
            .navigate(url, self.scrape.navigation_timeout(), WaitUntil::DomContentLoaded)
            .await
        {
            Ok(()) => self.confirm_page(page, target),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                debug!("Navigation attempt failed: {}", e);
                Ok(false)
            }
        }
    }

    /// The URL names the target page, or enough containers rendered
    fn confirm_page<P>(&self, page: &P, target: u32) -> RenderResult<bool>
    where
        P: PageRenderHandle + ?Sized,
    {
        if let Some(url) = page.current_url() {
            if url_names_page(&url, &self.selectors.page_param, target) {
                return Ok(true);
            }
        }
        let count = count_or_zero(page, &self.selectors.record_container())?;
        Ok(count >= self.scrape.page_change_min_containers)
    }
}

fn count_or_zero<P>(page: &P, selector: &str) -> RenderResult<usize>
where
    P: PageRenderHandle + ?Sized,
{
    match page.query_all(selector) {
        Ok(found) => Ok(found.len()),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!("Container count unavailable: {}", e);
            Ok(0)
        }
    }
}

fn first_href<P>(page: &P, selector: &str) -> RenderResult<Option<String>>
where
    P: PageRenderHandle + ?Sized,
{
    let found = match page.query_all(selector) {
        Ok(found) => found,
        Err(e) if e.is_fatal() => return Err(e),
        Err(_) => return Ok(None),
    };
    for element in found {
        if let Some(href) = page.element_attribute(element, "href")? {
            if !href.trim().is_empty() {
                return Ok(Some(href.trim().to_string()));
            }
        }
    }
    Ok(None)
}

fn resolve(base: &str, href: &str) -> Option<String> {
    Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string())
}

/// `url` with its page parameter set to `page`, other query pairs kept
pub fn with_page_param(url: &str, param: &str, page: u32) -> Option<String> {
    let mut url = Url::parse(url).ok()?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != param)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(param, &page.to_string());
    Some(url.to_string())
}

/// `pg=<n>` (or `page=<n>`) in the query string
pub fn url_names_page(url: &str, param: &str, page: u32) -> bool {
    let Ok(url) = Url::parse(url) else {
        return false;
    };
    let target = page.to_string();
    url.query_pairs()
        .any(|(key, value)| (key == param || key == "page") && value == target.as_str())
}
