//! Ordered extraction strategies
//!
//! Strategies are ordered by how well they tie fields to the right product,
//! not by how much they return. The chain accepts the first one whose usable
//! yield reaches the threshold and otherwise falls back to the best yield seen.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::domain::{ProductIdentifier, RawRecord, StrategyKind, clean_text};
use crate::infrastructure::config::{ScrapeConfig, SelectorConfig};
use crate::infrastructure::render::{ElementHandle, PageRenderHandle, RenderResult};

/// Link text that is really a rating ("4.5 out of 5 stars")
static RATING_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\d+\.?\d*\s*out\s*of\s*5").expect("valid rating prefix pattern")
});

static RATING_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+\.?\d*)\s*out\s*of\s*5").expect("valid rating phrase pattern")
});

/// Rupee amounts: `₹1,234.00`, `Rs 1,234`, `Rs.99`
static PRICE_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:₹|Rs\.?\s*)([0-9,]+(?:\.[0-9]{2})?)").expect("valid price pattern")
});

/// Rating elements inspected per lookup
const RATING_CANDIDATES: usize = 3;

/// Selector set and limits shared by all strategies
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    pub selectors: SelectorConfig,
    product_link_pattern: Regex,
    pub min_name_chars: usize,
    pub max_anchors: usize,
}

impl ExtractionRules {
    pub fn new(
        selectors: SelectorConfig,
        min_name_chars: usize,
        max_anchors: usize,
    ) -> Result<Self, regex::Error> {
        let product_link_pattern = Regex::new(&selectors.product_link_pattern)?;
        Ok(Self {
            selectors,
            product_link_pattern,
            min_name_chars,
            max_anchors,
        })
    }

    pub fn from_config(selectors: &SelectorConfig, scrape: &ScrapeConfig) -> Result<Self, regex::Error> {
        Self::new(selectors.clone(), scrape.min_name_chars, scrape.max_anchors_per_page)
    }

    pub fn is_product_link(&self, href: &str) -> bool {
        self.product_link_pattern.is_match(href)
    }

    /// Link text long enough to be a title and not a rating blurb
    pub fn is_product_name(&self, text: &str) -> bool {
        text.chars().count() > self.min_name_chars
            && !RATING_PREFIX.is_match(text)
            && !text.to_lowercase().contains("star")
    }
}

/// One extraction strategy of the fixed chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Fields scoped to each identifier-marked container
    IdentifierAnchored,
    /// Page-wide selector lists zipped by position
    GlobalSelectors,
    /// Product-detail links only
    LinkOnly,
}

impl ExtractionStrategy {
    pub const DEFAULT_ORDER: [Self; 3] =
        [Self::IdentifierAnchored, Self::GlobalSelectors, Self::LinkOnly];

    pub fn kind(self) -> StrategyKind {
        match self {
            Self::IdentifierAnchored => StrategyKind::IdentifierAnchored,
            Self::GlobalSelectors => StrategyKind::GlobalSelectors,
            Self::LinkOnly => StrategyKind::LinkOnly,
        }
    }

    pub fn attempt<P>(
        self,
        page: &P,
        rules: &ExtractionRules,
        page_limit: usize,
    ) -> RenderResult<Vec<RawRecord>>
    where
        P: PageRenderHandle + ?Sized,
    {
        match self {
            Self::IdentifierAnchored => identifier_anchored(page, rules),
            Self::GlobalSelectors => global_selectors(page, rules, page_limit),
            Self::LinkOnly => link_only(page, rules, page_limit),
        }
    }
}

/// Yield of one strategy on one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyAttempt {
    pub kind: StrategyKind,
    pub raw_count: usize,
    /// Raw records carrying a link
    pub usable: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Strategy whose records were kept
    pub strategy: StrategyKind,
    pub records: Vec<RawRecord>,
    pub attempts: Vec<StrategyAttempt>,
    /// False when nothing met the threshold and the best yield was taken
    pub accepted: bool,
}

pub struct ExtractionStrategyChain {
    strategies: Vec<ExtractionStrategy>,
    rules: ExtractionRules,
    min_acceptable_yield: usize,
}

impl ExtractionStrategyChain {
    pub fn new(rules: ExtractionRules, min_acceptable_yield: usize) -> Self {
        Self::with_strategies(rules, min_acceptable_yield, ExtractionStrategy::DEFAULT_ORDER.to_vec())
    }

    pub fn with_strategies(
        rules: ExtractionRules,
        min_acceptable_yield: usize,
        strategies: Vec<ExtractionStrategy>,
    ) -> Self {
        Self {
            strategies,
            rules,
            min_acceptable_yield,
        }
    }

    pub fn from_config(selectors: &SelectorConfig, scrape: &ScrapeConfig) -> Result<Self, regex::Error> {
        Ok(Self::new(
            ExtractionRules::from_config(selectors, scrape)?,
            scrape.min_acceptable_yield,
        ))
    }

    /// `min(min_acceptable_yield, page_limit / 2)`, at least 1
    pub fn threshold(&self, page_limit: usize) -> usize {
        self.min_acceptable_yield.min(page_limit / 2).max(1)
    }

    /// Run strategies in order until one yields enough usable records.
    ///
    /// Non-fatal render errors inside a strategy count as an empty yield; a
    /// fatal one aborts the chain.
    pub fn extract<P>(&self, page: &P, page_limit: usize) -> RenderResult<ChainOutcome>
    where
        P: PageRenderHandle + ?Sized,
    {
        let threshold = self.threshold(page_limit);
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let mut best: Option<(StrategyKind, Vec<RawRecord>, usize)> = None;

        for strategy in &self.strategies {
            let kind = strategy.kind();
            let records = match strategy.attempt(page, &self.rules, page_limit) {
                Ok(records) => records,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Strategy {} failed: {}", kind, e);
                    Vec::new()
                }
            };

            let usable = records
                .iter()
                .filter(|r| r.link.as_deref().is_some_and(|l| !l.trim().is_empty()))
                .count();
            attempts.push(StrategyAttempt {
                kind,
                raw_count: records.len(),
                usable,
            });
            debug!("Strategy {}: {} raw, {} usable (threshold {})", kind, records.len(), usable, threshold);

            if usable >= threshold {
                return Ok(ChainOutcome {
                    strategy: kind,
                    records,
                    attempts,
                    accepted: true,
                });
            }

            if best.as_ref().is_none_or(|(_, _, best_usable)| usable > *best_usable) {
                best = Some((kind, records, usable));
            }
        }

        let (strategy, records, usable) = best.unwrap_or((StrategyKind::LinkOnly, Vec::new(), 0));
        debug!("No strategy met threshold {}, keeping {} ({} usable)", threshold, strategy, usable);
        Ok(ChainOutcome {
            strategy,
            records,
            attempts,
            accepted: false,
        })
    }
}

/// Non-fatal render errors become `None`; fatal ones propagate
fn tolerate<T>(result: RenderResult<T>) -> RenderResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!("Skipping element: {}", e);
            Ok(None)
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn first_within<P>(page: &P, scope: ElementHandle, selector: &str) -> RenderResult<Option<ElementHandle>>
where
    P: PageRenderHandle + ?Sized,
{
    Ok(tolerate(page.query_within(scope, selector))?.and_then(|found| found.first().copied()))
}

fn text_of<P>(page: &P, element: ElementHandle) -> RenderResult<String>
where
    P: PageRenderHandle + ?Sized,
{
    Ok(tolerate(page.element_text(element))?
        .map(|t| clean_text(&t))
        .unwrap_or_default())
}

fn attribute_of<P>(page: &P, element: ElementHandle, name: &str) -> RenderResult<Option<String>>
where
    P: PageRenderHandle + ?Sized,
{
    Ok(tolerate(page.element_attribute(element, name))?.flatten())
}

/* ---------------- Strategy A: identifier-anchored ---------------- */

fn identifier_anchored<P>(page: &P, rules: &ExtractionRules) -> RenderResult<Vec<RawRecord>>
where
    P: PageRenderHandle + ?Sized,
{
    let anchors = page.query_all(&rules.selectors.record_container())?;
    debug!("Found {} identifier-marked containers", anchors.len());

    anchors
        .into_iter()
        .take(rules.max_anchors)
        .map(|anchor| anchored_record(page, anchor, rules))
        .collect()
}

fn anchored_record<P>(page: &P, anchor: ElementHandle, rules: &ExtractionRules) -> RenderResult<RawRecord>
where
    P: PageRenderHandle + ?Sized,
{
    let mut record = RawRecord::empty(StrategyKind::IdentifierAnchored);
    let selectors = &rules.selectors;

    let links = tolerate(page.query_within(anchor, &selectors.product_link))?.unwrap_or_default();
    let mut fallback_link = None;
    for link in links {
        let Some(href) = attribute_of(page, link, "href")?.filter(|h| !h.trim().is_empty()) else {
            continue;
        };
        let text = text_of(page, link)?;
        if rules.is_product_name(&text) {
            record.name = Some(text);
            record.link = Some(href);
            break;
        }
        fallback_link.get_or_insert(href);
    }
    if record.link.is_none() {
        record.link = fallback_link;
    }

    if let Some(badge) = first_within(page, anchor, &selectors.rank_badge)? {
        record.rank = non_empty(text_of(page, badge)?);
    }
    record.rating = anchored_rating(page, anchor, selectors)?;
    record.price = anchored_price(page, anchor, selectors)?;

    Ok(record)
}

fn anchored_rating<P>(page: &P, anchor: ElementHandle, selectors: &SelectorConfig) -> RenderResult<Option<String>>
where
    P: PageRenderHandle + ?Sized,
{
    let rating_links = tolerate(page.query_within(anchor, &selectors.rating_link))?.unwrap_or_default();
    for link in rating_links.into_iter().take(RATING_CANDIDATES) {
        if let Some(label) = attribute_of(page, link, "aria-label")? {
            if label.contains("out of 5") {
                return Ok(Some(clean_text(&label)));
            }
        }
    }

    if let Some(icon) = first_within(page, anchor, &selectors.rating_icon)? {
        if let Some(parent) = tolerate(page.element_parent(icon))?.flatten() {
            let text = text_of(page, parent)?;
            if text.contains("out of") || text.to_lowercase().contains("rating") {
                return Ok(Some(text));
            }
        }
    }

    let rating_texts = tolerate(page.query_within(anchor, &selectors.rating_text))?.unwrap_or_default();
    for element in rating_texts.into_iter().take(RATING_CANDIDATES) {
        let text = text_of(page, element)?;
        if text.contains("out of") || text.to_lowercase().contains("star") {
            return Ok(Some(text));
        }
    }

    let container_text = text_of(page, anchor)?;
    Ok(RATING_PHRASE
        .captures(&container_text)
        .map(|caps| format!("{} out of 5 stars", &caps[1])))
}

fn anchored_price<P>(page: &P, anchor: ElementHandle, selectors: &SelectorConfig) -> RenderResult<Option<String>>
where
    P: PageRenderHandle + ?Sized,
{
    for selector in &selectors.price {
        if let Some(element) = first_within(page, anchor, selector)? {
            let text = text_of(page, element)?;
            if text.contains('₹') || text.contains("Rs") {
                return Ok(Some(text));
            }
        }
    }

    let container_text = text_of(page, anchor)?;
    Ok(PRICE_PHRASE
        .captures(&container_text)
        .map(|caps| format!("₹{}", &caps[1])))
}

/* ---------------- Strategy B: global selectors ---------------- */

fn global_selectors<P>(page: &P, rules: &ExtractionRules, page_limit: usize) -> RenderResult<Vec<RawRecord>>
where
    P: PageRenderHandle + ?Sized,
{
    let selectors = &rules.selectors;
    let links = page.query_all(&selectors.product_link)?;
    let ranks = tolerate(page.query_all(&selectors.rank_badge))?.unwrap_or_default();
    let prices = match selectors.price.first() {
        Some(selector) => tolerate(page.query_all(selector))?.unwrap_or_default(),
        None => Vec::new(),
    };
    let ratings = tolerate(page.query_all(&selectors.rating_link))?.unwrap_or_default();
    debug!("Global selectors: {} product links found", links.len());

    let mut products = Vec::new();
    for link in links {
        let Some(href) = attribute_of(page, link, "href")? else {
            continue;
        };
        if !rules.is_product_link(&href) {
            continue;
        }
        let text = text_of(page, link)?;
        if rules.is_product_name(&text) {
            products.push((text, href));
        }
    }
    debug!("Filtered to {} product name links", products.len());

    // i-th name link pairs with the i-th badge, price and rating
    let mut records = Vec::new();
    for (i, (name, href)) in products.into_iter().take(page_limit).enumerate() {
        let mut record = RawRecord::empty(StrategyKind::GlobalSelectors);
        record.name = Some(name);
        record.link = Some(href);
        if let Some(&badge) = ranks.get(i) {
            record.rank = non_empty(text_of(page, badge)?);
        }
        if let Some(&price) = prices.get(i) {
            record.price = non_empty(text_of(page, price)?);
        }
        if let Some(&rating) = ratings.get(i) {
            record.rating = attribute_of(page, rating, "aria-label")?
                .map(|label| clean_text(&label))
                .and_then(non_empty);
        }
        records.push(record);
    }
    Ok(records)
}

/* ---------------- Strategy C: link only ---------------- */

fn link_only<P>(page: &P, rules: &ExtractionRules, page_limit: usize) -> RenderResult<Vec<RawRecord>>
where
    P: PageRenderHandle + ?Sized,
{
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for link in page.query_all(&rules.selectors.product_anchor)? {
        if records.len() >= page_limit {
            break;
        }
        let Some(href) = attribute_of(page, link, "href")? else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || !rules.is_product_link(href) {
            continue;
        }
        if seen.insert(ProductIdentifier::from_link(href)) {
            records.push(RawRecord::link_only(href));
        }
    }
    Ok(records)
}
