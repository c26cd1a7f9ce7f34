//! Category discovery from the bestseller landing page's navigation tree

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use url::Url;

use crate::domain::{Category, clean_text};
use crate::infrastructure::config::SelectorConfig;
use crate::infrastructure::render::{PageRenderHandle, WaitUntil};

/// Navigate to `landing_url` and collect the category links it lists.
///
/// Entries with an empty name or href are skipped; a repeated name keeps its
/// first link.
pub async fn discover_categories<P>(
    page: &mut P,
    landing_url: &str,
    base_url: &str,
    selectors: &SelectorConfig,
    timeout: Duration,
) -> Result<Vec<Category>>
where
    P: PageRenderHandle + ?Sized,
{
    info!("Loading categories from {}", landing_url);
    page.navigate(landing_url, timeout, WaitUntil::DomContentLoaded)
        .await
        .with_context(|| format!("Failed to load category landing page {landing_url}"))?;

    let categories = collect_categories(page, base_url, selectors)?;
    if categories.is_empty() {
        bail!(
            "No categories found with selector '{}'",
            selectors.category_nav_link
        );
    }

    info!("Found {} categories", categories.len());
    Ok(categories)
}

/// Category links on the already rendered page
pub fn collect_categories<P>(
    page: &P,
    base_url: &str,
    selectors: &SelectorConfig,
) -> Result<Vec<Category>>
where
    P: PageRenderHandle + ?Sized,
{
    let base = Url::parse(base_url).with_context(|| format!("Invalid base URL {base_url}"))?;
    let anchors = page.query_all(&selectors.category_nav_link)?;

    let mut seen = HashSet::new();
    let mut categories = Vec::with_capacity(anchors.len());
    for anchor in anchors {
        let name = clean_text(&page.element_text(anchor)?);
        let Some(href) = page.element_attribute(anchor, "href")? else {
            continue;
        };
        if name.is_empty() || href.trim().is_empty() {
            continue;
        }
        let Ok(url) = base.join(href.trim()) else {
            debug!("Skipping category '{}' with unusable href {}", name, href);
            continue;
        };
        if !seen.insert(name.clone()) {
            debug!("Duplicate category name '{}', keeping the first link", name);
            continue;
        }
        categories.push(Category::new(name, url.to_string()));
    }

    Ok(categories)
}
