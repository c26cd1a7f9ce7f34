//! DOM snapshot adapter over `scraper`
//!
//! Holds one parsed document and answers selector queries against it. Element
//! handles are document-order indices tagged with a generation that changes on
//! every load, so handles from a previous page are rejected.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::debug;

use super::{ElementHandle, PageRenderHandle, RenderError, RenderResult, WaitUntil};

#[derive(Debug, Default)]
pub struct SnapshotPage {
    url: Option<String>,
    document: Option<Html>,
    generation: u64,
}

impl SnapshotPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_html(url: impl Into<String>, html: &str) -> Self {
        let mut page = Self::new();
        page.load(url, html);
        page
    }

    /// Replace the current document
    pub fn load(&mut self, url: impl Into<String>, html: &str) {
        self.generation += 1;
        self.url = Some(url.into());
        self.document = Some(Html::parse_document(html));
    }

    /// Drop the current document but remember where we tried to go
    pub fn clear(&mut self, url: impl Into<String>) {
        self.generation += 1;
        self.url = Some(url.into());
        self.document = Some(Html::new_document());
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn document(&self) -> RenderResult<&Html> {
        self.document.as_ref().ok_or(RenderError::NoDocument)
    }

    fn compile(selector: &str) -> RenderResult<Selector> {
        Selector::parse(selector).map_err(|e| RenderError::InvalidSelector {
            selector: selector.to_string(),
            reason: format!("{e:?}"),
        })
    }

    fn handle(&self, index: usize) -> ElementHandle {
        ElementHandle::new(self.generation, index)
    }

    fn resolve(&self, element: ElementHandle) -> RenderResult<ElementRef<'_>> {
        if element.generation != self.generation {
            return Err(RenderError::StaleElement);
        }
        elements(self.document()?)
            .nth(element.index)
            .ok_or(RenderError::StaleElement)
    }

    pub fn query_all(&self, selector: &str) -> RenderResult<Vec<ElementHandle>> {
        let selector = Self::compile(selector)?;
        Ok(elements(self.document()?)
            .enumerate()
            .filter(|(_, el)| selector.matches(el))
            .map(|(i, _)| self.handle(i))
            .collect())
    }

    pub fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>> {
        let selector = Self::compile(selector)?;
        let scope_id = self.resolve(scope)?.id();

        // descendants of an element are contiguous right after it in document order
        Ok(elements(self.document()?)
            .enumerate()
            .skip(scope.index + 1)
            .take_while(|(_, el)| el.ancestors().any(|a| a.id() == scope_id))
            .filter(|(_, el)| selector.matches(el))
            .map(|(i, _)| self.handle(i))
            .collect())
    }

    pub fn element_text(&self, element: ElementHandle) -> RenderResult<String> {
        Ok(self.resolve(element)?.text().collect::<String>())
    }

    pub fn element_attribute(
        &self,
        element: ElementHandle,
        name: &str,
    ) -> RenderResult<Option<String>> {
        Ok(self
            .resolve(element)?
            .value()
            .attr(name)
            .map(str::to_string))
    }

    pub fn element_parent(&self, element: ElementHandle) -> RenderResult<Option<ElementHandle>> {
        let Some(parent_id) = self
            .resolve(element)?
            .parent()
            .and_then(ElementRef::wrap)
            .map(|p| p.id())
        else {
            return Ok(None);
        };

        Ok(elements(self.document()?)
            .take(element.index)
            .position(|el| el.id() == parent_id)
            .map(|i| self.handle(i)))
    }
}

/// Every element of the document, in document order
fn elements(html: &Html) -> impl Iterator<Item = ElementRef<'_>> {
    html.tree.root().descendants().filter_map(ElementRef::wrap)
}

/// A bare snapshot can only "navigate" to the page it already holds.
#[async_trait(?Send)]
impl PageRenderHandle for SnapshotPage {
    async fn navigate(
        &mut self,
        url: &str,
        _timeout: Duration,
        _wait_until: WaitUntil,
    ) -> RenderResult<()> {
        if self.url.as_deref() == Some(url) && self.document.is_some() {
            debug!("Snapshot already holds {}", url);
            return Ok(());
        }
        self.clear(url);
        Err(RenderError::navigation(url, "snapshot pages cannot fetch"))
    }

    fn current_url(&self) -> Option<String> {
        self.url.clone()
    }

    fn query_all(&self, selector: &str) -> RenderResult<Vec<ElementHandle>> {
        Self::query_all(self, selector)
    }

    fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>> {
        Self::query_within(self, scope, selector)
    }

    fn element_text(&self, element: ElementHandle) -> RenderResult<String> {
        Self::element_text(self, element)
    }

    fn element_attribute(
        &self,
        element: ElementHandle,
        name: &str,
    ) -> RenderResult<Option<String>> {
        Self::element_attribute(self, element, name)
    }

    fn element_parent(&self, element: ElementHandle) -> RenderResult<Option<ElementHandle>> {
        Self::element_parent(self, element)
    }

    async fn scroll_to_bottom(&mut self) -> RenderResult<()> {
        Ok(())
    }

    async fn wait_network_idle(&mut self, _timeout: Duration) -> RenderResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div id="grid">
            <div data-asin="B000000001"><a class="a-link-normal" href="/x/dp/B000000001">First <b>product</b></a></div>
            <div data-asin=""><span>spacer</span></div>
            <div data-asin="B000000002"><span class="zg-bdg-text">#2</span></div>
          </div>
          <p data-asin="B000000009">outside</p>
        </body></html>
    "#;

    #[test]
    fn query_all_respects_marker_selector() {
        let page = SnapshotPage::from_html("https://example.test/", PAGE);
        let found = page.query_all(r#"[data-asin]:not([data-asin=""])"#).unwrap();
        assert_eq!(found.len(), 3);
    }

    #[test]
    fn query_within_is_scoped_to_descendants() {
        let page = SnapshotPage::from_html("https://example.test/", PAGE);
        let grid = page.query_all("#grid").unwrap()[0];
        let inner = page.query_within(grid, "[data-asin]").unwrap();
        assert_eq!(inner.len(), 3);

        let first = page.query_all(r#"[data-asin="B000000001"]"#).unwrap()[0];
        assert!(page.query_within(first, ".zg-bdg-text").unwrap().is_empty());
        assert_eq!(page.query_within(first, "a").unwrap().len(), 1);
    }

    #[test]
    fn text_concatenates_descendant_text() {
        let page = SnapshotPage::from_html("https://example.test/", PAGE);
        let link = page.query_all("a").unwrap()[0];
        assert_eq!(page.element_text(link).unwrap(), "First product");
        assert_eq!(
            page.element_attribute(link, "href").unwrap().as_deref(),
            Some("/x/dp/B000000001")
        );
        assert_eq!(page.element_attribute(link, "title").unwrap(), None);
    }

    #[test]
    fn parent_lookup_walks_up_one_level() {
        let page = SnapshotPage::from_html("https://example.test/", PAGE);
        let badge = page.query_all(".zg-bdg-text").unwrap()[0];
        let parent = page.element_parent(badge).unwrap().unwrap();
        assert_eq!(
            page.element_attribute(parent, "data-asin").unwrap().as_deref(),
            Some("B000000002")
        );
    }

    #[test]
    fn handles_go_stale_after_reload() {
        let mut page = SnapshotPage::from_html("https://example.test/", PAGE);
        let link = page.query_all("a").unwrap()[0];
        page.load("https://example.test/2", PAGE);
        assert_eq!(page.element_text(link), Err(RenderError::StaleElement));
    }

    #[test]
    fn invalid_selector_is_reported() {
        let page = SnapshotPage::from_html("https://example.test/", PAGE);
        assert!(matches!(
            page.query_all("div[[["),
            Err(RenderError::InvalidSelector { .. })
        ));
    }

    #[tokio::test]
    async fn navigating_elsewhere_fails_and_clears() {
        let mut page = SnapshotPage::from_html("https://example.test/", PAGE);
        let err = page
            .navigate("https://example.test/other", Duration::from_secs(1), WaitUntil::Load)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Navigation { .. }));
        assert!(page.query_all("a").unwrap().is_empty());
        assert_eq!(page.url(), Some("https://example.test/other"));
    }
}
