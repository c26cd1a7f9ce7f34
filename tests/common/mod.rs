//! Shared fixtures for the scenario tests: a scripted rendering engine and
//! bestseller listing HTML builders.
#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bestseller_harvest::infrastructure::config::AppConfig;
use bestseller_harvest::infrastructure::render::{
    ElementHandle, PageRenderHandle, RenderError, RenderResult, SnapshotPage, WaitUntil,
};

pub const BASE_URL: &str = "https://www.amazon.in";

enum Route {
    /// Successive renderings of the same URL; each scroll reveals the next one
    Frames(Vec<String>),
    Fail,
    LoseSession,
}

/// Rendering engine double serving canned HTML per URL
#[derive(Default)]
pub struct ScriptedPage {
    routes: HashMap<String, Route>,
    snapshot: SnapshotPage,
    frames: Vec<String>,
    frame: usize,
    pub navigations: Vec<String>,
    pub resets: usize,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: impl Into<String>) -> Self {
        self.with_frames(url, vec![html.into()])
    }

    pub fn with_frames(mut self, url: &str, frames: Vec<String>) -> Self {
        self.routes.insert(url.to_string(), Route::Frames(frames));
        self
    }

    /// Navigation to `url` fails with an ordinary error
    pub fn failing(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Route::Fail);
        self
    }

    /// Navigation to `url` kills the session
    pub fn losing_session(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Route::LoseSession);
        self
    }

    fn show_frame(&mut self, url: &str) {
        if let Some(html) = self.frames.get(self.frame) {
            self.snapshot.load(url, html);
        }
    }
}

#[async_trait(?Send)]
impl PageRenderHandle for ScriptedPage {
    async fn navigate(
        &mut self,
        url: &str,
        _timeout: Duration,
        _wait_until: WaitUntil,
    ) -> RenderResult<()> {
        self.navigations.push(url.to_string());
        match self.routes.get(url) {
            Some(Route::Frames(frames)) => {
                self.frames = frames.clone();
                self.frame = 0;
                self.show_frame(url);
                Ok(())
            }
            Some(Route::LoseSession) => Err(RenderError::SessionLost("browser crashed".into())),
            Some(Route::Fail) => {
                self.snapshot.clear(url);
                Err(RenderError::navigation(url, "HTTP 503"))
            }
            None => {
                self.snapshot.clear(url);
                Err(RenderError::navigation(url, "HTTP 404"))
            }
        }
    }

    fn current_url(&self) -> Option<String> {
        self.snapshot.url().map(str::to_string)
    }

    fn query_all(&self, selector: &str) -> RenderResult<Vec<ElementHandle>> {
        self.snapshot.query_all(selector)
    }

    fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> RenderResult<Vec<ElementHandle>> {
        self.snapshot.query_within(scope, selector)
    }

    fn element_text(&self, element: ElementHandle) -> RenderResult<String> {
        self.snapshot.element_text(element)
    }

    fn element_attribute(
        &self,
        element: ElementHandle,
        name: &str,
    ) -> RenderResult<Option<String>> {
        self.snapshot.element_attribute(element, name)
    }

    fn element_parent(&self, element: ElementHandle) -> RenderResult<Option<ElementHandle>> {
        self.snapshot.element_parent(element)
    }

    async fn scroll_to_bottom(&mut self) -> RenderResult<()> {
        if self.frame + 1 < self.frames.len() {
            self.frame += 1;
            if let Some(url) = self.current_url() {
                self.show_frame(&url);
            }
        }
        Ok(())
    }

    async fn wait_network_idle(&mut self, _timeout: Duration) -> RenderResult<()> {
        Ok(())
    }

    async fn reset(&mut self) -> RenderResult<()> {
        self.resets += 1;
        self.snapshot = SnapshotPage::new();
        self.frames.clear();
        self.frame = 0;
        Ok(())
    }
}

/// Product identifier token for a numeric id
pub fn token(id: usize) -> String {
    format!("B{id:09}")
}

/// A complete bestseller card
pub fn card(rank: usize, id: usize) -> String {
    let token = token(id);
    format!(
        r#"<div data-asin="{token}">
             <span class="zg-bdg-text">#{rank}</span>
             <a class="a-link-normal" href="/Product-{id}/dp/{token}/ref=zg_bs_{rank}">
               <div>Remarkably useful product number {id}</div>
             </a>
             <a class="a-link-normal" aria-label="4.{d} out of 5 stars, 2,048 ratings" href="/product-reviews/{token}">
               <i class="a-icon-star-small"></i>
             </a>
             <span class="_cDEzb_p13n-sc-price_3mJ9Z">₹{id}49.00</span>
           </div>"#,
        d = id % 10
    )
}

/// A card whose product link never rendered
pub fn linkless_card(rank: usize, id: usize) -> String {
    format!(
        r#"<div data-asin="{}"><span class="zg-bdg-text">#{rank}</span><span>loading</span></div>"#,
        token(id)
    )
}

/// Global-selector layout: no identifier markers on the cards
pub fn unmarked_card(rank: usize, id: usize) -> String {
    let token = token(id);
    format!(
        r#"<div class="p13n-grid-item">
             <span class="zg-bdg-text">#{rank}</span>
             <a class="a-link-normal" href="/Item-{id}/dp/{token}">
               <span>Remarkably useful product number {id}</span>
             </a>
             <span class="_cDEzb_p13n-sc-price_3mJ9Z">₹{id}00.00</span>
           </div>"#
    )
}

/// Full listing document; `next` is the href of the next-page control
pub fn listing(cards: &[String], next: Option<&str>) -> String {
    let pagination = next.map_or_else(String::new, |href| {
        format!(r#"<ul class="a-pagination"><li class="a-last"><a href="{href}">Next page</a></li></ul>"#)
    });
    format!(
        "<html><body><div id=\"gridItemRoot\">{}</div>{pagination}</body></html>",
        cards.concat()
    )
}

/// Cards for ranks `ranks`, with identifier ids equal to `first_id + offset`
pub fn cards(ranks: std::ops::RangeInclusive<usize>, first_id: usize) -> Vec<String> {
    let start = *ranks.start();
    ranks.map(|rank| card(rank, first_id + rank - start)).collect()
}

/// Defaults with every wait removed
pub fn fast_config(page_count: u32) -> AppConfig {
    let mut config = AppConfig::default();
    config.scrape.page_count = page_count;
    config.scrape.stabilization_pause_ms = 0;
    config.scrape.network_idle_timeout_ms = 0;
    config.pacing.inter_category_pace_ms_base = 0;
    config.pacing.inter_category_pace_ms_jitter = 0;
    config
}
