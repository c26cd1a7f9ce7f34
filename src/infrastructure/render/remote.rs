//! Remote rendering session
//!
//! Fetches HTML either directly over HTTP or through a Browserless-style
//! `/content` endpoint that returns the DOM after the page's scripts ran,
//! then answers queries from a [`SnapshotPage`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::snapshot::SnapshotPage;
use super::{ElementHandle, PageRenderHandle, RenderError, RenderResult, WaitUntil};
use crate::infrastructure::config::RenderConfig;

/// Where HTML comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderBackend {
    /// Plain GET; no script execution
    Direct,
    /// Headless browser behind a `/content` endpoint
    Browserless {
        endpoint: String,
        token: Option<String>,
    },
}

impl RenderBackend {
    pub fn from_config(config: &RenderConfig) -> Self {
        match &config.endpoint {
            Some(endpoint) => Self::Browserless {
                endpoint: endpoint.trim_end_matches('/').to_string(),
                token: config.token.clone(),
            },
            None => Self::Direct,
        }
    }

    fn content_endpoint(endpoint: &str, token: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{endpoint}/content"))?;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }
}

pub struct RemoteRenderSession {
    client: Client,
    backend: RenderBackend,
    snapshot: SnapshotPage,
    rerender_on_scroll: bool,
    last_wait: WaitUntil,
    last_timeout: Duration,
}

impl RemoteRenderSession {
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let backend = RenderBackend::from_config(config);
        if let RenderBackend::Browserless { endpoint, token } = &backend {
            RenderBackend::content_endpoint(endpoint, token.as_deref())
                .with_context(|| format!("Invalid render endpoint '{endpoint}'"))?;
        }
        Ok(Self {
            client: build_client(config)?,
            backend,
            snapshot: SnapshotPage::new(),
            rerender_on_scroll: config.rerender_on_scroll,
            last_wait: WaitUntil::default(),
            last_timeout: Duration::from_secs(30),
        })
    }

    pub fn backend(&self) -> &RenderBackend {
        &self.backend
    }

    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        wait_until: WaitUntil,
    ) -> RenderResult<(String, String)> {
        let request = match &self.backend {
            RenderBackend::Direct => self.client.get(url),
            RenderBackend::Browserless { endpoint, token } => {
                let body = serde_json::json!({
                    "url": url,
                    "gotoOptions": {
                        "waitUntil": wait_until.as_str(),
                        "timeout": u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }
                });
                let content = RenderBackend::content_endpoint(endpoint, token.as_deref())
                    .map_err(|e| RenderError::SessionLost(format!("render endpoint unusable: {e}")))?;
                self.client.post(content).json(&body)
            }
        };

        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.classify(url, &e))?;

        let status = response.status();
        let final_url = match self.backend {
            RenderBackend::Direct => response.url().to_string(),
            RenderBackend::Browserless { .. } => url.to_string(),
        };

        if !status.is_success() {
            return Err(self.status_error(url, status));
        }

        let html = response
            .text()
            .await
            .map_err(|e| self.classify(url, &e))?;
        Ok((final_url, html))
    }

    fn classify(&self, url: &str, error: &reqwest::Error) -> RenderError {
        if error.is_timeout() {
            return RenderError::navigation(url, format!("timed out: {error}"));
        }
        // An unreachable rendering service will not recover for the next page either
        if error.is_connect() && matches!(self.backend, RenderBackend::Browserless { .. }) {
            return RenderError::SessionLost(format!("rendering endpoint unreachable: {error}"));
        }
        RenderError::navigation(url, error.to_string())
    }

    fn status_error(&self, url: &str, status: StatusCode) -> RenderError {
        let rejected = status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
        if rejected && matches!(self.backend, RenderBackend::Browserless { .. }) {
            return RenderError::SessionLost(format!(
                "rendering endpoint rejected credentials ({status})"
            ));
        }
        RenderError::navigation(url, format!("HTTP {status}"))
    }
}

fn build_client(config: &RenderConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_str(&config.accept_language)
            .context("Invalid Accept-Language header value")?,
    );

    Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
        .context("Failed to build HTTP client")
}

#[async_trait(?Send)]
impl PageRenderHandle for RemoteRenderSession {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
        wait_until: WaitUntil,
    ) -> RenderResult<()> {
        self.last_wait = wait_until;
        self.last_timeout = timeout;

        match self.fetch(url, timeout, wait_until).await {
            Ok((final_url, html)) => {
                debug!("Rendered {} ({} bytes)", final_url, html.len());
                self.snapshot.load(final_url, &html);
                Ok(())
            }
            Err(e) => {
                self.snapshot.clear(url);
                Err(e)
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

    /// Re-renders the current page when configured; a static snapshot cannot grow.
    async fn scroll_to_bottom(&mut self) -> RenderResult<()> {
        if !self.rerender_on_scroll || matches!(self.backend, RenderBackend::Direct) {
            return Ok(());
        }
        let Some(url) = self.snapshot.url().map(str::to_string) else {
            return Err(RenderError::NoDocument);
        };
        let (final_url, html) = self.fetch(&url, self.last_timeout, self.last_wait).await?;
        self.snapshot.load(final_url, &html);
        Ok(())
    }

    async fn wait_network_idle(&mut self, _timeout: Duration) -> RenderResult<()> {
        Ok(())
    }

    async fn reset(&mut self) -> RenderResult<()> {
        warn!("Resetting render session");
        self.snapshot = SnapshotPage::new();
        Ok(())
    }
}
