//! Rendering engine capability interface
//!
//! The extraction engine never talks to a concrete browser. It only needs the
//! primitives below; adapters (a DOM snapshot, a remote rendering endpoint, a
//! scripted test double) implement them.
//!
//! Navigation, scrolling and idle waits suspend. Queries, text and attribute
//! reads are synchronous: once a page is rendered the DOM is in hand.

pub mod remote;
pub mod snapshot;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use remote::{RemoteRenderSession, RenderBackend};
pub use snapshot::SnapshotPage;

/// Opaque reference to an element of the currently rendered document.
///
/// Handles are invalidated by navigation; using a stale handle is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub(crate) generation: u64,
    pub(crate) index: usize,
}

impl ElementHandle {
    pub fn new(generation: u64, index: usize) -> Self {
        Self { generation, index }
    }
}

/// Load state a navigation waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    #[default]
    DomContentLoaded,
    Load,
    NetworkIdle,
}

impl WaitUntil {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DomContentLoaded => "domcontentloaded",
            Self::Load => "load",
            Self::NetworkIdle => "networkidle2",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Invalid CSS selector: {selector} - {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Element handle is stale or unknown")]
    StaleElement,

    #[error("Nothing has been rendered yet")]
    NoDocument,

    #[error("Render session unusable: {0}")]
    SessionLost(String),
}

impl RenderError {
    pub fn navigation(url: &str, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The session cannot serve further requests for this category
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

/// What the extraction engine needs from a rendering engine.
///
/// A handle owns exclusive page-navigation state and is never shared by two
/// categories at once, so futures are not required to be `Send`.
#[async_trait(?Send)]
pub trait PageRenderHandle {
    /// Load `url`, giving up after `timeout`
    async fn navigate(&mut self, url: &str, timeout: Duration, wait_until: WaitUntil)
    -> RenderResult<()>;

    /// URL of the currently rendered document
    fn current_url(&self) -> Option<String>;

    /// All elements matching `selector`, in document order
    fn query_all(&self, selector: &str) -> RenderResult<Vec<ElementHandle>>;

    /// Descendants of `scope` matching `selector`, in document order
    fn query_within(&self, scope: ElementHandle, selector: &str)
    -> RenderResult<Vec<ElementHandle>>;

    /// Visible text of an element
    fn element_text(&self, element: ElementHandle) -> RenderResult<String>;

    /// Attribute value, `None` when absent
    fn element_attribute(&self, element: ElementHandle, name: &str)
    -> RenderResult<Option<String>>;

    /// Parent element, `None` at the document root
    fn element_parent(&self, element: ElementHandle) -> RenderResult<Option<ElementHandle>>;

    async fn scroll_to_bottom(&mut self) -> RenderResult<()>;

    /// Wait until the network has been quiet; `Timeout` is a soft signal
    async fn wait_network_idle(&mut self, timeout: Duration) -> RenderResult<()>;

    /// Restore a usable session after a fatal error. Default: nothing to do.
    async fn reset(&mut self) -> RenderResult<()> {
        Ok(())
    }
}
