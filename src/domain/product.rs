use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Product token embedded in detail-page links (`/dp/B0XXXXXXXX`, `/gp/product/B0XXXXXXXX`)
static PRODUCT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/(?:dp|gp/product|gp/aw/d)/([A-Za-z0-9]{10})(?:[/?#]|$)")
        .expect("valid product token pattern")
});

/// Collapse runs of whitespace (newlines included) to single spaces and trim
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Which extraction strategy produced a raw record.
///
/// Ordered by correlation strength, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    IdentifierAnchored,
    GlobalSelectors,
    LinkOnly,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IdentifierAnchored => "identifier_anchored",
            Self::GlobalSelectors => "global_selectors",
            Self::LinkOnly => "link_only",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy-specific intermediate record. Any field may be missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub rank: Option<String>,
    pub name: Option<String>,
    pub link: Option<String>,
    pub rating: Option<String>,
    pub price: Option<String>,
    pub source: StrategyKind,
}

impl RawRecord {
    pub fn empty(source: StrategyKind) -> Self {
        Self {
            rank: None,
            name: None,
            link: None,
            rating: None,
            price: None,
            source,
        }
    }

    pub fn link_only(link: impl Into<String>) -> Self {
        Self {
            link: Some(link.into()),
            ..Self::empty(StrategyKind::LinkOnly)
        }
    }
}

impl From<&ProductRecord> for RawRecord {
    fn from(record: &ProductRecord) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        // only link-only extraction yields records without rank and name
        let source = if record.rank.is_empty() && record.name.is_empty() {
            StrategyKind::LinkOnly
        } else {
            StrategyKind::IdentifierAnchored
        };
        Self {
            rank: non_empty(&record.rank),
            name: non_empty(&record.name),
            link: non_empty(&record.link),
            rating: non_empty(&record.rating),
            price: non_empty(&record.price),
            source,
        }
    }
}

/// Canonical product record.
///
/// `link` is always a non-empty product-detail URL; the other fields may be empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub rank: String,
    pub name: String,
    pub link: String,
    pub rating: String,
    pub price: String,
}

impl ProductRecord {
    pub fn identifier(&self) -> ProductIdentifier {
        ProductIdentifier::from_link(&self.link)
    }

    /// Both rank and name present
    pub fn is_complete(&self) -> bool {
        !self.rank.is_empty() && !self.name.is_empty()
    }
}

/// Deduplication key derived from a product link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProductIdentifier {
    /// Site product token extracted from the link
    Token(String),
    /// Full normalized link when no token is present
    Link(String),
}

impl ProductIdentifier {
    pub fn from_link(link: &str) -> Self {
        PRODUCT_TOKEN
            .captures(link)
            .and_then(|caps| caps.get(1))
            .map_or_else(
                || Self::Link(link.to_string()),
                |m| Self::Token(m.as_str().to_ascii_uppercase()),
            )
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Token(s) | Self::Link(s) => s,
        }
    }
}

impl fmt::Display for ProductIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => write!(f, "token:{token}"),
            Self::Link(link) => write!(f, "link:{link}"),
        }
    }
}

/// Why the normalizer refused a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RejectReason {
    #[serde(rename = "missing-link")]
    MissingLink,
    #[serde(rename = "invalid-link-pattern")]
    InvalidLinkPattern,
    #[serde(rename = "missing-rank-and-name")]
    MissingRankAndName,
}

impl RejectReason {
    pub fn tag(self) -> &'static str {
        match self {
            Self::MissingLink => "missing-link",
            Self::InvalidLinkPattern => "invalid-link-pattern",
            Self::MissingRankAndName => "missing-rank-and-name",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_uses_product_token() {
        let id = ProductIdentifier::from_link(
            "https://www.amazon.in/Some-Book/dp/B0C1234567/ref=zg_bs_books_1?psc=1",
        );
        assert_eq!(id, ProductIdentifier::Token("B0C1234567".into()));
    }

    #[test]
    fn identifier_token_ignores_slug_and_query() {
        let a = ProductIdentifier::from_link("https://www.amazon.in/A/dp/B0C1234567/ref=x");
        let b = ProductIdentifier::from_link("https://www.amazon.in/B/dp/b0c1234567?th=1");
        assert_eq!(a, b);
    }

    #[test]
    fn identifier_falls_back_to_link() {
        let link = "https://www.amazon.in/gp/bestsellers/books";
        assert_eq!(
            ProductIdentifier::from_link(link),
            ProductIdentifier::Link(link.to_string())
        );
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Echo \n\n  Dot\t(5th Gen) "), "Echo Dot (5th Gen)");
        assert_eq!(clean_text(" \n "), "");
    }

    #[test]
    fn completeness_needs_rank_and_name() {
        let mut record = ProductRecord {
            rank: "#1".into(),
            name: "A reasonably long product title".into(),
            link: "https://www.amazon.in/dp/B0C1234567".into(),
            rating: String::new(),
            price: String::new(),
        };
        assert!(record.is_complete());
        record.rank.clear();
        assert!(!record.is_complete());
    }
}
