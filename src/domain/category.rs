use serde::{Deserialize, Serialize};
use std::fmt;

/// A bestseller category discovered on the landing page.
///
/// Immutable once discovered; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category {
    /// Display name as shown in the category navigation
    pub name: String,
    /// Absolute URL of the first result page
    #[serde(rename = "url")]
    pub source_url: String,
}

impl Category {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.source_url)
    }
}
