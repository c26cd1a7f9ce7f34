//! Raw record normalization and deduplication
//!
//! Pure transforms: text is whitespace-collapsed, ranks become `#<n>`, links
//! are resolved to absolute product-detail URLs. Rating and price stay as the
//! site wrote them.

use std::collections::HashSet;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::domain::{
    ProductRecord, RawRecord, RejectReason, RejectionCounts, StrategyKind, clean_text,
};
use crate::infrastructure::config::{ScrapeConfig, SelectorConfig};

static RANK_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#?(\d+)").expect("valid rank pattern"));

/// Result of normalizing one raw record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    Record(ProductRecord),
    Rejected(RejectReason),
}

#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    base_url: Url,
    product_link_pattern: Regex,
    max_name_chars: usize,
    max_rating_chars: usize,
}

impl RecordNormalizer {
    pub fn new(
        base_url: Url,
        product_link_pattern: Regex,
        max_name_chars: usize,
        max_rating_chars: usize,
    ) -> Self {
        Self {
            base_url,
            product_link_pattern,
            max_name_chars,
            max_rating_chars,
        }
    }

    pub fn from_config(base_url: &str, selectors: &SelectorConfig, scrape: &ScrapeConfig) -> Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("Invalid base URL {base_url}"))?;
        let pattern = Regex::new(&selectors.product_link_pattern).with_context(|| {
            format!("Invalid product link pattern {}", selectors.product_link_pattern)
        })?;
        Ok(Self::new(base_url, pattern, scrape.max_name_chars, scrape.max_rating_chars))
    }

    pub fn normalize(&self, raw: &RawRecord) -> Normalized {
        let link = match self.normalize_link(raw.link.as_deref()) {
            Ok(link) => link,
            Err(reason) => return Normalized::Rejected(reason),
        };

        let rank = canonical_rank(raw.rank.as_deref().unwrap_or_default());
        let name = truncate(&clean_text(raw.name.as_deref().unwrap_or_default()), self.max_name_chars);

        // link-only extraction never has rank or name to offer
        if rank.is_empty() && name.is_empty() && raw.source != StrategyKind::LinkOnly {
            return Normalized::Rejected(RejectReason::MissingRankAndName);
        }

        Normalized::Record(ProductRecord {
            rank,
            name,
            link,
            rating: truncate(
                &clean_text(raw.rating.as_deref().unwrap_or_default()),
                self.max_rating_chars,
            ),
            price: clean_text(raw.price.as_deref().unwrap_or_default()),
        })
    }

    /// Normalize a page's raw records, counting rejections by reason
    pub fn normalize_all(&self, raw: &[RawRecord]) -> (Vec<ProductRecord>, RejectionCounts) {
        let mut records = Vec::with_capacity(raw.len());
        let mut rejections = RejectionCounts::default();
        for record in raw {
            match self.normalize(record) {
                Normalized::Record(record) => records.push(record),
                Normalized::Rejected(reason) => rejections.record(reason),
            }
        }
        (records, rejections)
    }

    fn normalize_link(&self, link: Option<&str>) -> Result<String, RejectReason> {
        let link = clean_text(link.unwrap_or_default());
        if link.is_empty() {
            return Err(RejectReason::MissingLink);
        }
        let resolved = self
            .base_url
            .join(&link)
            .map_err(|_| RejectReason::InvalidLinkPattern)?;
        if !matches!(resolved.scheme(), "http" | "https")
            || resolved.host_str() != self.base_url.host_str()
            || !self.product_link_pattern.is_match(resolved.path())
        {
            return Err(RejectReason::InvalidLinkPattern);
        }
        Ok(resolved.to_string())
    }
}

/// `#<n>` from the first number in the text, empty when there is none
pub fn canonical_rank(text: &str) -> String {
    RANK_NUMBER
        .captures(text)
        .map(|caps| format!("#{}", &caps[1]))
        .unwrap_or_default()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].trim_end().to_string(),
        None => text.to_string(),
    }
}

/// Drop records whose identifier was already seen; first occurrence wins, order kept
pub fn deduplicate<I>(records: I) -> Vec<ProductRecord>
where
    I: IntoIterator<Item = ProductRecord>,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(record.identifier()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn normalizer() -> RecordNormalizer {
        RecordNormalizer::from_config(
            "https://www.amazon.in",
            &SelectorConfig::default(),
            &ScrapeConfig::default(),
        )
        .unwrap()
    }

    fn raw(rank: Option<&str>, name: Option<&str>, link: Option<&str>) -> RawRecord {
        RawRecord {
            rank: rank.map(str::to_string),
            name: name.map(str::to_string),
            link: link.map(str::to_string),
            rating: Some("  4.4 out of 5 stars ".into()),
            price: Some(" ₹1,299.00\n".into()),
            source: StrategyKind::IdentifierAnchored,
        }
    }

    #[rstest]
    #[case("#1", "#1")]
    #[case("Best Sellers Rank #12", "#12")]
    #[case("7", "#7")]
    #[case("no number", "")]
    #[case("", "")]
    fn rank_is_canonicalized(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(canonical_rank(input), expected);
    }

    #[test]
    fn valid_record_is_cleaned_and_resolved() {
        let record = normalizer().normalize(&raw(
            Some(" #3 "),
            Some("  Wireless\n  Mouse   with USB receiver "),
            Some("/Wireless-Mouse/dp/B0ABCDEF12/ref=zg_bs_3"),
        ));
        assert_eq!(
            record,
            Normalized::Record(ProductRecord {
                rank: "#3".into(),
                name: "Wireless Mouse with USB receiver".into(),
                link: "https://www.amazon.in/Wireless-Mouse/dp/B0ABCDEF12/ref=zg_bs_3".into(),
                rating: "4.4 out of 5 stars".into(),
                price: "₹1,299.00".into(),
            })
        );
    }

    #[rstest]
    #[case(None, RejectReason::MissingLink)]
    #[case(Some("   "), RejectReason::MissingLink)]
    #[case(Some("/gp/bestsellers/books"), RejectReason::InvalidLinkPattern)]
    #[case(Some("javascript:void(0)/dp/x"), RejectReason::InvalidLinkPattern)]
    #[case(Some("//elsewhere.example/dp/B0ABCDEF12"), RejectReason::InvalidLinkPattern)]
    #[case(Some("https://elsewhere.example/x/dp/B0ABCDEF12"), RejectReason::InvalidLinkPattern)]
    fn bad_links_are_rejected(#[case] link: Option<&str>, #[case] reason: RejectReason) {
        let result = normalizer().normalize(&raw(Some("#1"), Some("Some product"), link));
        assert_eq!(result, Normalized::Rejected(reason));
    }

    #[test]
    fn missing_rank_and_name_is_rejected_unless_link_only() {
        let anchored = raw(None, Some("   "), Some("/x/dp/B0ABCDEF12"));
        assert_eq!(
            normalizer().normalize(&anchored),
            Normalized::Rejected(RejectReason::MissingRankAndName)
        );

        let link_only = RawRecord::link_only("/x/dp/B0ABCDEF12");
        assert!(matches!(normalizer().normalize(&link_only), Normalized::Record(_)));
    }

    #[test]
    fn long_fields_are_truncated() {
        let name = "n".repeat(800);
        let mut input = raw(Some("#1"), Some(&name), Some("/x/dp/B0ABCDEF12"));
        input.rating = Some("r".repeat(300));
        let Normalized::Record(record) = normalizer().normalize(&input) else {
            panic!("expected a record");
        };
        assert_eq!(record.name.chars().count(), 500);
        assert_eq!(record.rating.chars().count(), 100);
    }

    #[test]
    fn normalize_all_counts_rejections() {
        let input = vec![
            raw(Some("#1"), Some("First product title"), Some("/a/dp/B000000001")),
            raw(Some("#2"), Some("Second product title"), None),
            raw(Some("#3"), Some("Third product title"), Some("/help")),
        ];
        let (records, rejections) = normalizer().normalize_all(&input);
        assert_eq!(records.len(), 1);
        assert_eq!(rejections.get(RejectReason::MissingLink), 1);
        assert_eq!(rejections.get(RejectReason::InvalidLinkPattern), 1);
    }

    #[test]
    fn deduplicate_keeps_first_occurrence_in_order() {
        let record = |rank: &str, link: &str| ProductRecord {
            rank: rank.into(),
            name: format!("Product ranked {rank}"),
            link: link.into(),
            rating: String::new(),
            price: String::new(),
        };
        let merged = deduplicate(vec![
            record("#1", "https://www.amazon.in/a/dp/B000000001"),
            record("#2", "https://www.amazon.in/b/dp/B000000002"),
            record("#1", "https://www.amazon.in/other-slug/dp/B000000001?th=1"),
            record("#3", "https://www.amazon.in/c/dp/B000000003"),
        ]);
        let ranks: Vec<_> = merged.iter().map(|r| r.rank.as_str()).collect();
        assert_eq!(ranks, ["#1", "#2", "#3"]);
        assert!(merged[0].link.ends_with("/a/dp/B000000001"));
    }

    fn text() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[ \\t\\nA-Za-z0-9#.,₹]{0,40}")
    }

    fn raw_record_strategy() -> impl Strategy<Value = RawRecord> {
        let link = proptest::option::of(
            "[ ]{0,2}(/[A-Za-z0-9_-]{1,10})?/(dp|gp/product)/[A-Z0-9]{10}(/ref=[a-z_0-9]{1,8})?[ ]{0,2}",
        );
        let source = prop_oneof![
            Just(StrategyKind::IdentifierAnchored),
            Just(StrategyKind::GlobalSelectors),
            Just(StrategyKind::LinkOnly),
        ];
        (text(), text(), link, text(), text(), source).prop_map(
            |(rank, name, link, rating, price, source)| RawRecord {
                rank,
                name,
                link,
                rating,
                price,
                source,
            },
        )
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(input in raw_record_strategy()) {
            let normalizer = normalizer();
            if let Normalized::Record(first) = normalizer.normalize(&input) {
                let again = normalizer.normalize(&RawRecord::from(&first));
                prop_assert_eq!(again, Normalized::Record(first));
            }
        }

        #[test]
        fn dedup_output_has_distinct_identifiers(tokens in proptest::collection::vec(0u8..20, 0..60)) {
            let records: Vec<ProductRecord> = tokens
                .iter()
                .map(|t| ProductRecord {
                    rank: format!("#{t}"),
                    name: format!("Product number {t}"),
                    link: format!("https://www.amazon.in/p/dp/B{t:09}"),
                    rating: String::new(),
                    price: String::new(),
                })
                .collect();
            let unique = deduplicate(records);
            let ids: HashSet<_> = unique.iter().map(ProductRecord::identifier).collect();
            prop_assert_eq!(ids.len(), unique.len());
            let distinct_input: HashSet<_> = tokens.iter().collect();
            prop_assert_eq!(unique.len(), distinct_input.len());
        }
    }
}
