//! JSON and CSV export of batch results
//!
//! Categories keep discovery order in both outputs. File names carry the run
//! timestamp: `<prefix>_<YYYYmmdd_HHMMSS>.json|csv`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::info;

use crate::domain::{CategoryResult, ExtractionStats, ProductRecord};

/// Value of the `root_category` CSV column
pub const ROOT_CATEGORY: &str = "bestseller";

/// Files written by [`export_results`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub json: PathBuf,
    /// `None` when no category produced a record
    pub csv: Option<PathBuf>,
}

pub fn timestamped_file_name(prefix: &str, extension: &str, at: DateTime<Local>) -> String {
    format!("{prefix}_{}.{extension}", at.format("%Y%m%d_%H%M%S"))
}

/// Write both exports into `dir`, creating it if needed
pub fn export_results(dir: &Path, prefix: &str, results: &[CategoryResult]) -> Result<ExportPaths> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {dir:?}"))?;
    let now = Local::now();

    let json_path = dir.join(timestamped_file_name(prefix, "json", now));
    let file = File::create(&json_path).with_context(|| format!("Failed to create {json_path:?}"))?;
    write_json(BufWriter::new(file), results)?;
    info!("JSON saved to: {:?}", json_path);

    let csv_path = if results.iter().any(|r| !r.records.is_empty()) {
        let path = dir.join(timestamped_file_name(prefix, "csv", now));
        let file = File::create(&path).with_context(|| format!("Failed to create {path:?}"))?;
        write_csv(BufWriter::new(file), results).context("Failed to write CSV export")?;
        info!("CSV saved to: {:?}", path);
        Some(path)
    } else {
        info!("No records to save as CSV");
        None
    };

    Ok(ExportPaths {
        json: json_path,
        csv: csv_path,
    })
}

/* ---------------- JSON ---------------- */

#[derive(Serialize)]
struct ExportDocument<'a> {
    bestsellers: Bestsellers<'a>,
}

struct Bestsellers<'a>(&'a [CategoryResult]);

impl Serialize for Bestsellers<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for result in self.0 {
            map.serialize_entry(
                &result.category.name,
                &CategoryEntry {
                    category_link: &result.category.source_url,
                    category_items: &result.records,
                    extraction_stats: StatsEntry(&result.stats),
                },
            )?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct CategoryEntry<'a> {
    category_link: &'a str,
    category_items: &'a [ProductRecord],
    extraction_stats: StatsEntry<'a>,
}

struct StatsEntry<'a>(&'a ExtractionStats);

impl Serialize for StatsEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let stats = self.0;
        let mut map = serializer.serialize_map(None)?;
        for page in &stats.pages {
            map.serialize_entry(&format!("page{}_items", page.page), &page.item_count)?;
        }
        for page in &stats.pages {
            map.serialize_entry(&format!("page{}_raw", page.page), &page.raw_count)?;
            map.serialize_entry(&format!("page{}_strategy", page.page), &page.strategy)?;
        }
        map.serialize_entry("total_before_dedup", &stats.total_before_dedup)?;
        map.serialize_entry("final_unique_items", &stats.final_unique_items)?;
        map.serialize_entry("initial_asin_count", &stats.initial_container_count)?;
        map.serialize_entry("incomplete_items", &stats.incomplete_items)?;
        map.serialize_entry("rejected", &stats.rejections())?;
        map.serialize_entry("low_confidence_pages", &stats.low_confidence_pages())?;
        if stats.failed {
            map.serialize_entry("failed", &true)?;
        }
        if let Some(error) = &stats.error {
            map.serialize_entry("error", error)?;
        }
        map.end()
    }
}

/// Pretty-printed `{"bestsellers": {name: {...}}}` document
pub fn write_json<W: Write>(mut writer: W, results: &[CategoryResult]) -> Result<()> {
    let document = ExportDocument {
        bestsellers: Bestsellers(results),
    };
    serde_json::to_writer_pretty(&mut writer, &document).context("Failed to write JSON export")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/* ---------------- CSV ---------------- */

/// Number of `pageN_items` columns: the widest page list among the results
fn page_columns(results: &[CategoryResult]) -> u32 {
    results
        .iter()
        .flat_map(|r| r.stats.pages.iter().map(|p| p.page))
        .max()
        .unwrap_or(0)
}

pub fn csv_header(page_columns: u32) -> Vec<String> {
    let mut header: Vec<String> = [
        "root_category",
        "sub_category",
        "category_link",
        "rank",
        "name",
        "link",
        "rating",
        "price",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();
    header.extend((1..=page_columns).map(|p| format!("page{p}_items")));
    header.push("final_unique_items".to_string());
    header
}

/// One row per product; category and page counts repeat on every row
pub fn write_csv<W: Write>(writer: W, results: &[CategoryResult]) -> Result<()> {
    let pages = page_columns(results);
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(csv_header(pages))?;

    for result in results {
        let page_counts: Vec<String> = (1..=pages)
            .map(|p| result.stats.page_items(p).to_string())
            .collect();
        let unique = result.stats.final_unique_items.to_string();

        for record in &result.records {
            csv.write_record(
                [
                    ROOT_CATEGORY,
                    result.category.name.as_str(),
                    result.category.source_url.as_str(),
                    record.rank.as_str(),
                    record.name.as_str(),
                    record.link.as_str(),
                    record.rating.as_str(),
                    record.price.as_str(),
                ]
                .into_iter()
                .chain(page_counts.iter().map(String::as_str))
                .chain(std::iter::once(unique.as_str())),
            )?;
        }
    }
    csv.flush()?;
    Ok(())
}
