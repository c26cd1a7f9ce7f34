//! Batch runs over several categories, including export of the results
mod common;

use bestseller_harvest::crawling::{
    CategoryBatchRunner, ChannelProgressSink, ProgressEvent, TracingProgressSink,
};
use bestseller_harvest::domain::Category;
use bestseller_harvest::infrastructure::export_results;
use common::{BASE_URL, ScriptedPage, cards, fast_config, listing};

const BOOKS: &str = "https://www.amazon.in/gp/bestsellers/books";
const TOYS: &str = "https://www.amazon.in/gp/bestsellers/toys";
const SHOES: &str = "https://www.amazon.in/gp/bestsellers/shoes";
const GARDEN: &str = "https://www.amazon.in/gp/bestsellers/garden";

fn categories() -> Vec<Category> {
    vec![
        Category::new("Books", BOOKS),
        Category::new("Toys & Games", TOYS),
        Category::new("Shoes", SHOES),
    ]
}

fn runner() -> CategoryBatchRunner {
    CategoryBatchRunner::from_config(&fast_config(1), BASE_URL).unwrap()
}

#[tokio::test]
async fn fatal_category_is_isolated() {
    let session = ScriptedPage::new()
        .with_page(BOOKS, listing(&cards(1..=30, 1), None))
        .losing_session(TOYS)
        .with_page(SHOES, listing(&cards(1..=25, 500), None));
    let mut sessions = vec![session];

    let report = runner().run(&mut sessions, &categories(), &TracingProgressSink).await;

    let names: Vec<_> = report.results.iter().map(|r| r.category.name.as_str()).collect();
    assert_eq!(names, ["Books", "Toys & Games", "Shoes"]);

    assert_eq!(report.results[0].item_count(), 30);
    assert!(report.results[1].is_failed());
    assert_eq!(report.results[1].item_count(), 0);
    assert!(report.results[1].stats.error.as_deref().unwrap().contains("browser crashed"));
    assert_eq!(report.results[2].item_count(), 25);

    assert_eq!(sessions[0].resets, 1);
    assert_eq!(report.summary.totals.successful, 2);
    assert_eq!(report.summary.totals.failed, 1);
    assert_eq!(report.summary.totals.total_items, 55);
    assert!(!report.summary.cancelled);
}

#[tokio::test]
async fn results_keep_input_order_across_sessions() {
    let session = || {
        ScriptedPage::new()
            .with_page(BOOKS, listing(&cards(1..=12, 1), None))
            .with_page(TOYS, listing(&cards(1..=14, 100), None))
            .with_page(SHOES, listing(&cards(1..=16, 200), None))
            .with_page(GARDEN, listing(&cards(1..=18, 300), None))
    };
    let mut sessions = vec![session(), session()];
    let mut all = categories();
    all.push(Category::new("Garden", GARDEN));

    let report = runner().run(&mut sessions, &all, &TracingProgressSink).await;

    let counts: Vec<_> = report.results.iter().map(|r| r.item_count()).collect();
    assert_eq!(counts, [12, 14, 16, 18]);
    let navigations: usize = sessions.iter().map(|s| s.navigations.len()).sum();
    assert_eq!(navigations, 4);
}

#[tokio::test]
async fn low_yield_categories_are_reported() {
    let (sink, mut events) = ChannelProgressSink::new();
    let mut sessions = vec![ScriptedPage::new().with_page(BOOKS, listing(&cards(1..=6, 1), None))];
    let books = vec![Category::new("Books", BOOKS)];

    let report = runner().run(&mut sessions, &books, &sink).await;
    assert_eq!(report.results[0].item_count(), 6);
    drop(sink);

    let mut warnings = Vec::new();
    while let Some(event) = events.recv().await {
        if let ProgressEvent::LowYield(warning) = event {
            warnings.push(warning);
        }
    }
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].name, "Books");
    assert_eq!(warnings[0].unique_items, 6);
    assert_eq!(warnings[0].threshold, 10);
}

#[tokio::test]
async fn run_exports_json_and_csv() {
    let session = ScriptedPage::new()
        .with_page(BOOKS, listing(&cards(1..=30, 1), None))
        .losing_session(TOYS)
        .with_page(SHOES, listing(&cards(1..=25, 500), None));
    let mut sessions = vec![session];
    let report = runner().run(&mut sessions, &categories(), &TracingProgressSink).await;

    let dir = tempfile::tempdir().unwrap();
    let paths = export_results(dir.path(), "bestsellers", &report.results).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    let books = &json["bestsellers"]["Books"];
    assert_eq!(books["category_link"], BOOKS);
    assert_eq!(books["category_items"].as_array().unwrap().len(), 30);
    assert_eq!(books["category_items"][0]["rank"], "#1");
    assert_eq!(books["extraction_stats"]["page1_items"], 30);
    assert_eq!(books["extraction_stats"]["final_unique_items"], 30);
    assert_eq!(books["extraction_stats"]["page1_raw"], 30);
    assert_eq!(books["extraction_stats"]["page1_strategy"], "identifier_anchored");
    assert_eq!(books["extraction_stats"]["low_confidence_pages"], 0);
    assert!(books["extraction_stats"].get("failed").is_none());

    let toys = &json["bestsellers"]["Toys & Games"];
    assert_eq!(toys["extraction_stats"]["failed"], true);
    assert!(toys["extraction_stats"]["error"].is_string());

    let csv = std::fs::read_to_string(paths.csv.unwrap()).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(
        lines[0],
        "root_category,sub_category,category_link,rank,name,link,rating,price,page1_items,final_unique_items"
    );
    assert_eq!(lines.len(), 1 + 55);
    assert!(lines[1].starts_with("bestseller,Books,https://www.amazon.in/gp/bestsellers/books,#1,"));
    assert!(lines[1].ends_with(",30,30"));
}
