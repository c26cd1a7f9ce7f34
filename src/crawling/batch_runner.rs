//! Batch runner over all discovered categories
//!
//! Each rendering session works through a shared queue of categories, one
//! category at a time. A category failure becomes a failed result and the
//! batch moves on. Cancellation and the run timeout are only checked between
//! categories.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::category_scraper::PaginatedCategoryScraper;
use crate::domain::events::format_duration;
use crate::domain::{
    Category, CategoryProgress, CategoryResult, LowYieldWarning, RunSummary, RunTotals,
};
use crate::infrastructure::config::{AppConfig, PacingConfig};
use crate::infrastructure::render::PageRenderHandle;

/// Receives progress events; implementations decide how to show them
pub trait ProgressSink {
    fn category_started(&self, _index: usize, _total: usize, _category: &Category) {}

    fn category_finished(&self, progress: &CategoryProgress);

    fn low_yield(&self, _warning: &LowYieldWarning) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Writes progress lines through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn category_started(&self, index: usize, total: usize, category: &Category) {
        info!("[{}/{}] Scraping: {}", index, total, category.name);
    }

    fn category_finished(&self, progress: &CategoryProgress) {
        let status = if progress.failed || progress.unique_items == 0 {
            "✗"
        } else {
            "✓"
        };
        let pages = progress
            .item_counts
            .iter()
            .enumerate()
            .map(|(i, count)| format!("P{}:{}", i + 1, count))
            .collect::<Vec<_>>()
            .join(", ");
        info!(
            "  {} Got {} items in {:.2}s ({})",
            status,
            progress.unique_items,
            progress.elapsed_ms as f64 / 1000.0,
            pages
        );
        info!(
            "  Progress: {}/{} categories | Elapsed: {} | ETA: {}",
            progress.totals.processed,
            progress.total,
            format_duration(Duration::from_millis(progress.totals.elapsed_ms)),
            format_duration(progress.totals.eta(progress.total))
        );
    }

    fn low_yield(&self, warning: &LowYieldWarning) {
        warn!(
            "  Low item count for {}: {} (expected at least {})",
            warning.name, warning.unique_items, warning.threshold
        );
    }

    fn run_finished(&self, summary: &RunSummary) {
        info!(
            "Run finished: {}/{} categories successful, {} failed, {} items{}",
            summary.totals.successful,
            summary.total_categories,
            summary.totals.failed,
            summary.totals.total_items,
            if summary.cancelled { " (stopped early)" } else { "" }
        );
    }
}

/// Progress event forwarded over a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started {
        index: usize,
        total: usize,
        name: String,
    },
    Finished(CategoryProgress),
    LowYield(LowYieldWarning),
    RunFinished(RunSummary),
}

/// Forwards events to an unbounded channel; a dropped receiver is ignored
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    fn send(&self, event: ProgressEvent) {
        if self.sender.send(event).is_err() {
            debug!("Progress receiver dropped");
        }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn category_started(&self, index: usize, total: usize, category: &Category) {
        self.send(ProgressEvent::Started {
            index,
            total,
            name: category.name.clone(),
        });
    }

    fn category_finished(&self, progress: &CategoryProgress) {
        self.send(ProgressEvent::Finished(progress.clone()));
    }

    fn low_yield(&self, warning: &LowYieldWarning) {
        self.send(ProgressEvent::LowYield(warning.clone()));
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.send(ProgressEvent::RunFinished(*summary));
    }
}

/// Results in category discovery order plus run totals
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub results: Vec<CategoryResult>,
    pub summary: RunSummary,
}

pub struct CategoryBatchRunner {
    scraper: PaginatedCategoryScraper,
    pacing: PacingConfig,
    cancellation: CancellationToken,
}

/// State shared by the workers of one run
struct RunContext<'a> {
    queue: Mutex<VecDeque<(usize, Category)>>,
    totals: Mutex<RunTotals>,
    total: usize,
    started: Instant,
    deadline: Option<Instant>,
    sink: &'a dyn ProgressSink,
}

impl CategoryBatchRunner {
    pub fn new(scraper: PaginatedCategoryScraper, pacing: PacingConfig) -> Self {
        Self {
            scraper,
            pacing,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &AppConfig, base_url: &str) -> Result<Self> {
        Ok(Self::new(
            PaginatedCategoryScraper::from_config(config, base_url)?,
            config.pacing.clone(),
        ))
    }

    /// Stop at the next category boundary when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Scrape `categories` using every session in `sessions`.
    ///
    /// Each session serves one category at a time. Output order matches input
    /// order; categories not started before cancellation or timeout are left
    /// out and the summary is marked `cancelled`. An empty session pool scrapes
    /// nothing and is not reported as cancelled.
    pub async fn run<P>(
        &self,
        sessions: &mut [P],
        categories: &[Category],
        sink: &dyn ProgressSink,
    ) -> BatchReport
    where
        P: PageRenderHandle,
    {
        let total = categories.len();
        let started = Instant::now();

        if sessions.is_empty() {
            if total > 0 {
                error!("No rendering sessions available, nothing scraped");
            }
            let summary = RunSummary {
                total_categories: total,
                ..RunSummary::default()
            };
            sink.run_finished(&summary);
            return BatchReport {
                results: Vec::new(),
                summary,
            };
        }

        let context = RunContext {
            queue: Mutex::new(categories.iter().cloned().enumerate().collect()),
            totals: Mutex::new(RunTotals::default()),
            total,
            started,
            deadline: self.pacing.run_timeout().map(|t| started + t),
            sink,
        };

        info!(
            "🚀 Scraping {} categories with {} session(s)",
            total,
            sessions.len()
        );

        let workers = sessions
            .iter_mut()
            .enumerate()
            .map(|(worker_id, session)| self.worker(worker_id, session, &context));
        let mut indexed: Vec<(usize, CategoryResult)> =
            join_all(workers).await.into_iter().flatten().collect();
        indexed.sort_by_key(|(index, _)| *index);

        let mut totals = *context.totals.lock().await;
        totals.elapsed_ms = elapsed_ms(started);
        let summary = RunSummary {
            total_categories: total,
            totals,
            cancelled: indexed.len() < total,
        };
        sink.run_finished(&summary);

        BatchReport {
            results: indexed.into_iter().map(|(_, result)| result).collect(),
            summary,
        }
    }

    async fn worker<P>(
        &self,
        worker_id: usize,
        session: &mut P,
        context: &RunContext<'_>,
    ) -> Vec<(usize, CategoryResult)>
    where
        P: PageRenderHandle,
    {
        let mut finished = Vec::new();

        loop {
            if self.should_stop(context.deadline) {
                debug!("Worker {} stopping at category boundary", worker_id);
                break;
            }
            let Some((index, category)) = context.queue.lock().await.pop_front() else {
                break;
            };

            context.sink.category_started(index + 1, context.total, &category);
            let category_started = Instant::now();
            let result = self.scrape_isolated(session, category).await;

            let totals = {
                let mut totals = context.totals.lock().await;
                totals.record(result.item_count(), result.is_failed());
                totals.elapsed_ms = elapsed_ms(context.started);
                *totals
            };
            context.sink.category_finished(&CategoryProgress {
                index: index + 1,
                total: context.total,
                name: result.category.name.clone(),
                item_counts: result.stats.per_page_counts(),
                unique_items: result.item_count(),
                failed: result.is_failed(),
                elapsed_ms: elapsed_ms(category_started),
                totals,
            });

            let threshold = self.scraper.config().low_yield_warning_threshold;
            if result.item_count() < threshold {
                context.sink.low_yield(&LowYieldWarning {
                    name: result.category.name.clone(),
                    unique_items: result.item_count(),
                    threshold,
                });
            }
            finished.push((index, result));

            let more_queued = !context.queue.lock().await.is_empty();
            if more_queued {
                self.pace().await;
            }
        }

        finished
    }

    /// Scrape one category; a category failure becomes a failed result
    async fn scrape_isolated<P>(&self, session: &mut P, category: Category) -> CategoryResult
    where
        P: PageRenderHandle,
    {
        match self.scraper.scrape_category(session, &category).await {
            Ok(result) => result,
            Err(e) => {
                error!("✗ {}", e);
                if let Err(reset_error) = session.reset().await {
                    warn!("Session reset failed: {}", reset_error);
                }
                CategoryResult::failed(category, self.scraper.config().page_count.max(1), e.to_string())
            }
        }
    }

    fn should_stop(&self, deadline: Option<Instant>) -> bool {
        if self.cancellation.is_cancelled() {
            return true;
        }
        match deadline {
            Some(deadline) if Instant::now() >= deadline => {
                warn!("Run timeout reached");
                true
            }
            _ => false,
        }
    }

    /// Uniform delay in `base ± jitter`, saturating at `u64::MAX` ms
    pub fn pace_delay(&self) -> Duration {
        let base = self.pacing.inter_category_pace_ms_base;
        let jitter = self.pacing.inter_category_pace_ms_jitter.min(base);
        let offset = fastrand::u64(0..=jitter.saturating_mul(2));
        Duration::from_millis((base - jitter).saturating_add(offset))
    }

    async fn pace(&self) {
        let delay = self.pace_delay();
        if delay.is_zero() {
            return;
        }
        debug!("Pacing {}ms before next category", delay.as_millis());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.cancellation.cancelled() => debug!("Pacing interrupted by cancellation"),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
