//! Structural-count stabilization
//!
//! Lazy-loading result pages never reliably report "done" through network
//! idleness alone. The detector samples the record-container count, scrolls,
//! waits, and stops once two consecutive samples agree.

use std::time::Duration;

use tracing::{debug, warn};

use crate::infrastructure::config::ScrapeConfig;
use crate::infrastructure::render::PageRenderHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizationOutcome {
    /// Last observed container count
    pub final_count: usize,
    /// Sampling rounds used
    pub rounds: u32,
    /// False when the count was still moving at the round limit
    pub stable: bool,
}

#[derive(Debug, Clone)]
pub struct StabilizationDetector {
    max_rounds: u32,
    pause: Duration,
    network_idle_timeout: Duration,
}

impl StabilizationDetector {
    pub fn new(max_rounds: u32, pause: Duration, network_idle_timeout: Duration) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
            pause,
            network_idle_timeout,
        }
    }

    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self::new(
            config.max_stabilization_rounds,
            config.stabilization_pause(),
            config.network_idle_timeout(),
        )
    }

    /// Sample `container_selector` until its count settles or rounds run out.
    ///
    /// Never fails: render errors end sampling early with `stable = false`.
    pub async fn stabilize<P>(&self, page: &mut P, container_selector: &str) -> StabilizationOutcome
    where
        P: PageRenderHandle + ?Sized,
    {
        let mut previous: Option<usize> = None;
        let mut last_count = 0;

        for round in 1..=self.max_rounds {
            let count = match page.query_all(container_selector) {
                Ok(found) => found.len(),
                Err(e) => {
                    warn!("Container sampling failed in round {}: {}", round, e);
                    return StabilizationOutcome {
                        final_count: last_count,
                        rounds: round,
                        stable: false,
                    };
                }
            };

            if previous == Some(count) {
                debug!("Round {}: {} containers (stable)", round, count);
                return StabilizationOutcome {
                    final_count: count,
                    rounds: round,
                    stable: true,
                };
            }

            debug!("Round {}: {} containers", round, count);
            previous = Some(count);
            last_count = count;

            if round == self.max_rounds {
                break;
            }

            if let Err(e) = page.scroll_to_bottom().await {
                warn!("Scroll failed in round {}: {}", round, e);
                if e.is_fatal() {
                    return StabilizationOutcome {
                        final_count: last_count,
                        rounds: round,
                        stable: false,
                    };
                }
            }

            match page.wait_network_idle(self.network_idle_timeout).await {
                Ok(()) => {}
                Err(e) if e.is_timeout() => debug!("Network idle wait timed out, continuing"),
                Err(e) => debug!("Network idle wait failed: {}", e),
            }

            if !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }

        warn!(
            "Container count still changing after {} rounds ({} containers)",
            self.max_rounds, last_count
        );
        StabilizationOutcome {
            final_count: last_count,
            rounds: self.max_rounds,
            stable: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::render::{ElementHandle, RenderError, RenderResult, WaitUntil};
    use async_trait::async_trait;

    /// Page whose container count follows a script; each scroll moves to the next value
    struct CountingPage {
        counts: Vec<usize>,
        cursor: usize,
        scrolls: usize,
        idle_times_out: bool,
        fail_query_at: Option<usize>,
    }

    impl CountingPage {
        fn new(counts: &[usize]) -> Self {
            Self {
                counts: counts.to_vec(),
                cursor: 0,
                scrolls: 0,
                idle_times_out: false,
                fail_query_at: None,
            }
        }
    }

    #[async_trait(?Send)]
    impl PageRenderHandle for CountingPage {
        async fn navigate(&mut self, _: &str, _: Duration, _: WaitUntil) -> RenderResult<()> {
            Ok(())
        }

        fn current_url(&self) -> Option<String> {
            None
        }

        fn query_all(&self, _: &str) -> RenderResult<Vec<ElementHandle>> {
            if self.fail_query_at == Some(self.cursor) {
                return Err(RenderError::SessionLost("gone".into()));
            }
            let count = self.counts[self.cursor.min(self.counts.len() - 1)];
            Ok((0..count).map(|i| ElementHandle::new(0, i)).collect())
        }

        fn query_within(&self, _: ElementHandle, _: &str) -> RenderResult<Vec<ElementHandle>> {
            Ok(Vec::new())
        }

        fn element_text(&self, _: ElementHandle) -> RenderResult<String> {
            Ok(String::new())
        }

        fn element_attribute(&self, _: ElementHandle, _: &str) -> RenderResult<Option<String>> {
            Ok(None)
        }

        fn element_parent(&self, _: ElementHandle) -> RenderResult<Option<ElementHandle>> {
            Ok(None)
        }

        async fn scroll_to_bottom(&mut self) -> RenderResult<()> {
            self.scrolls += 1;
            self.cursor += 1;
            Ok(())
        }

        async fn wait_network_idle(&mut self, timeout: Duration) -> RenderResult<()> {
            if self.idle_times_out {
                return Err(RenderError::timeout("network idle", timeout));
            }
            Ok(())
        }
    }

    fn detector(max_rounds: u32) -> StabilizationDetector {
        StabilizationDetector::new(max_rounds, Duration::ZERO, Duration::from_millis(10))
    }

    #[tokio::test]
    async fn stops_after_two_equal_samples() {
        let mut page = CountingPage::new(&[34, 48, 48, 60]);
        let outcome = detector(8).stabilize(&mut page, "[data-asin]").await;
        assert_eq!(
            outcome,
            StabilizationOutcome {
                final_count: 48,
                rounds: 3,
                stable: true
            }
        );
        assert_eq!(page.scrolls, 2);
    }

    #[tokio::test]
    async fn idle_timeouts_are_not_fatal() {
        let mut page = CountingPage::new(&[34, 48, 48]);
        page.idle_times_out = true;
        let outcome = detector(8).stabilize(&mut page, "[data-asin]").await;
        assert_eq!(outcome.final_count, 48);
        assert!(outcome.stable);
    }

    #[tokio::test]
    async fn round_limit_returns_last_count_unstable() {
        let mut page = CountingPage::new(&[10, 20, 30, 40, 50]);
        let outcome = detector(4).stabilize(&mut page, "[data-asin]").await;
        assert_eq!(outcome.final_count, 40);
        assert_eq!(outcome.rounds, 4);
        assert!(!outcome.stable);
        assert_eq!(page.scrolls, 3, "no scroll after the final sample");
    }

    #[tokio::test]
    async fn query_failure_returns_last_known_count() {
        let mut page = CountingPage::new(&[12, 20, 30]);
        page.fail_query_at = Some(2);
        let outcome = detector(8).stabilize(&mut page, "[data-asin]").await;
        assert_eq!(outcome.final_count, 20);
        assert_eq!(outcome.rounds, 3);
        assert!(!outcome.stable);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_rounds() {
        let mut page = CountingPage::new(&[1, 2, 2]);
        let start = tokio::time::Instant::now();
        let detector =
            StabilizationDetector::new(8, Duration::from_millis(2000), Duration::from_millis(10));
        detector.stabilize(&mut page, "[data-asin]").await;
        assert_eq!(start.elapsed(), Duration::from_millis(4000));
    }
}
