//! Batch loop: drain unresolved events, analyze them in parallel, commit,
//! sleep, repeat.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{error, info, warn};

use timeline_store::{AnalysisQueue, LiquidationEvent, StoreError};

use crate::analyzer::{AnalysisOutcome, TimelineAnalyzer};

/// Loop sizing and timing.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub batch_size: usize,
    pub max_workers: usize,
    pub loop_interval: Duration,
}

/// Counts for one DRAIN..COLLECT pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub pulled: usize,
    pub analyzed: usize,
    pub failed: usize,
    pub workers: usize,
    pub elapsed: Duration,
}

/// State carried from one iteration to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopState {
    pub iteration: u64,
    pub total_pulled: u64,
    pub total_analyzed: u64,
    pub total_failed: u64,
}

impl LoopState {
    /// State after `summary` completed as iteration `self.iteration + 1`.
    pub fn advance(self, summary: &BatchSummary) -> Self {
        Self {
            iteration: self.iteration + 1,
            total_pulled: self.total_pulled + summary.pulled as u64,
            total_analyzed: self.total_analyzed + summary.analyzed as u64,
            total_failed: self.total_failed + summary.failed as u64,
        }
    }
}

/// Terminal result of one event as seen by the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventResult {
    Analyzed,
    Failed,
}

/// Drives the analysis loop over a queue.
pub struct BatchOrchestrator {
    queue: Arc<dyn AnalysisQueue>,
    analyzer: TimelineAnalyzer,
    options: RunnerOptions,
}

impl BatchOrchestrator {
    pub fn new(
        queue: Arc<dyn AnalysisQueue>,
        analyzer: TimelineAnalyzer,
        options: RunnerOptions,
    ) -> Self {
        Self {
            queue,
            analyzer,
            options,
        }
    }

    /// Run until `shutdown` turns true.
    ///
    /// The flag is checked between batches and during the sleep. A batch in
    /// progress always runs to completion. Queue read failures end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<LoopState, StoreError> {
        let mut state = LoopState::default();

        loop {
            if *shutdown.borrow() {
                break;
            }

            info!(
                iteration = state.iteration + 1,
                started_at = %chrono::Utc::now(),
                "=== Iteration ==="
            );
            let summary = self.run_batch().await?;
            state = state.advance(&summary);

            info!(
                iteration = state.iteration,
                total_pulled = state.total_pulled,
                total_analyzed = state.total_analyzed,
                total_failed = state.total_failed,
                "Loop totals"
            );

            if *shutdown.borrow() {
                break;
            }

            info!(secs = self.options.loop_interval.as_secs(), "Sleeping before next iteration");
            if self.sleep_or_stop(&mut shutdown).await {
                break;
            }
        }

        info!(iterations = state.iteration, "Stopped");
        Ok(state)
    }

    /// Sleep for the loop interval. Returns true if a stop was requested
    /// meanwhile. A closed channel means no stop can arrive, so the full
    /// interval is slept.
    async fn sleep_or_stop(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let sleep = tokio::time::sleep(self.options.loop_interval);
        tokio::pin!(sleep);
        let mut listening = true;

        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                changed = shutdown.changed(), if listening => match changed {
                    Ok(()) if *shutdown.borrow() => return true,
                    Ok(()) => {}
                    Err(_) => listening = false,
                },
            }
        }
    }

    /// One DRAIN, DISPATCH and COLLECT pass.
    pub async fn run_batch(&self) -> Result<BatchSummary, StoreError> {
        let started = Instant::now();
        let events = self.queue.pull_unresolved(self.options.batch_size).await?;

        if events.is_empty() {
            info!("No unresolved liquidations");
            return Ok(BatchSummary {
                elapsed: started.elapsed(),
                ..BatchSummary::default()
            });
        }

        let total = events.len();
        let workers = self.options.max_workers.min(total).max(1);
        info!(events = total, workers, "Analyzing liquidation timelines");

        let mut results = stream::iter(events)
            .map(|event| async move {
                let result = self.process_event(&event).await;
                (event, result)
            })
            .buffer_unordered(workers);

        let mut summary = BatchSummary {
            pulled: total,
            workers,
            ..BatchSummary::default()
        };
        let mut completed = 0usize;

        while let Some((event, result)) = results.next().await {
            completed += 1;
            match result {
                EventResult::Analyzed => summary.analyzed += 1,
                EventResult::Failed => summary.failed += 1,
            }
            info!(
                progress = %format!("{completed}/{total}"),
                id = %event.id,
                tx = %event.short_tx(),
                ok = result == EventResult::Analyzed,
                "Event finished"
            );
        }

        summary.elapsed = started.elapsed();
        info!(
            pulled = summary.pulled,
            analyzed = summary.analyzed,
            failed = summary.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Batch finished"
        );

        Ok(summary)
    }

    /// Analyze and commit one event. Never returns an error: every failure
    /// ends as a FAILED row or, if even that write fails, a log line.
    async fn process_event(&self, event: &LiquidationEvent) -> EventResult {
        let committed = match self.analyzer.analyze(event).await {
            Ok(AnalysisOutcome::Analyzed(record)) => self
                .queue
                .commit_analyzed(&record)
                .await
                .map(|()| EventResult::Analyzed),
            Ok(AnalysisOutcome::Inconclusive { reason }) => {
                warn!(id = %event.id, %reason, "Inconclusive");
                self.queue
                    .commit_failed(&event.id, &reason)
                    .await
                    .map(|()| EventResult::Failed)
            }
            Err(e) => {
                warn!(id = %event.id, error = %e, "Analysis failed");
                self.queue
                    .commit_failed(&event.id, &e.to_string())
                    .await
                    .map(|()| EventResult::Failed)
            }
        };

        match committed {
            Ok(result) => result,
            Err(e) => {
                error!(id = %event.id, error = %e, "Commit failed");
                if let Err(e) = self.queue.commit_failed(&event.id, &e.to_string()).await {
                    error!(id = %event.id, error = %e, "Could not record failure");
                }
                EventResult::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finder::LiquidatableBlockFinder;
    use crate::testing::{event, user, SyntheticChain};
    use alloy::primitives::{Address, U256};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use timeline_chain::{AccountSnapshot, ChainError, ChainStateClient, ReserveMetadataCache};
    use timeline_store::{AnalysisStatus, MemoryQueue};

    /// Tracks how many account reads are in flight at once.
    struct Gauge {
        inner: SyntheticChain,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ChainStateClient for Gauge {
        async fn account_snapshot(
            &self,
            user: Address,
            block: u64,
        ) -> Result<AccountSnapshot, ChainError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            let result = self.inner.account_snapshot(user, block).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        async fn asset_price_at_block(
            &self,
            block: u64,
            asset: Address,
        ) -> Result<U256, ChainError> {
            self.inner.asset_price_at_block(block, asset).await
        }

        async fn block_timestamp(&self, block: u64) -> Result<DateTime<Utc>, ChainError> {
            self.inner.block_timestamp(block).await
        }
    }

    fn options(max_workers: usize) -> RunnerOptions {
        RunnerOptions {
            batch_size: 100,
            max_workers,
            loop_interval: Duration::from_secs(3600),
        }
    }

    fn orchestrator(
        chain: Arc<dyn ChainStateClient>,
        queue: Arc<MemoryQueue>,
        opts: RunnerOptions,
    ) -> BatchOrchestrator {
        let finder = LiquidatableBlockFinder::new(chain.clone(), 100, Duration::ZERO);
        let analyzer =
            TimelineAnalyzer::new(chain, Arc::new(ReserveMetadataCache::default()), finder);
        BatchOrchestrator::new(queue, analyzer, opts)
    }

    fn five_events() -> (SyntheticChain, Vec<LiquidationEvent>) {
        let mut chain = SyntheticChain::default();
        let mut events = Vec::new();
        for i in 1..=5u8 {
            let block = 1000 + u64::from(i) * 10;
            // User 5 never becomes liquidatable
            if i != 5 {
                chain.liquidatable_from.insert(user(i), block - 20);
            }
            events.push(event(&format!("0x{i:02x}-0"), user(i), block));
        }
        (chain, events)
    }

    #[tokio::test]
    async fn test_batch_reaches_terminal_status_for_every_event() {
        let (chain, events) = five_events();
        let gauge = Arc::new(Gauge {
            inner: chain,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let queue = Arc::new(MemoryQueue::new(events.clone()));
        let orch = orchestrator(gauge.clone(), queue.clone(), options(3));

        let summary = orch.run_batch().await.unwrap();

        assert_eq!(summary.pulled, 5);
        assert_eq!(summary.workers, 3);
        assert_eq!(summary.analyzed, 4);
        assert_eq!(summary.failed, 1);
        assert!(gauge.peak.load(Ordering::SeqCst) <= 3);

        for e in &events {
            let record = queue.record(&e.id).expect("terminal record");
            assert!(record.status.is_terminal());
        }

        let healthy = queue.record("0x05-0").unwrap();
        assert_eq!(healthy.status, AnalysisStatus::Failed);
        assert!(healthy.error_message.is_some());
        assert!(healthy.first_liquidatable_block.is_none());

        let analyzed = queue.record("0x01-0").unwrap();
        assert_eq!(analyzed.blocks_liquidatable, Some(20));

        assert!(queue.pull_unresolved(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_workers_capped_by_batch_size() {
        let (chain, events) = five_events();
        let queue = Arc::new(MemoryQueue::new(events[..2].to_vec()));
        let orch = orchestrator(Arc::new(chain), queue, options(8));

        let summary = orch.run_batch().await.unwrap();
        assert_eq!(summary.pulled, 2);
        assert_eq!(summary.workers, 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let (mut chain, events) = five_events();
        chain.fail_prices = true;
        let queue = Arc::new(MemoryQueue::new(events));
        let orch = orchestrator(Arc::new(chain), queue.clone(), options(2));

        let summary = orch.run_batch().await.unwrap();
        assert_eq!(summary.failed, 5);
        let record = queue.record("0x02-0").unwrap();
        assert!(record
            .error_message
            .unwrap()
            .starts_with("asset price lookup"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let queue = Arc::new(MemoryQueue::default());
        let orch = orchestrator(Arc::new(SyntheticChain::default()), queue, options(3));

        let summary = orch.run_batch().await.unwrap();
        assert_eq!(summary.pulled, 0);
        assert_eq!(summary.workers, 0);
    }

    #[tokio::test]
    async fn test_batch_size_limits_drain() {
        let (chain, events) = five_events();
        let queue = Arc::new(MemoryQueue::new(events));
        let opts = RunnerOptions {
            batch_size: 2,
            ..options(3)
        };
        let orch = orchestrator(Arc::new(chain), queue.clone(), opts);

        assert_eq!(orch.run_batch().await.unwrap().pulled, 2);
        assert_eq!(orch.run_batch().await.unwrap().pulled, 2);
        assert_eq!(orch.run_batch().await.unwrap().pulled, 1);
        assert_eq!(queue.record_count(), 5);
    }

    #[test]
    fn test_loop_state_accumulates() {
        let summary = BatchSummary {
            pulled: 5,
            analyzed: 4,
            failed: 1,
            workers: 3,
            elapsed: Duration::from_millis(10),
        };
        let state = LoopState::default().advance(&summary).advance(&summary);
        assert_eq!(state.iteration, 2);
        assert_eq!(state.total_pulled, 10);
        assert_eq!(state.total_analyzed, 8);
        assert_eq!(state.total_failed, 2);
    }

    #[tokio::test]
    async fn test_stop_requested_before_start() {
        let queue = Arc::new(MemoryQueue::default());
        let orch = orchestrator(Arc::new(SyntheticChain::default()), queue, options(3));
        let (_tx, rx) = watch::channel(true);

        let state = orch.run(rx).await.unwrap();
        assert_eq!(state.iteration, 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_sleep() {
        let (chain, events) = five_events();
        let queue = Arc::new(MemoryQueue::new(events));
        let orch = orchestrator(Arc::new(chain), queue.clone(), options(3));
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });

        let state = tokio::time::timeout(Duration::from_secs(10), orch.run(rx))
            .await
            .expect("loop should stop during sleep")
            .unwrap();

        assert_eq!(state.iteration, 1);
        assert_eq!(state.total_pulled, 5);
        assert_eq!(queue.record_count(), 5);
    }

    #[tokio::test]
    async fn test_closed_stop_channel_keeps_looping() {
        let (chain, events) = five_events();
        let queue = Arc::new(MemoryQueue::new(events));
        let opts = RunnerOptions {
            batch_size: 2,
            loop_interval: Duration::from_millis(10),
            ..options(3)
        };
        let orch = orchestrator(Arc::new(chain), queue.clone(), opts);
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let still_running = tokio::time::timeout(Duration::from_millis(500), orch.run(rx)).await;
        assert!(still_running.is_err());
        // Three batches of at most two drain all five events
        assert_eq!(queue.record_count(), 5);
    }
}
