//! Index rebuild job and the coordinator that coalesces rebuild requests.
//!
//! ```text
//! idle --request--> rebuilding --request--> rebuilding_with_pending
//!  ^                    |                            |
//!  +------finish--------+        finish: start one follow-up rebuild
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use docket_cache::{CacheManager, CacheNamespace};
use docket_core::{defaults, JobType, RecordSource};
use docket_jobs::{JobContext, JobHandler, JobOptions, JobQueue, JobResult, QueueConfig};

use crate::index::{FuzzyIndex, IndexHandle};

/// Payload of an index rebuild job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildRequest {
    pub requested_at: DateTime<Utc>,
}

impl RebuildRequest {
    pub fn now() -> Self {
        Self {
            requested_at: Utc::now(),
        }
    }
}

/// Outcome of a completed rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSummary {
    pub generation: u64,
    pub record_count: usize,
    pub token_count: usize,
    pub duration_ms: u64,
}

/// Queue settings for index maintenance: one worker, so two rebuilds never
/// overlap.
pub fn index_queue_config() -> QueueConfig {
    QueueConfig::new("index")
        .with_concurrency(defaults::INDEX_QUEUE_CONCURRENCY)
        .with_max_retries(defaults::INDEX_REBUILD_MAX_RETRIES)
        .with_timeout(Duration::from_secs(defaults::INDEX_REBUILD_TIMEOUT_SECS))
}

/// Rebuilds the fuzzy index from the record source and swaps it in.
pub struct IndexRebuildHandler {
    source: Arc<dyn RecordSource>,
    index: Arc<IndexHandle>,
    cache: Arc<CacheManager>,
}

impl IndexRebuildHandler {
    pub fn new(
        source: Arc<dyn RecordSource>,
        index: Arc<IndexHandle>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            source,
            index,
            cache,
        }
    }
}

#[async_trait]
impl JobHandler for IndexRebuildHandler {
    type Payload = RebuildRequest;
    type Output = RebuildSummary;

    fn job_type(&self) -> JobType {
        JobType::IndexRebuild
    }

    async fn execute(&self, ctx: JobContext<RebuildRequest>) -> JobResult<RebuildSummary> {
        let start = Instant::now();
        let records = self.source.snapshot();
        ctx.report_progress(10, Some("Building index"));

        // Tokenising every record is CPU-bound; keep it off the async workers
        let index = match tokio::task::spawn_blocking(move || FuzzyIndex::build(records)).await {
            Ok(index) => index,
            Err(e) => return JobResult::Retry(format!("Index build task failed: {}", e)),
        };

        let record_count = index.len();
        let token_count = index.token_count();
        let generation = self.index.swap(index);
        let flushed = self.cache.flush(CacheNamespace::SearchResults);

        let duration_ms = start.elapsed().as_millis() as u64;
        ctx.report_progress(100, Some("Index swapped"));
        info!(
            subsystem = "search",
            op = "rebuild",
            generation,
            record_count,
            token_count,
            flushed_results = flushed,
            duration_ms,
            queued_ms = (Utc::now() - ctx.payload().requested_at).num_milliseconds(),
            "Search index rebuilt"
        );

        JobResult::Success(RebuildSummary {
            generation,
            record_count,
            token_count,
            duration_ms,
        })
    }
}

/// Rebuild coalescing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebuildState {
    Idle,
    Rebuilding,
    /// A request arrived mid-rebuild; exactly one follow-up will run.
    RebuildingWithPending,
}

/// Schedules rebuilds on the index queue, collapsing bursts of requests.
///
/// Any number of requests made while a rebuild is in flight produce a
/// single follow-up rebuild, so the index catches up with the last write
/// without rebuilding once per write.
pub struct RebuildCoordinator {
    queue: JobQueue<IndexRebuildHandler>,
    state: Mutex<RebuildState>,
    settled: Notify,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl RebuildCoordinator {
    pub fn new(queue: JobQueue<IndexRebuildHandler>) -> Arc<Self> {
        Arc::new(Self {
            queue,
            state: Mutex::new(RebuildState::Idle),
            settled: Notify::new(),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    /// Ask for the index to be rebuilt. Returns immediately.
    pub fn request_rebuild(self: &Arc<Self>) {
        let start = {
            let mut state = self.state.lock();
            match *state {
                RebuildState::Idle => {
                    *state = RebuildState::Rebuilding;
                    true
                }
                RebuildState::Rebuilding | RebuildState::RebuildingWithPending => {
                    *state = RebuildState::RebuildingWithPending;
                    false
                }
            }
        };

        if start {
            self.start();
        } else {
            debug!("Rebuild in flight, follow-up marked pending");
        }
    }

    fn start(self: &Arc<Self>) {
        match self.queue.enqueue(RebuildRequest::now(), JobOptions::default()) {
            Ok(handle) => {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    match handle.wait().await {
                        Ok(summary) => {
                            this.completed.fetch_add(1, Ordering::SeqCst);
                            debug!(generation = summary.generation, "Rebuild finished");
                        }
                        Err(e) => {
                            this.failed.fetch_add(1, Ordering::SeqCst);
                            warn!(error = %e, "Index rebuild failed, keeping previous snapshot");
                        }
                    }
                    this.finish();
                });
            }
            Err(e) => {
                debug!(error = %e, "Index queue closed, rebuild skipped");
                *self.state.lock() = RebuildState::Idle;
                self.settled.notify_waiters();
            }
        }
    }

    fn finish(self: &Arc<Self>) {
        let again = {
            let mut state = self.state.lock();
            match *state {
                RebuildState::RebuildingWithPending => {
                    *state = RebuildState::Rebuilding;
                    true
                }
                _ => {
                    *state = RebuildState::Idle;
                    false
                }
            }
        };

        if again {
            debug!("Starting coalesced follow-up rebuild");
            self.start();
        } else {
            self.settled.notify_waiters();
        }
    }

    pub fn state(&self) -> RebuildState {
        *self.state.lock()
    }

    /// Whether a rebuild is queued or running.
    pub fn is_rebuilding(&self) -> bool {
        self.state() != RebuildState::Idle
    }

    /// Whether writes arrived during the current rebuild.
    pub fn is_dirty(&self) -> bool {
        self.state() == RebuildState::RebuildingWithPending
    }

    pub fn completed_rebuilds(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed_rebuilds(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn queue(&self) -> &JobQueue<IndexRebuildHandler> {
        &self.queue
    }

    /// Wait until no rebuild is queued, running or pending.
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.settled.notified();
            if self.state() == RebuildState::Idle {
                return;
            }
            settled.await;
        }
    }
}
