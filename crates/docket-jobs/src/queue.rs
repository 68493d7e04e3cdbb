//! In-memory priority job queue with bounded concurrency, retries and
//! graceful shutdown.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot, Notify};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use docket_core::{defaults, Error, Job, JobStatus, JobType, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for a job queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Queue name used in logs, events and stats.
    pub name: String,
    /// Maximum number of jobs running at once.
    pub concurrency: usize,
    /// Retries allowed when a job does not set its own.
    pub default_max_retries: u32,
    /// Per-attempt timeout when a job does not set its own.
    pub default_timeout: Duration,
    /// Backoff unit; the delay before retry `n` is `n * retry_base_delay`.
    pub retry_base_delay: Duration,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "jobs".to_string(),
            concurrency: 1,
            default_max_retries: defaults::JOB_MAX_RETRIES,
            default_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECS),
            retry_base_delay: Duration::from_millis(defaults::JOB_RETRY_BASE_DELAY_MS),
            event_capacity: defaults::EVENT_BUS_CAPACITY,
        }
    }
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set maximum concurrent jobs (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

/// Per-job overrides supplied at enqueue time.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub priority: Option<i32>,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
}

impl JobOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Event emitted by a job queue.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A job was accepted.
    JobQueued { job_id: Uuid, job_type: JobType },
    /// An attempt started.
    JobStarted {
        job_id: Uuid,
        job_type: JobType,
        attempt: u32,
    },
    /// Job progress was updated.
    JobProgress {
        job_id: Uuid,
        percent: i32,
        message: Option<String>,
    },
    /// An attempt failed and the job will run again after `delay`.
    JobRetrying {
        job_id: Uuid,
        job_type: JobType,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, job_type: JobType },
    /// A job failed permanently.
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
    },
    /// A waiting job was dropped by shutdown.
    JobAbandoned { job_id: Uuid, job_type: JobType },
    /// The queue stopped accepting work.
    QueueShutdown { name: String },
}

/// Point-in-time queue statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub name: String,
    /// Jobs waiting to start.
    pub queue_length: usize,
    pub running_jobs: usize,
    /// Jobs sleeping out a retry backoff.
    pub retrying_jobs: usize,
    /// Concurrency limit.
    pub worker_count: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub accepting: bool,
}

/// Completion handle for an enqueued job.
#[derive(Debug)]
pub struct JobHandle<R> {
    pub id: Uuid,
    pub job_type: JobType,
    rx: oneshot::Receiver<Result<R>>,
}

impl<R> JobHandle<R> {
    /// Wait for the job's terminal result.
    ///
    /// Resolves to the handler output on success, the last attempt's error on
    /// failure, or [`Error::JobAbandoned`] when shutdown dropped the job.
    pub async fn wait(self) -> Result<R> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::JobAbandoned(self.id)),
        }
    }
}

struct PendingJob<P, R> {
    seq: u64,
    job: Job<P>,
    reply: oneshot::Sender<Result<R>>,
}

// Max-heap order: higher priority first, then lower sequence (earlier arrival).
impl<P, R> Ord for PendingJob<P, R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.job
            .priority
            .cmp(&other.job.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<P, R> PartialOrd for PendingJob<P, R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P, R> PartialEq for PendingJob<P, R> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<P, R> Eq for PendingJob<P, R> {}

struct QueueState<P, R> {
    pending: BinaryHeap<PendingJob<P, R>>,
    running: usize,
    retrying: usize,
    accepting: bool,
    next_seq: u64,
    completed: u64,
    failed: u64,
}

impl<P, R> QueueState<P, R> {
    fn push(&mut self, job: Job<P>, reply: oneshot::Sender<Result<R>>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingJob { seq, job, reply });
    }

    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running == 0 && self.retrying == 0
    }
}

enum Outcome<R> {
    Done(R),
    Retryable(Error),
    Fatal(Error),
}

struct QueueInner<H: JobHandler> {
    handler: Arc<H>,
    config: QueueConfig,
    state: Mutex<QueueState<H::Payload, H::Output>>,
    /// Signalled whenever a job leaves the running or retrying set.
    settled: Notify,
    /// Signalled once when shutdown begins, to cut retry backoffs short.
    closing: Notify,
    event_tx: broadcast::Sender<QueueEvent>,
}

/// Job queue driving a single [`JobHandler`].
///
/// Jobs start in priority order (ties by arrival) with at most
/// `config.concurrency` running at once. Each attempt is bounded by the job's
/// timeout; failed attempts are retried after `attempt * retry_base_delay`.
///
/// Enqueueing spawns tasks, so it must happen inside a Tokio runtime.
pub struct JobQueue<H: JobHandler> {
    inner: Arc<QueueInner<H>>,
}

impl<H: JobHandler> Clone for JobQueue<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: JobHandler> JobQueue<H> {
    pub fn new(handler: H, config: QueueConfig) -> Self {
        Self::with_shared_handler(Arc::new(handler), config)
    }

    pub fn with_shared_handler(handler: Arc<H>, mut config: QueueConfig) -> Self {
        config.concurrency = config.concurrency.max(1);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        info!(
            queue = %config.name,
            job_type = %handler.job_type(),
            concurrency = config.concurrency,
            "Job queue created"
        );
        Self {
            inner: Arc::new(QueueInner {
                handler,
                config,
                state: Mutex::new(QueueState {
                    pending: BinaryHeap::new(),
                    running: 0,
                    retrying: 0,
                    accepting: true,
                    next_seq: 0,
                    completed: 0,
                    failed: 0,
                }),
                settled: Notify::new(),
                closing: Notify::new(),
                event_tx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Accept a job and start it as soon as a worker slot is free.
    ///
    /// Fails with [`Error::QueueClosed`] after shutdown has begun.
    pub fn enqueue(
        &self,
        payload: H::Payload,
        options: JobOptions,
    ) -> Result<JobHandle<H::Output>> {
        let inner = &self.inner;
        let job_type = inner.handler.job_type();
        let job = Job::new(
            job_type,
            payload,
            options
                .priority
                .unwrap_or_else(|| job_type.default_priority()),
            options
                .max_retries
                .unwrap_or(inner.config.default_max_retries),
            options.timeout.unwrap_or(inner.config.default_timeout),
        );
        let id = job.id;
        let priority = job.priority;
        let (tx, rx) = oneshot::channel();

        {
            let mut state = inner.state.lock();
            if !state.accepting {
                return Err(Error::QueueClosed(inner.config.name.clone()));
            }
            state.push(job, tx);
        }

        debug!(queue = %inner.config.name, job_id = %id, priority, "Job queued");
        inner.emit(QueueEvent::JobQueued { job_id: id, job_type });
        inner.dispatch();

        Ok(JobHandle { id, job_type, rx })
    }

    pub fn stats(&self) -> QueueStats {
        let inner = &self.inner;
        let state = inner.state.lock();
        QueueStats {
            name: inner.config.name.clone(),
            queue_length: state.pending.len(),
            running_jobs: state.running,
            retrying_jobs: state.retrying,
            worker_count: inner.config.concurrency,
            completed_jobs: state.completed,
            failed_jobs: state.failed,
            accepting: state.accepting,
        }
    }

    /// Get a receiver for queue events.
    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.state.lock().accepting
    }

    /// Wait until nothing is pending, running or backing off.
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.inner.settled.notified();
            if self.inner.state.lock().is_idle() {
                return;
            }
            settled.await;
        }
    }

    /// Stop accepting work, abandon waiting jobs and wait up to `grace` for
    /// running jobs to finish.
    ///
    /// Jobs still running when `grace` elapses are left to finish in the
    /// background; their handles still resolve.
    pub async fn shutdown(&self, grace: Duration) {
        let inner = &self.inner;
        let drained: Vec<PendingJob<H::Payload, H::Output>> = {
            let mut state = inner.state.lock();
            if !state.accepting {
                debug!(queue = %inner.config.name, "Shutdown already in progress");
                Vec::new()
            } else {
                state.accepting = false;
                state.pending.drain().collect()
            }
        };
        inner.closing.notify_waiters();

        let abandoned = drained.len();
        for pending in drained {
            inner.abandon(pending.job, pending.reply);
        }

        info!(
            queue = %inner.config.name,
            abandoned,
            "Job queue shutting down"
        );

        let drain = async {
            loop {
                let settled = inner.settled.notified();
                let busy = {
                    let state = inner.state.lock();
                    state.running > 0 || state.retrying > 0
                };
                if !busy {
                    return;
                }
                settled.await;
            }
        };

        if timeout(grace, drain).await.is_err() {
            let running = inner.state.lock().running;
            warn!(
                queue = %inner.config.name,
                running,
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace period elapsed with jobs still running"
            );
        }

        inner.emit(QueueEvent::QueueShutdown {
            name: inner.config.name.clone(),
        });
        info!(queue = %inner.config.name, "Job queue stopped");
    }
}

impl<H: JobHandler> QueueInner<H> {
    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Start waiting jobs while worker slots are free.
    fn dispatch(self: &Arc<Self>) {
        loop {
            let next = {
                let mut state = self.state.lock();
                if state.running >= self.config.concurrency {
                    return;
                }
                match state.pending.pop() {
                    Some(pending) => {
                        state.running += 1;
                        pending
                    }
                    None => return,
                }
            };
            let inner = Arc::clone(self);
            tokio::spawn(async move { inner.run(next).await });
        }
    }

    async fn run(self: Arc<Self>, pending: PendingJob<H::Payload, H::Output>) {
        let PendingJob { mut job, reply, .. } = pending;
        job.attempt += 1;
        job.transition(JobStatus::Running);

        let job_id = job.id;
        let job_type = job.job_type;
        let attempt = job.attempt;

        debug!(
            queue = %self.config.name,
            job_id = %job_id,
            attempt,
            max_retries = job.max_retries,
            "Starting job attempt"
        );
        self.emit(QueueEvent::JobStarted {
            job_id,
            job_type,
            attempt,
        });

        let outcome = self.attempt(&job).await;
        let accepting = self.state.lock().accepting;

        match outcome {
            Outcome::Done(value) => {
                {
                    let mut state = self.state.lock();
                    state.running -= 1;
                    state.completed += 1;
                }
                job.transition(JobStatus::Completed);
                info!(
                    queue = %self.config.name,
                    job_id = %job_id,
                    job_type = %job_type,
                    attempt,
                    "Job completed"
                );
                self.emit(QueueEvent::JobCompleted { job_id, job_type });
                let _ = reply.send(Ok(value));
            }
            Outcome::Retryable(err) if job.can_retry() && accepting => {
                let delay = self.config.retry_base_delay * attempt;
                {
                    let mut state = self.state.lock();
                    state.running -= 1;
                    state.retrying += 1;
                }
                job.transition(JobStatus::Retrying);
                warn!(
                    queue = %self.config.name,
                    job_id = %job_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Job attempt failed, retrying"
                );
                self.emit(QueueEvent::JobRetrying {
                    job_id,
                    job_type,
                    attempt,
                    delay,
                    error: err.to_string(),
                });
                let inner = Arc::clone(&self);
                tokio::spawn(async move { inner.backoff(job, reply, delay).await });
            }
            Outcome::Retryable(err) | Outcome::Fatal(err) => {
                {
                    let mut state = self.state.lock();
                    state.running -= 1;
                    state.failed += 1;
                }
                job.transition(JobStatus::Failed);
                error!(
                    queue = %self.config.name,
                    job_id = %job_id,
                    job_type = %job_type,
                    attempt,
                    error = %err,
                    "Job failed"
                );
                self.emit(QueueEvent::JobFailed {
                    job_id,
                    job_type,
                    error: err.to_string(),
                });
                let _ = reply.send(Err(err));
            }
        }

        self.settled.notify_waiters();
        self.dispatch();
    }

    /// Run one attempt on its own task so that a panicking handler or an
    /// expired timeout cannot leak a worker slot.
    async fn attempt(self: &Arc<Self>, job: &Job<H::Payload>) -> Outcome<H::Output> {
        let events = self.event_tx.clone();
        let job_id = job.id;
        let ctx = JobContext::new(job.clone()).with_progress_callback(move |percent, message| {
            let _ = events.send(QueueEvent::JobProgress {
                job_id,
                percent,
                message: message.map(String::from),
            });
        });

        let handler = Arc::clone(&self.handler);
        let mut task = tokio::spawn(async move { handler.execute(ctx).await });

        match timeout(job.timeout, &mut task).await {
            Ok(Ok(JobResult::Success(value))) => Outcome::Done(value),
            Ok(Ok(JobResult::Retry(msg))) => Outcome::Retryable(Error::Job(msg)),
            Ok(Ok(JobResult::Failed(msg))) => Outcome::Fatal(Error::Job(msg)),
            Ok(Err(join_err)) => {
                error!(job_id = %job_id, error = %join_err, "Job task panicked");
                Outcome::Retryable(Error::Internal(format!("Job task panicked: {}", join_err)))
            }
            Err(_) => {
                task.abort();
                Outcome::Retryable(Error::JobTimeout(job.timeout.as_millis() as u64))
            }
        }
    }

    async fn backoff(
        self: Arc<Self>,
        mut job: Job<H::Payload>,
        reply: oneshot::Sender<Result<H::Output>>,
        delay: Duration,
    ) {
        let closing = self.closing.notified();
        tokio::pin!(closing);
        // Register before checking so a concurrent shutdown is not missed.
        closing.as_mut().enable();

        let accepting = self.state.lock().accepting;
        let shut_down = if !accepting {
            true
        } else {
            tokio::select! {
                _ = sleep(delay) => false,
                _ = &mut closing => true,
            }
        };

        let requeued = {
            let mut state = self.state.lock();
            state.retrying -= 1;
            if !shut_down && state.accepting {
                job.transition(JobStatus::Queued);
                state.push(job, reply);
                None
            } else {
                Some((job, reply))
            }
        };

        if let Some((job, reply)) = requeued {
            self.abandon(job, reply);
        }
        self.settled.notify_waiters();
        self.dispatch();
    }

    fn abandon(&self, mut job: Job<H::Payload>, reply: oneshot::Sender<Result<H::Output>>) {
        job.transition(JobStatus::Abandoned);
        debug!(queue = %self.config.name, job_id = %job.id, "Job abandoned");
        self.emit(QueueEvent::JobAbandoned {
            job_id: job.id,
            job_type: job.job_type,
        });
        let _ = reply.send(Err(Error::JobAbandoned(job.id)));
    }
}
