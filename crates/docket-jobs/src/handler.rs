//! Job handler trait and the per-attempt execution context.

use async_trait::async_trait;
use uuid::Uuid;

use docket_core::{Job, JobType};

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32, Option<&str>) + Send + Sync>;

/// Context provided to a handler for one attempt of a job.
pub struct JobContext<P> {
    /// The job being processed, with `attempt` already incremented.
    pub job: Job<P>,
    /// Progress callback for updating job progress.
    progress_callback: Option<ProgressCallback>,
}

impl<P> JobContext<P> {
    /// Create a new job context.
    pub fn new(job: Job<P>) -> Self {
        Self {
            job,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32, Option<&str>) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress to the callback.
    pub fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent, message);
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// One-based number of the current attempt.
    pub fn attempt(&self) -> u32 {
        self.job.attempt
    }

    /// Get the job payload.
    pub fn payload(&self) -> &P {
        &self.job.payload
    }
}

/// Result of one job attempt.
#[derive(Debug)]
pub enum JobResult<T> {
    /// Attempt succeeded; the job completes with this value.
    Success(T),
    /// Attempt failed; retried with backoff while retries remain.
    Retry(String),
    /// Permanent failure; the job fails without further attempts.
    Failed(String),
}

impl<T> JobResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }
}

/// Work function for one job type.
///
/// A queue is parameterised by exactly one handler, which fixes the payload
/// and output types of every job it accepts.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Input carried by each job.
    type Payload: Clone + Send + Sync + 'static;
    /// Value a successful job resolves to.
    type Output: Send + 'static;

    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute one attempt.
    async fn execute(&self, ctx: JobContext<Self::Payload>) -> JobResult<Self::Output>;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn create_test_job(payload: &str) -> Job<String> {
        Job::new(
            JobType::Extraction,
            payload.to_string(),
            0,
            3,
            Duration::from_secs(5),
        )
    }

    struct EchoHandler;

    #[async_trait]
    impl JobHandler for EchoHandler {
        type Payload = String;
        type Output = String;

        fn job_type(&self) -> JobType {
            JobType::Extraction
        }

        async fn execute(&self, ctx: JobContext<String>) -> JobResult<String> {
            ctx.report_progress(50, Some("Processing..."));
            ctx.report_progress(100, Some("Done"));
            JobResult::Success(ctx.payload().to_uppercase())
        }
    }

    #[test]
    fn test_job_context_new() {
        let job = create_test_job("data");
        let ctx = JobContext::new(job.clone());
        assert_eq!(ctx.job_id(), job.id);
        assert_eq!(ctx.payload(), "data");
        assert_eq!(ctx.attempt(), 0);
        assert!(ctx.progress_callback.is_none());
    }

    #[test]
    fn test_job_context_report_progress_without_callback() {
        let ctx = JobContext::new(create_test_job("data"));
        ctx.report_progress(10, None);
    }

    #[test]
    fn test_job_context_report_progress_with_callback() {
        let last = Arc::new(AtomicI32::new(-1));
        let seen = last.clone();
        let ctx = JobContext::new(create_test_job("data"))
            .with_progress_callback(move |percent, _| seen.store(percent, Ordering::SeqCst));

        ctx.report_progress(40, Some("reading"));
        assert_eq!(last.load(Ordering::SeqCst), 40);
    }

    #[tokio::test]
    async fn test_handler_execute_and_can_handle() {
        let handler = EchoHandler;
        assert!(handler.can_handle(JobType::Extraction));
        assert!(!handler.can_handle(JobType::IndexRebuild));

        let result = handler
            .execute(JobContext::new(create_test_job("hello")))
            .await;
        match result {
            JobResult::Success(out) => assert_eq!(out, "HELLO"),
            other => panic!("Expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_job_result_is_success() {
        assert!(JobResult::Success(()).is_success());
        assert!(!JobResult::<()>::Retry("again".into()).is_success());
        assert!(!JobResult::<()>::Failed("no".into()).is_success());
    }
}
