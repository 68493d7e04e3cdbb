//! # docket-jobs
//!
//! In-memory background job queues for docket.
//!
//! This crate provides:
//! - Priority-ordered queues with a bounded number of concurrent jobs
//! - Per-attempt timeouts and retries with linear backoff
//! - Progress and lifecycle notifications via broadcast channels
//! - Graceful shutdown that abandons waiting work
//! - The text extraction handler and its extractor registry
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docket_jobs::{
//!     ExtractionHandler, ExtractionRequest, ExtractorRegistry, JobOptions, JobQueue, QueueConfig,
//! };
//!
//! let registry = Arc::new(ExtractorRegistry::with_builtin());
//! let queue = JobQueue::new(
//!     ExtractionHandler::new(registry),
//!     QueueConfig::new("extraction").with_concurrency(2),
//! );
//!
//! let handle = queue.enqueue(
//!     ExtractionRequest::new(record.id, "/uploads/a.txt", "text/plain"),
//!     JobOptions::default(),
//! )?;
//! let extracted = handle.wait().await?;
//!
//! // Graceful shutdown
//! queue.shutdown(Duration::from_secs(10)).await;
//! ```

pub mod adapters;
pub mod extraction;
pub mod extraction_handler;
pub mod handler;
pub mod queue;

// Re-export core types
pub use docket_core::*;

// Re-export job types
pub use handler::{JobContext, JobHandler, JobResult, ProgressCallback};
pub use queue::{JobHandle, JobOptions, JobQueue, QueueConfig, QueueEvent, QueueStats};

// Re-export extraction types
pub use adapters::PlainTextExtractor;
pub use extraction::ExtractorRegistry;
pub use extraction_handler::{ExtractionHandler, ExtractionRequest};
