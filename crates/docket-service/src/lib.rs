//! # docket-service
//!
//! Wiring for a docket instance.
//!
//! This crate provides:
//! - `ServiceConfig` with environment overrides
//! - `ServiceContainer`, the single owner of the cache, queues, index and store
//! - `DocumentService` for ingest, search and listing
//! - `HealthReport` aggregating every component's statistics
//!
//! ## Example
//!
//! ```ignore
//! use docket_service::{ServiceConfig, ServiceContainer, UploadedFile};
//!
//! let container = ServiceContainer::build(ServiceConfig::from_env()).await?;
//! let docs = container.documents();
//!
//! let record = docs.ingest_and_wait(upload).await?;
//! let results = docs.search(&SearchQuery::new("invoice"));
//!
//! container.shutdown().await?;
//! ```

pub mod config;
pub mod container;
pub mod documents;
pub mod health;

// Re-export core types
pub use docket_core::*;

pub use config::ServiceConfig;
pub use container::ServiceContainer;
pub use documents::DocumentService;
pub use health::{HealthReport, IndexHealth};
