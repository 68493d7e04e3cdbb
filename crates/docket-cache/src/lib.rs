//! # docket-cache
//!
//! Namespaced TTL cache for docket.
//!
//! This crate provides:
//! - Four fixed namespaces, each with its own TTL and entry bound
//! - Typed `get`/`set` over JSON-encoded values
//! - Hit/miss/eviction statistics updated synchronously by each operation
//! - The record invalidation rule and deterministic search-result keys
//!
//! ## Example
//!
//! ```ignore
//! use docket_cache::{CacheConfig, CacheManager, CacheNamespace};
//!
//! let cache = CacheManager::new(CacheConfig::default());
//! cache.set(CacheNamespace::RecordContent, record.id.to_string(), &record, None);
//! let hit: Option<DocumentRecord> = cache.get(CacheNamespace::RecordContent, &key);
//!
//! // After any mutation of the record
//! cache.invalidate_record(&record.id);
//! ```

pub mod manager;
pub mod namespace;

// Re-export core types
pub use docket_core::*;

pub use manager::{CacheManager, CacheStats};
pub use namespace::{CacheConfig, CacheNamespace, NamespacePolicy};
