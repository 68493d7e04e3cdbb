//! # docket-db
//!
//! Record storage for docket.
//!
//! This crate provides:
//! - The in-memory record table shared with the index rebuilder
//! - `RecordStore` with cache-first reads and write-side invalidation
//! - Atomic JSON snapshot persistence with a coalescing background writer
//!
//! ## Example
//!
//! ```rust,ignore
//! use docket_db::{RecordStore, RecordTable, StoreConfig};
//!
//! let table = Arc::new(RecordTable::new());
//! let config = StoreConfig::new("./data/records.json");
//! let store = RecordStore::open(config, table, cache, rebuild).await;
//!
//! let record = store.save(DocumentRecord::new("a.txt", "text/plain", 5, "/uploads/a.txt"));
//! assert!(store.exists(&record.id));
//!
//! store.close().await?;
//! ```

pub mod snapshot;
pub mod store;
pub mod table;

// Re-export core types
pub use docket_core::*;

pub use snapshot::{load_or_empty, SnapshotFile, SnapshotWriter};
pub use store::{RecordStore, StoreConfig, StoreStats};
pub use table::RecordTable;
