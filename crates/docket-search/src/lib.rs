//! # docket-search
//!
//! Weighted fuzzy search over docket records.
//!
//! This crate provides:
//! - Edit-distance matching via Levenshtein automata (transpositions count once)
//! - Immutable index snapshots swapped atomically behind an [`IndexHandle`]
//! - Substring fallback when fuzzy matching finds nothing
//! - Cached, paginated results
//! - Background rebuilds with request coalescing
//!
//! ## Example
//!
//! ```ignore
//! use docket_search::{SearchConfig, SearchEngine, SearchQuery};
//!
//! let engine = SearchEngine::new(index, cache, source, SearchConfig::default());
//! let results = engine.search(&SearchQuery::new("invoice").with_page(1, 20));
//!
//! // After writes, schedule a rebuild; bursts collapse into one follow-up
//! coordinator.request_rebuild();
//! ```

pub mod engine;
pub mod fuzzy;
pub mod index;
pub mod rebuild;

// Re-export core types
pub use docket_core::*;

pub use engine::{substring_search, SearchConfig, SearchEngine};
pub use fuzzy::{tokenize, CompiledQuery, FuzzyMatcher};
pub use index::{FuzzyIndex, IndexHandle};
pub use rebuild::{
    index_queue_config, IndexRebuildHandler, RebuildCoordinator, RebuildRequest, RebuildState,
    RebuildSummary,
};
