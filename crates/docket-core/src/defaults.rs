//! Centralized default constants for docket.
//!
//! **This module is the single source of truth** for shared default values.
//! Component configs and `ServiceConfig::from_env` fall back to these
//! constants instead of defining their own magic numbers.

// =============================================================================
// CACHE
// =============================================================================

/// TTL for cached document records (1 hour).
pub const CACHE_RECORD_CONTENT_TTL_SECS: u64 = 3600;

/// Maximum cached document records.
pub const CACHE_RECORD_CONTENT_MAX_ENTRIES: usize = 1000;

/// TTL for cached search result pages (5 minutes).
pub const CACHE_SEARCH_RESULTS_TTL_SECS: u64 = 300;

/// Maximum cached search result pages.
pub const CACHE_SEARCH_RESULTS_MAX_ENTRIES: usize = 500;

/// TTL for cached record metadata maps (30 minutes).
pub const CACHE_RECORD_METADATA_TTL_SECS: u64 = 1800;

/// Maximum cached record metadata maps.
pub const CACHE_RECORD_METADATA_MAX_ENTRIES: usize = 1000;

/// TTL for cached extracted text payloads (24 hours).
///
/// Extraction is expensive to redo, so these live longest.
pub const CACHE_EXTRACTED_TEXT_TTL_SECS: u64 = 86_400;

/// Maximum cached extracted text payloads.
pub const CACHE_EXTRACTED_TEXT_MAX_ENTRIES: usize = 200;

/// Prefix for derived search-result cache keys.
pub const SEARCH_CACHE_KEY_PREFIX: &str = "search:";

// =============================================================================
// JOB PROCESSING
// =============================================================================

/// Default maximum retry count for failed jobs.
pub const JOB_MAX_RETRIES: u32 = 3;

/// Default per-attempt job timeout in seconds.
pub const JOB_TIMEOUT_SECS: u64 = 60;

/// Base delay between retries in milliseconds; multiplied by the attempt number.
pub const JOB_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Default job priority (higher runs first).
pub const JOB_PRIORITY: i32 = 0;

/// Default concurrency for the extraction queue.
pub const EXTRACTION_CONCURRENCY: usize = 2;

/// Concurrency of the index maintenance queue. Never more than one rebuild.
pub const INDEX_QUEUE_CONCURRENCY: usize = 1;

/// Per-attempt timeout for an index rebuild in seconds.
pub const INDEX_REBUILD_TIMEOUT_SECS: u64 = 120;

/// Retries for an index rebuild.
pub const INDEX_REBUILD_MAX_RETRIES: u32 = 1;

/// Default queue event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Default time to wait for running jobs on shutdown, in seconds.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Maximum bytes read by the plain-text extractor (10 MB).
pub const TEXT_EXTRACTION_MAX_BYTES: usize = 10 * 1024 * 1024;

// =============================================================================
// SEARCH
// =============================================================================

/// Fuzzy match threshold. Normalised distances above this are discarded.
pub const FUZZY_THRESHOLD: f64 = 0.3;

/// Largest edit distance the fuzzy automaton evaluates exactly.
pub const FUZZY_MAX_EDIT_DISTANCE: u8 = 2;

/// Fixed score for substring fallback hits. Must stay below `FUZZY_THRESHOLD`.
pub const SUBSTRING_MATCH_SCORE: f64 = 0.1;

/// Field weight for extracted document text.
pub const WEIGHT_EXTRACTED_TEXT: f64 = 0.70;

/// Field weight for the original upload filename.
pub const WEIGHT_ORIGINAL_NAME: f64 = 0.20;

/// Field weight for `metadata.title`.
pub const WEIGHT_METADATA_TITLE: f64 = 0.05;

/// Field weight for `metadata.author`.
pub const WEIGHT_METADATA_AUTHOR: f64 = 0.05;

/// Snippet length in characters for highlight values.
pub const SNIPPET_LENGTH: usize = 200;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for search.
pub const PAGE_LIMIT_SEARCH: usize = 20;

/// Maximum page size for search.
pub const PAGE_LIMIT_MAX: usize = 100;

/// Default page size for record listings.
pub const PAGE_LIMIT: usize = 50;

// =============================================================================
// PERSISTENCE
// =============================================================================

/// Default snapshot file location.
pub const SNAPSHOT_PATH: &str = "./data/records.json";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_score_beats_fuzzy_threshold() {
        assert!(SUBSTRING_MATCH_SCORE < FUZZY_THRESHOLD);
    }

    #[test]
    fn test_field_weights_sum_to_one() {
        let sum = WEIGHT_EXTRACTED_TEXT
            + WEIGHT_ORIGINAL_NAME
            + WEIGHT_METADATA_TITLE
            + WEIGHT_METADATA_AUTHOR;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_search_results_ttl_is_shortest() {
        assert!(CACHE_SEARCH_RESULTS_TTL_SECS < CACHE_RECORD_METADATA_TTL_SECS);
        assert!(CACHE_RECORD_METADATA_TTL_SECS < CACHE_RECORD_CONTENT_TTL_SECS);
        assert!(CACHE_RECORD_CONTENT_TTL_SECS <= CACHE_EXTRACTED_TEXT_TTL_SECS);
    }
}
