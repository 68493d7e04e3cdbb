//! Query execution: cache, fuzzy index, substring fallback, pagination.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument};

use docket_cache::{CacheManager, CacheNamespace};
use docket_core::{
    defaults, DocumentRecord, Highlight, MatchKind, RecordSource, SearchField, SearchFilters,
    SearchHit, SearchQuery, SearchResults,
};

use crate::fuzzy::{FuzzyMatcher, MAX_SUPPORTED_DISTANCE};
use crate::index::IndexHandle;

/// Fields scanned by the substring fallback.
const SUBSTRING_FIELDS: [SearchField; 2] = [SearchField::ExtractedText, SearchField::OriginalName];

/// Configuration for the search engine.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum normalised distance for a field to count as a match (0.0 to 1.0)
    pub threshold: f64,
    /// Edit-distance cap for the automaton
    pub max_edit_distance: u8,
    /// Score assigned to substring fallback hits
    pub substring_score: f64,
    /// Whether to memoize results in the `searchResults` namespace
    pub cache_results: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::FUZZY_THRESHOLD,
            max_edit_distance: defaults::FUZZY_MAX_EDIT_DISTANCE,
            substring_score: defaults::SUBSTRING_MATCH_SCORE,
            cache_results: true,
        }
    }
}

impl SearchConfig {
    /// Set the fuzzy threshold, clamped to 0.0..=1.0.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the automaton edit distance, capped at [`MAX_SUPPORTED_DISTANCE`].
    pub fn with_max_edit_distance(mut self, distance: u8) -> Self {
        self.max_edit_distance = distance.min(MAX_SUPPORTED_DISTANCE);
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_results = enabled;
        self
    }
}

/// Answers search queries against the current index snapshot.
pub struct SearchEngine {
    index: Arc<IndexHandle>,
    cache: Arc<CacheManager>,
    source: Arc<dyn RecordSource>,
    matcher: FuzzyMatcher,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        index: Arc<IndexHandle>,
        cache: Arc<CacheManager>,
        source: Arc<dyn RecordSource>,
        config: SearchConfig,
    ) -> Self {
        Self {
            index,
            cache,
            source,
            matcher: FuzzyMatcher::new(config.max_edit_distance),
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    /// Run a query.
    ///
    /// Never fails: an empty term yields an empty page and out-of-range
    /// pagination is normalised.
    #[instrument(
        skip(self, query),
        fields(subsystem = "search", component = "engine", op = "search")
    )]
    pub fn search(&self, query: &SearchQuery) -> SearchResults {
        let pagination = query.pagination.normalized();
        let term = query.normalized_term();
        if term.is_empty() {
            debug!("Empty search term");
            return SearchResults::empty(pagination);
        }

        let key = CacheManager::search_key(&term, &query.filters, &pagination);
        // Read before ranking so a flush during ranking discards this result
        let epoch = self.cache.epoch(CacheNamespace::SearchResults);
        if self.config.cache_results {
            if let Some(cached) = self
                .cache
                .get::<SearchResults>(CacheNamespace::SearchResults, &key)
            {
                debug!(term = %term, "Search served from cache");
                return cached;
            }
        }

        let start = Instant::now();
        let (hits, match_kind) = self.rank(&term, &query.filters);
        let total_count = hits.len();

        let results = SearchResults {
            total_count,
            total_pages: pagination.total_pages(total_count),
            page: pagination.page,
            limit: pagination.limit,
            match_kind,
            hits: pagination.apply(hits),
        };

        if self.config.cache_results {
            self.cache
                .set_if_epoch(CacheNamespace::SearchResults, key, &results, None, epoch);
        }

        debug!(
            term = %term,
            total_count,
            match_kind = ?match_kind,
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );
        results
    }

    /// All hits for a normalised term, best first, before pagination.
    pub fn rank(&self, term: &str, filters: &SearchFilters) -> (Vec<SearchHit>, Option<MatchKind>) {
        if let Some(compiled) = self.matcher.compile(term) {
            let fuzzy = self
                .index
                .load()
                .search(&compiled, filters, self.config.threshold);
            if !fuzzy.is_empty() {
                return (fuzzy, Some(MatchKind::Fuzzy));
            }
        }

        let substring = substring_search(
            self.source.snapshot(),
            term,
            filters,
            self.config.substring_score,
        );
        if substring.is_empty() {
            (substring, None)
        } else {
            (substring, Some(MatchKind::Substring))
        }
    }
}

/// Case-insensitive substring scan over `extractedText` and `originalName`.
///
/// Hits share `score` and are ordered newest first.
pub fn substring_search(
    records: Vec<DocumentRecord>,
    term: &str,
    filters: &SearchFilters,
    score: f64,
) -> Vec<SearchHit> {
    let needle = term.to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<SearchHit> = records
        .into_iter()
        .filter(|r| filters.matches(r))
        .filter_map(|record| {
            let highlights: Vec<Highlight> = SUBSTRING_FIELDS
                .iter()
                .filter_map(|&field| {
                    let value = field.value_of(&record)?;
                    value
                        .to_lowercase()
                        .contains(&needle)
                        .then(|| Highlight::from_value(field, value))
                })
                .collect();
            if highlights.is_empty() {
                None
            } else {
                Some(SearchHit {
                    record,
                    score,
                    highlights,
                })
            }
        })
        .collect();

    hits.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
    hits
}
