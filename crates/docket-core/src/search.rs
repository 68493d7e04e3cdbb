//! Search request and result types shared by the index, cache and service.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::models::DocumentRecord;

/// A weighted field of the fuzzy index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SearchField {
    #[serde(rename = "extractedText")]
    ExtractedText,
    #[serde(rename = "originalName")]
    OriginalName,
    #[serde(rename = "metadata.title")]
    MetadataTitle,
    #[serde(rename = "metadata.author")]
    MetadataAuthor,
}

impl SearchField {
    pub const ALL: [SearchField; 4] = [
        SearchField::ExtractedText,
        SearchField::OriginalName,
        SearchField::MetadataTitle,
        SearchField::MetadataAuthor,
    ];

    /// Relative weight of the field in the combined score.
    pub fn weight(&self) -> f64 {
        match self {
            SearchField::ExtractedText => defaults::WEIGHT_EXTRACTED_TEXT,
            SearchField::OriginalName => defaults::WEIGHT_ORIGINAL_NAME,
            SearchField::MetadataTitle => defaults::WEIGHT_METADATA_TITLE,
            SearchField::MetadataAuthor => defaults::WEIGHT_METADATA_AUTHOR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::ExtractedText => "extractedText",
            SearchField::OriginalName => "originalName",
            SearchField::MetadataTitle => "metadata.title",
            SearchField::MetadataAuthor => "metadata.author",
        }
    }

    /// Raw value of this field on a record, if present.
    pub fn value_of<'a>(&self, record: &'a DocumentRecord) -> Option<&'a str> {
        let value = match self {
            SearchField::ExtractedText => Some(record.extracted_text.as_str()),
            SearchField::OriginalName => Some(record.original_name.as_str()),
            SearchField::MetadataTitle => record.metadata_str("title"),
            SearchField::MetadataAuthor => record.metadata_str("author"),
        };
        value.filter(|v| !v.is_empty())
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional restrictions applied before matching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// Allowed MIME types. Empty means any.
    #[serde(default)]
    pub mime_types: BTreeSet<String>,
    /// Inclusive lower bound on `createdAt`.
    pub created_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `createdAt`.
    pub created_before: Option<DateTime<Utc>>,
}

impl SearchFilters {
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_types.insert(mime_type.into());
        self
    }

    pub fn with_created_range(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mime_types.is_empty() && self.created_after.is_none() && self.created_before.is_none()
    }

    /// Whether a record passes every filter.
    pub fn matches(&self, record: &DocumentRecord) -> bool {
        if !self.mime_types.is_empty() && !self.mime_types.contains(&record.mime_type) {
            return false;
        }
        if let Some(after) = self.created_after {
            if record.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if record.created_at > before {
                return false;
            }
        }
        true
    }
}

/// One-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: defaults::PAGE_LIMIT_SEARCH,
        }
    }
}

impl Pagination {
    pub fn new(page: usize, limit: usize) -> Self {
        Self { page, limit }
    }

    /// Bring out-of-range values back into range instead of failing.
    ///
    /// `page < 1` becomes 1, `limit < 1` becomes the default, and limits
    /// above the maximum are clamped.
    pub fn normalized(self) -> Self {
        let page = self.page.max(1);
        let limit = match self.limit {
            0 => defaults::PAGE_LIMIT_SEARCH,
            n => n.min(defaults::PAGE_LIMIT_MAX),
        };
        Self { page, limit }
    }

    /// Offset of the first item on this page.
    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1)).saturating_mul(self.limit)
    }

    /// Number of pages needed for `total` items.
    pub fn total_pages(&self, total: usize) -> usize {
        if self.limit == 0 {
            return 0;
        }
        total.div_ceil(self.limit)
    }

    /// Slice `items` to this page.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.offset()).take(self.limit).collect()
    }
}

/// A search request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub term: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub pagination: Pagination,
}

impl SearchQuery {
    pub fn new(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            ..Default::default()
        }
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_page(mut self, page: usize, limit: usize) -> Self {
        self.pagination = Pagination::new(page, limit);
        self
    }

    /// Lowercased, trimmed term with inner whitespace collapsed.
    pub fn normalized_term(&self) -> String {
        normalize_term(&self.term)
    }
}

/// Normalise a search term: trim, lowercase and collapse whitespace.
pub fn normalize_term(term: &str) -> String {
    term.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// How a hit was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Fuzzy,
    Substring,
}

/// The field that matched and its raw value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub field: SearchField,
    pub value: String,
}

impl Highlight {
    /// Build a highlight, truncating the value to the snippet length.
    pub fn from_value(field: SearchField, value: &str) -> Self {
        let value = if value.chars().count() > defaults::SNIPPET_LENGTH {
            value.chars().take(defaults::SNIPPET_LENGTH).collect()
        } else {
            value.to_string()
        };
        Self { field, value }
    }
}

/// A ranked hit. Lower `score` is better; 0 is a perfect match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub record: DocumentRecord,
    pub score: f64,
    pub highlights: Vec<Highlight>,
}

/// One page of results plus totals computed before pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total_count: usize,
    pub total_pages: usize,
    pub page: usize,
    pub limit: usize,
    pub match_kind: Option<MatchKind>,
}

impl SearchResults {
    /// An empty page for the given window.
    pub fn empty(pagination: Pagination) -> Self {
        Self {
            hits: Vec::new(),
            total_count: 0,
            total_pages: 0,
            page: pagination.page,
            limit: pagination.limit,
            match_kind: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pagination_second_page_of_twenty_five() {
        let page = Pagination::new(2, 10);
        let items: Vec<usize> = (1..=25).collect();
        assert_eq!(page.apply(items), (11..=20).collect::<Vec<_>>());
        assert_eq!(page.total_pages(25), 3);
    }

    #[test]
    fn test_pagination_normalized() {
        assert_eq!(Pagination::new(0, 0).normalized(), Pagination::new(1, 20));
        assert_eq!(Pagination::new(3, 5000).normalized(), Pagination::new(3, 100));
        assert_eq!(Pagination::new(2, 10).normalized(), Pagination::new(2, 10));
    }

    #[test]
    fn test_pagination_past_end_is_empty() {
        let page = Pagination::new(9, 10);
        assert!(page.apply((1..=25).collect::<Vec<_>>()).is_empty());
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("  Invoice   NUMBER \t"), "invoice number");
        assert_eq!(normalize_term("   "), "");
    }

    #[test]
    fn test_filters_mime_and_range() {
        let record = DocumentRecord::new("a.txt", "text/plain", 1, "/a");
        let now = record.created_at;

        assert!(SearchFilters::default().matches(&record));
        assert!(SearchFilters::default()
            .with_mime_type("text/plain")
            .matches(&record));
        assert!(!SearchFilters::default()
            .with_mime_type("application/pdf")
            .matches(&record));
        assert!(SearchFilters::default()
            .with_created_range(Some(now), Some(now))
            .matches(&record));
        assert!(!SearchFilters::default()
            .with_created_range(Some(now + Duration::seconds(1)), None)
            .matches(&record));
    }

    #[test]
    fn test_highlight_truncates_long_values() {
        let long = "x".repeat(defaults::SNIPPET_LENGTH + 50);
        let h = Highlight::from_value(SearchField::ExtractedText, &long);
        assert_eq!(h.value.chars().count(), defaults::SNIPPET_LENGTH);
    }

    #[test]
    fn test_field_value_of_skips_empty() {
        let record = DocumentRecord::new("a.txt", "text/plain", 1, "/a");
        assert!(SearchField::ExtractedText.value_of(&record).is_none());
        assert_eq!(SearchField::OriginalName.value_of(&record), Some("a.txt"));
        assert!(SearchField::MetadataAuthor.value_of(&record).is_none());
    }
}
