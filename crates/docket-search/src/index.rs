//! Immutable fuzzy index snapshots and the handle readers load them from.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use docket_core::{DocumentRecord, Highlight, SearchField, SearchFilters, SearchHit};

use crate::fuzzy::{tokenize, CompiledQuery};

struct IndexedField {
    field: SearchField,
    tokens: Vec<String>,
}

struct IndexedRecord {
    record: DocumentRecord,
    fields: Vec<IndexedField>,
}

impl IndexedRecord {
    fn new(record: DocumentRecord) -> Self {
        let fields = SearchField::ALL
            .iter()
            .filter_map(|&field| {
                let value = field.value_of(&record)?;
                // Unique tokens; repeats never improve a minimum distance
                let tokens: BTreeSet<String> = tokenize(value).into_iter().collect();
                if tokens.is_empty() {
                    None
                } else {
                    Some(IndexedField {
                        field,
                        tokens: tokens.into_iter().collect(),
                    })
                }
            })
            .collect();
        Self { record, fields }
    }
}

/// A fuzzy hit before pagination, with its ranking keys.
struct Candidate {
    score: f64,
    matched_weight: f64,
    hit: SearchHit,
}

/// Point-in-time projection of the record store for fuzzy matching.
///
/// Never mutated after construction; a rebuild produces a new one.
pub struct FuzzyIndex {
    records: Vec<IndexedRecord>,
    token_count: usize,
    built_at: DateTime<Utc>,
}

impl FuzzyIndex {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            token_count: 0,
            built_at: Utc::now(),
        }
    }

    /// Tokenise every searchable field of every record.
    pub fn build(records: Vec<DocumentRecord>) -> Self {
        let records: Vec<IndexedRecord> = records.into_iter().map(IndexedRecord::new).collect();
        let token_count = records
            .iter()
            .flat_map(|r| r.fields.iter())
            .map(|f| f.tokens.len())
            .sum();
        Self {
            records,
            token_count,
            built_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct tokens summed over all indexed fields.
    pub fn token_count(&self) -> usize {
        self.token_count
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.records.iter().any(|r| r.record.id == *id)
    }

    /// Rank records whose fields match within `threshold`.
    ///
    /// A record's score is the weight-averaged distance of its matching
    /// fields. Ties go to the larger matched weight, then the newer record.
    pub fn search(
        &self,
        query: &CompiledQuery,
        filters: &SearchFilters,
        threshold: f64,
    ) -> Vec<SearchHit> {
        let mut candidates: Vec<Candidate> = self
            .records
            .iter()
            .filter(|r| filters.matches(&r.record))
            .filter_map(|r| score_record(r, query, threshold))
            .collect();

        candidates.sort_by(|a, b| {
            a.score
                .total_cmp(&b.score)
                .then_with(|| b.matched_weight.total_cmp(&a.matched_weight))
                .then_with(|| b.hit.record.created_at.cmp(&a.hit.record.created_at))
        });

        candidates.into_iter().map(|c| c.hit).collect()
    }
}

fn score_record(
    indexed: &IndexedRecord,
    query: &CompiledQuery,
    threshold: f64,
) -> Option<Candidate> {
    let mut weighted = 0.0;
    let mut matched_weight = 0.0;
    let mut highlights = Vec::new();

    for field in &indexed.fields {
        let distance = query.field_distance(&field.tokens);
        if distance > threshold {
            continue;
        }
        let weight = field.field.weight();
        weighted += weight * distance;
        matched_weight += weight;
        if let Some(value) = field.field.value_of(&indexed.record) {
            highlights.push(Highlight::from_value(field.field, value));
        }
    }

    if matched_weight == 0.0 {
        return None;
    }

    let score = weighted / matched_weight;
    Some(Candidate {
        score,
        matched_weight,
        hit: SearchHit {
            record: indexed.record.clone(),
            score,
            highlights,
        },
    })
}

impl Default for FuzzyIndex {
    fn default() -> Self {
        Self::empty()
    }
}

/// Shared slot holding the current index snapshot.
///
/// Readers clone the `Arc` and search without holding the lock, so a swap
/// never waits on in-flight queries and queries never see a partial index.
pub struct IndexHandle {
    current: RwLock<Arc<FuzzyIndex>>,
    generation: AtomicU64,
}

impl IndexHandle {
    pub fn new() -> Self {
        Self::with_index(FuzzyIndex::empty())
    }

    pub fn with_index(index: FuzzyIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            generation: AtomicU64::new(0),
        }
    }

    /// The current snapshot.
    pub fn load(&self) -> Arc<FuzzyIndex> {
        Arc::clone(&self.current.read())
    }

    /// Replace the snapshot and return the new generation number.
    pub fn swap(&self, index: FuzzyIndex) -> u64 {
        let mut slot = self.current.write();
        *slot = Arc::new(index);
        self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }

    /// Number of swaps so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(AtomicOrdering::SeqCst)
    }
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuzzy::FuzzyMatcher;
    use chrono::Duration;
    use docket_core::defaults::FUZZY_THRESHOLD;

    fn record(name: &str, text: &str) -> DocumentRecord {
        DocumentRecord::new(name, "text/plain", text.len() as u64, format!("/uploads/{}", name))
            .with_extracted_text(text)
    }

    fn search(index: &FuzzyIndex, term: &str) -> Vec<SearchHit> {
        let query = FuzzyMatcher::default().compile(term).unwrap();
        index.search(&query, &SearchFilters::default(), FUZZY_THRESHOLD)
    }

    #[test]
    fn test_build_counts_records_and_tokens() {
        let index = FuzzyIndex::build(vec![record("a.txt", "alpha beta beta")]);
        assert_eq!(index.len(), 1);
        // "alpha", "beta" from text plus "a", "txt" from the name
        assert_eq!(index.token_count(), 4);
    }

    #[test]
    fn test_exact_and_typo_matches() {
        let invoice = record("scan.txt", "Invoice #1021");
        let index = FuzzyIndex::build(vec![invoice.clone(), record("b.txt", "meeting notes")]);

        let hits = search(&index, "invoice");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, invoice.id);
        assert_eq!(hits[0].score, 0.0);
        assert_eq!(hits[0].highlights[0].field, SearchField::ExtractedText);

        let hits = search(&index, "invioce");
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score <= FUZZY_THRESHOLD);
    }

    #[test]
    fn test_score_is_weighted_over_matched_fields() {
        // Exact in the name (0.20), one edit in the text (0.70)
        let rec = record("budget.txt", "budgat");
        let index = FuzzyIndex::build(vec![rec]);
        let hits = search(&index, "budget");
        let expected = (0.70 * (1.0 / 6.0)) / 0.90;
        assert!((hits[0].score - expected).abs() < 1e-9);
        assert_eq!(hits[0].highlights.len(), 2);
    }

    #[test]
    fn test_ties_prefer_more_weight_then_newer() {
        let mut older = record("x.txt", "report");
        older.created_at -= Duration::hours(1);
        let newer = record("y.txt", "report");
        let both = record("report.txt", "report");

        let index = FuzzyIndex::build(vec![older.clone(), newer.clone(), both.clone()]);
        let ids: Vec<Uuid> = search(&index, "report").iter().map(|h| h.record.id).collect();
        assert_eq!(ids, vec![both.id, newer.id, older.id]);
    }

    #[test]
    fn test_filters_apply_before_matching() {
        let pdf = DocumentRecord::new("invoice.pdf", "application/pdf", 1, "/a.pdf");
        let txt = record("invoice.txt", "invoice");
        let index = FuzzyIndex::build(vec![pdf, txt.clone()]);
        let query = FuzzyMatcher::default().compile("invoice").unwrap();

        let hits = index.search(
            &query,
            &SearchFilters::default().with_mime_type("text/plain"),
            FUZZY_THRESHOLD,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, txt.id);
    }

    #[test]
    fn test_handle_swap_replaces_snapshot() {
        let handle = IndexHandle::new();
        let before = handle.load();
        assert!(before.is_empty());
        assert_eq!(handle.generation(), 0);

        let rec = record("a.txt", "alpha");
        assert_eq!(handle.swap(FuzzyIndex::build(vec![rec.clone()])), 1);
        assert!(handle.load().contains(&rec.id));
        // Earlier readers keep their snapshot
        assert!(before.is_empty());
    }
}
