//! Namespaced TTL cache with hit/miss statistics.
//!
//! Values are stored as JSON so each namespace can hold a different type
//! while call sites stay typed through `get::<T>` / `set::<T>`.
//!
//! Expiry is measured with tokio's clock, so tests can pause and advance
//! time deterministically.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use docket_core::{defaults, normalize_term, Pagination, Result, SearchFilters};

use crate::namespace::{CacheConfig, CacheNamespace, NamespacePolicy};

/// Point-in-time statistics for one namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    /// `hits / (hits + misses)`, 0 when nothing was read yet.
    pub hit_rate: f64,
    /// Live (unexpired) entries.
    pub entry_count: usize,
}

struct Entry {
    value: JsonValue,
    expires_at: Instant,
}

struct NamespaceStore {
    policy: NamespacePolicy,
    entries: HashMap<String, Entry>,
    hits: u64,
    misses: u64,
    sets: u64,
    evictions: u64,
    /// Bumped by every delete and flush.
    epoch: u64,
}

impl NamespaceStore {
    fn new(policy: NamespacePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            hits: 0,
            misses: 0,
            sets: 0,
            evictions: 0,
            epoch: 0,
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        self.evictions += (before - self.entries.len()) as u64;
    }

    /// Make room for one new key.
    fn make_room(&mut self, now: Instant) {
        self.purge_expired(now);
        while self.entries.len() >= self.policy.max_entries {
            let soonest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.expires_at)
                .map(|(k, _)| k.clone());
            match soonest {
                Some(key) => {
                    self.entries.remove(&key);
                    self.evictions += 1;
                }
                None => break,
            }
        }
    }

    fn stats(&self, now: Instant) -> CacheStats {
        let reads = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            sets: self.sets,
            evictions: self.evictions,
            hit_rate: if reads == 0 {
                0.0
            } else {
                self.hits as f64 / reads as f64
            },
            entry_count: self
                .entries
                .values()
                .filter(|e| e.expires_at > now)
                .count(),
        }
    }
}

/// Owner of every cache namespace.
///
/// Construct one per process and share it by `Arc`.
pub struct CacheManager {
    stores: HashMap<CacheNamespace, Mutex<NamespaceStore>>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        let stores = CacheNamespace::ALL
            .iter()
            .map(|ns| (*ns, Mutex::new(NamespaceStore::new(config.policy(*ns)))))
            .collect();
        Self { stores }
    }

    fn store(&self, namespace: CacheNamespace) -> &Mutex<NamespaceStore> {
        // Every namespace is inserted in `new`.
        &self.stores[&namespace]
    }

    /// Look up a value. Expired or undecodable entries count as misses.
    pub fn get<T: DeserializeOwned>(&self, namespace: CacheNamespace, key: &str) -> Option<T> {
        let now = Instant::now();
        let mut store = self.store(namespace).lock();

        let expired = store
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at <= now);
        if expired {
            store.entries.remove(key);
            store.evictions += 1;
        }
        let live = store.entries.get(key).map(|entry| entry.value.clone());

        let decoded = live.and_then(|value| match serde_json::from_value::<T>(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(namespace = %namespace, key, error = %e, "Cache entry failed to decode");
                None
            }
        });

        if decoded.is_some() {
            store.hits += 1;
            trace!(namespace = %namespace, key, "Cache HIT");
        } else {
            store.misses += 1;
            trace!(namespace = %namespace, key, "Cache MISS");
        }
        decoded
    }

    /// Store a value. `ttl` is capped at the namespace TTL.
    ///
    /// Returns false when the value cannot be serialized or the namespace
    /// is disabled.
    pub fn set<T: Serialize>(
        &self,
        namespace: CacheNamespace,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        self.insert(namespace, key.into(), value, ttl, None)
    }

    /// Current invalidation epoch of a namespace.
    ///
    /// Read it before computing a value from the source of truth and pass it
    /// to [`set_if_epoch`](Self::set_if_epoch).
    pub fn epoch(&self, namespace: CacheNamespace) -> u64 {
        self.store(namespace).lock().epoch
    }

    /// Store a value only if no delete or flush hit the namespace since
    /// `epoch` was read.
    ///
    /// Keeps a fill computed from pre-invalidation state from landing after
    /// the invalidation. Returns false when the value was not stored.
    pub fn set_if_epoch<T: Serialize>(
        &self,
        namespace: CacheNamespace,
        key: impl Into<String>,
        value: &T,
        ttl: Option<Duration>,
        epoch: u64,
    ) -> bool {
        self.insert(namespace, key.into(), value, ttl, Some(epoch))
    }

    fn insert<T: Serialize>(
        &self,
        namespace: CacheNamespace,
        key: String,
        value: &T,
        ttl: Option<Duration>,
        epoch: Option<u64>,
    ) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(namespace = %namespace, error = %e, "Cache serialization error");
                return false;
            }
        };

        let now = Instant::now();
        let mut store = self.store(namespace).lock();
        if store.policy.max_entries == 0 {
            return false;
        }
        if epoch.is_some_and(|e| e != store.epoch) {
            debug!(namespace = %namespace, key = %key, "Cache fill skipped, invalidated meanwhile");
            return false;
        }

        let ttl = ttl.map_or(store.policy.ttl, |t| t.min(store.policy.ttl));
        if !store.entries.contains_key(&key) {
            store.make_room(now);
        }
        store.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        store.sets += 1;
        true
    }

    /// Remove one entry. Returns whether it existed.
    pub fn delete(&self, namespace: CacheNamespace, key: &str) -> bool {
        let mut store = self.store(namespace).lock();
        store.epoch += 1;
        store.entries.remove(key).is_some()
    }

    /// Remove every entry of a namespace. Returns how many were removed.
    pub fn flush(&self, namespace: CacheNamespace) -> usize {
        let mut store = self.store(namespace).lock();
        let removed = store.entries.len();
        store.entries.clear();
        store.epoch += 1;
        debug!(namespace = %namespace, removed, "Cache FLUSH");
        removed
    }

    /// Remove every entry of every namespace.
    pub fn flush_all(&self) {
        for ns in CacheNamespace::ALL {
            self.flush(ns);
        }
    }

    /// Statistics snapshot of one namespace. Side-effect free.
    pub fn stats(&self, namespace: CacheNamespace) -> CacheStats {
        self.store(namespace).lock().stats(Instant::now())
    }

    /// Statistics of every namespace, keyed by namespace name.
    pub fn all_stats(&self) -> BTreeMap<String, CacheStats> {
        CacheNamespace::ALL
            .iter()
            .map(|ns| (ns.as_str().to_string(), self.stats(*ns)))
            .collect()
    }

    /// Apply the invalidation rule for a mutated record.
    ///
    /// Drops the record's point entries and flushes all search results,
    /// since one changed document can reorder any query.
    pub fn invalidate_record(&self, id: &Uuid) {
        let key = id.to_string();
        self.delete(CacheNamespace::RecordContent, &key);
        self.delete(CacheNamespace::RecordMetadata, &key);
        self.delete(CacheNamespace::ExtractedTextPayloads, &key);
        self.flush(CacheNamespace::SearchResults);
    }

    /// Return the cached value, or compute, store and return it.
    ///
    /// `compute` only runs on a miss. Errors are returned and not cached.
    pub async fn get_or_insert_with<T, F, Fut>(
        &self,
        namespace: CacheNamespace,
        key: &str,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let epoch = self.epoch(namespace);
        if let Some(hit) = self.get::<T>(namespace, key) {
            return Ok(hit);
        }
        let value = compute().await?;
        self.set_if_epoch(namespace, key, &value, None, epoch);
        Ok(value)
    }

    /// Deterministic `searchResults` key for a query.
    ///
    /// The term is normalised, so queries differing only in case or
    /// whitespace share an entry.
    pub fn search_key(term: &str, filters: &SearchFilters, pagination: &Pagination) -> String {
        let mut hasher = Sha256::new();

        hasher.update(normalize_term(term).as_bytes());
        hasher.update(b"\0");
        hasher.update(pagination.page.to_le_bytes());
        hasher.update(pagination.limit.to_le_bytes());

        // BTreeSet iterates sorted, so filter order never changes the key
        for mime in &filters.mime_types {
            hasher.update(b"\0m:");
            hasher.update(mime.as_bytes());
        }
        if let Some(after) = filters.created_after {
            hasher.update(b"\0a:");
            hasher.update(after.to_rfc3339().as_bytes());
        }
        if let Some(before) = filters.created_before {
            hasher.update(b"\0b:");
            hasher.update(before.to_rfc3339().as_bytes());
        }

        let hash = hex::encode(hasher.finalize());
        format!("{}{}", defaults::SEARCH_CACHE_KEY_PREFIX, &hash[..32])
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_within_ttl_hits() {
        let cache = CacheManager::default();
        assert!(cache.set(CacheNamespace::RecordMetadata, "k", &42u32, None));
        assert_eq!(cache.get::<u32>(CacheNamespace::RecordMetadata, "k"), Some(42));

        let stats = cache.stats(CacheNamespace::RecordMetadata);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.hit_rate, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let config = CacheConfig::default()
            .with_ttl(CacheNamespace::SearchResults, Duration::from_secs(10));
        let cache = CacheManager::new(config);
        cache.set(CacheNamespace::SearchResults, "q", &"page", None);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get::<String>(CacheNamespace::SearchResults, "q").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get::<String>(CacheNamespace::SearchResults, "q").is_none());
        assert_eq!(cache.stats(CacheNamespace::SearchResults).entry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_ttl_cannot_outlive_namespace_ttl() {
        let config = CacheConfig::default()
            .with_ttl(CacheNamespace::RecordContent, Duration::from_secs(5));
        let cache = CacheManager::new(config);
        cache.set(
            CacheNamespace::RecordContent,
            "k",
            &1u8,
            Some(Duration::from_secs(3600)),
        );

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get::<u8>(CacheNamespace::RecordContent, "k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_entries_evicts_soonest_expiring() {
        let config = CacheConfig::default().with_policy(
            CacheNamespace::RecordMetadata,
            NamespacePolicy::new(Duration::from_secs(100), 2),
        );
        let cache = CacheManager::new(config);
        cache.set(
            CacheNamespace::RecordMetadata,
            "short",
            &1,
            Some(Duration::from_secs(10)),
        );
        cache.set(CacheNamespace::RecordMetadata, "long", &2, None);
        cache.set(CacheNamespace::RecordMetadata, "new", &3, None);

        assert!(cache.get::<i32>(CacheNamespace::RecordMetadata, "short").is_none());
        assert_eq!(cache.get::<i32>(CacheNamespace::RecordMetadata, "long"), Some(2));
        assert_eq!(cache.get::<i32>(CacheNamespace::RecordMetadata, "new"), Some(3));
        assert_eq!(cache.stats(CacheNamespace::RecordMetadata).evictions, 1);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let cache = CacheManager::default();
        cache.set(CacheNamespace::RecordContent, "id", &"record", None);
        assert!(cache.get::<String>(CacheNamespace::RecordMetadata, "id").is_none());

        cache.flush(CacheNamespace::RecordMetadata);
        assert!(cache.get::<String>(CacheNamespace::RecordContent, "id").is_some());
    }

    #[test]
    fn test_undecodable_entry_is_a_miss() {
        let cache = CacheManager::default();
        cache.set(CacheNamespace::RecordContent, "k", &"text", None);
        assert!(cache.get::<u64>(CacheNamespace::RecordContent, "k").is_none());
        assert_eq!(cache.stats(CacheNamespace::RecordContent).misses, 1);
    }

    #[test]
    fn test_invalidate_record_flushes_all_search_results() {
        let cache = CacheManager::default();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        for ns in [
            CacheNamespace::RecordContent,
            CacheNamespace::RecordMetadata,
            CacheNamespace::ExtractedTextPayloads,
        ] {
            cache.set(ns, id.to_string(), &"mine", None);
            cache.set(ns, other.to_string(), &"other", None);
        }
        cache.set(CacheNamespace::SearchResults, "q1", &"r1", None);
        cache.set(CacheNamespace::SearchResults, "q2", &"r2", None);

        cache.invalidate_record(&id);

        for ns in [
            CacheNamespace::RecordContent,
            CacheNamespace::RecordMetadata,
            CacheNamespace::ExtractedTextPayloads,
        ] {
            assert!(cache.get::<String>(ns, &id.to_string()).is_none());
            assert!(cache.get::<String>(ns, &other.to_string()).is_some());
        }
        assert_eq!(cache.stats(CacheNamespace::SearchResults).entry_count, 0);
    }

    #[test]
    fn test_set_if_epoch_skips_fill_after_flush() {
        let cache = CacheManager::default();
        let epoch = cache.epoch(CacheNamespace::SearchResults);

        // An index swap flushes while a query is still being ranked
        cache.flush(CacheNamespace::SearchResults);

        assert!(!cache.set_if_epoch(CacheNamespace::SearchResults, "q", &"stale", None, epoch));
        assert!(cache.get::<String>(CacheNamespace::SearchResults, "q").is_none());

        let fresh = cache.epoch(CacheNamespace::SearchResults);
        assert!(cache.set_if_epoch(CacheNamespace::SearchResults, "q", &"fresh", None, fresh));
        assert_eq!(
            cache.get::<String>(CacheNamespace::SearchResults, "q").as_deref(),
            Some("fresh")
        );
    }

    #[test]
    fn test_delete_of_absent_key_still_blocks_stale_backfill() {
        let cache = CacheManager::default();
        let id = Uuid::new_v4();
        let epoch = cache.epoch(CacheNamespace::RecordContent);

        // The record is mutated before the reader's back-fill lands
        cache.invalidate_record(&id);

        assert!(!cache.set_if_epoch(
            CacheNamespace::RecordContent,
            id.to_string(),
            &"old version",
            None,
            epoch
        ));
        assert_eq!(cache.stats(CacheNamespace::RecordContent).entry_count, 0);
    }

    #[test]
    fn test_flush_all_empties_every_namespace() {
        let cache = CacheManager::default();
        for ns in CacheNamespace::ALL {
            cache.set(ns, "k", &1, None);
        }
        cache.flush_all();
        for ns in CacheNamespace::ALL {
            assert_eq!(cache.stats(ns).entry_count, 0);
        }
    }

    #[tokio::test]
    async fn test_get_or_insert_with_computes_once() {
        let cache = CacheManager::default();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: String = cache
                .get_or_insert_with(CacheNamespace::ExtractedTextPayloads, "doc", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("expensive".to_string())
                })
                .await
                .unwrap();
            assert_eq!(value, "expensive");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_insert_with_does_not_cache_errors() {
        let cache = CacheManager::default();
        let result: Result<String> = cache
            .get_or_insert_with(CacheNamespace::ExtractedTextPayloads, "doc", || async {
                Err(docket_core::Error::Extraction("boom".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(
            cache.stats(CacheNamespace::ExtractedTextPayloads).entry_count,
            0
        );
    }

    #[test]
    fn test_search_key_generation() {
        let filters = SearchFilters::default();
        let page = Pagination::new(1, 10);

        let key1 = CacheManager::search_key("hello world", &filters, &page);
        let key2 = CacheManager::search_key("hello world", &filters, &page);
        assert_eq!(key1, key2);
        assert!(key1.starts_with(defaults::SEARCH_CACHE_KEY_PREFIX));

        // Case and whitespace insensitive
        let key3 = CacheManager::search_key("  HELLO   world ", &filters, &page);
        assert_eq!(key1, key3);

        // Pagination affects key
        let key4 = CacheManager::search_key("hello world", &filters, &Pagination::new(2, 10));
        assert_ne!(key1, key4);

        // Filters affect key
        let pdf_only = SearchFilters::default().with_mime_type("application/pdf");
        let key5 = CacheManager::search_key("hello world", &pdf_only, &page);
        assert_ne!(key1, key5);
    }
}
