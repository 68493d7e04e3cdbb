//! Fixed cache namespaces and their retention policies.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use docket_core::defaults;

/// An isolated keyspace with its own TTL and size bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheNamespace {
    /// Whole document records, keyed by id. Point-lookup acceleration.
    RecordContent,
    /// Search result pages, keyed by a derived query key. Flushed on every write.
    SearchResults,
    /// Record metadata maps, keyed by id.
    RecordMetadata,
    /// Extracted text payloads, keyed by id.
    ExtractedTextPayloads,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 4] = [
        CacheNamespace::RecordContent,
        CacheNamespace::SearchResults,
        CacheNamespace::RecordMetadata,
        CacheNamespace::ExtractedTextPayloads,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheNamespace::RecordContent => "recordContent",
            CacheNamespace::SearchResults => "searchResults",
            CacheNamespace::RecordMetadata => "recordMetadata",
            CacheNamespace::ExtractedTextPayloads => "extractedTextPayloads",
        }
    }

    /// Policy used when no override is configured.
    pub fn default_policy(&self) -> NamespacePolicy {
        match self {
            CacheNamespace::RecordContent => NamespacePolicy::new(
                Duration::from_secs(defaults::CACHE_RECORD_CONTENT_TTL_SECS),
                defaults::CACHE_RECORD_CONTENT_MAX_ENTRIES,
            ),
            CacheNamespace::SearchResults => NamespacePolicy::new(
                Duration::from_secs(defaults::CACHE_SEARCH_RESULTS_TTL_SECS),
                defaults::CACHE_SEARCH_RESULTS_MAX_ENTRIES,
            ),
            CacheNamespace::RecordMetadata => NamespacePolicy::new(
                Duration::from_secs(defaults::CACHE_RECORD_METADATA_TTL_SECS),
                defaults::CACHE_RECORD_METADATA_MAX_ENTRIES,
            ),
            CacheNamespace::ExtractedTextPayloads => NamespacePolicy::new(
                Duration::from_secs(defaults::CACHE_EXTRACTED_TEXT_TTL_SECS),
                defaults::CACHE_EXTRACTED_TEXT_MAX_ENTRIES,
            ),
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retention policy of one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespacePolicy {
    /// Upper bound on how long any entry may live.
    pub ttl: Duration,
    /// Upper bound on live entries. Zero disables the namespace.
    pub max_entries: usize,
}

impl NamespacePolicy {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self { ttl, max_entries }
    }
}

/// Configuration for the cache manager.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    policies: HashMap<CacheNamespace, NamespacePolicy>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policies: CacheNamespace::ALL
                .iter()
                .map(|ns| (*ns, ns.default_policy()))
                .collect(),
        }
    }
}

impl CacheConfig {
    /// Override the policy of one namespace.
    pub fn with_policy(mut self, namespace: CacheNamespace, policy: NamespacePolicy) -> Self {
        self.policies.insert(namespace, policy);
        self
    }

    /// Override only the TTL of one namespace.
    pub fn with_ttl(mut self, namespace: CacheNamespace, ttl: Duration) -> Self {
        let policy = self.policy(namespace);
        self.policies
            .insert(namespace, NamespacePolicy::new(ttl, policy.max_entries));
        self
    }

    /// Effective policy of a namespace.
    pub fn policy(&self, namespace: CacheNamespace) -> NamespacePolicy {
        self.policies
            .get(&namespace)
            .copied()
            .unwrap_or_else(|| namespace.default_policy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_names_are_stable() {
        let names: Vec<&str> = CacheNamespace::ALL.iter().map(|ns| ns.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "recordContent",
                "searchResults",
                "recordMetadata",
                "extractedTextPayloads"
            ]
        );
    }

    #[test]
    fn test_default_config_uses_namespace_defaults() {
        let config = CacheConfig::default();
        for ns in CacheNamespace::ALL {
            assert_eq!(config.policy(ns), ns.default_policy());
        }
    }

    #[test]
    fn test_with_ttl_keeps_bound() {
        let config =
            CacheConfig::default().with_ttl(CacheNamespace::SearchResults, Duration::from_secs(5));
        let policy = config.policy(CacheNamespace::SearchResults);
        assert_eq!(policy.ttl, Duration::from_secs(5));
        assert_eq!(
            policy.max_entries,
            defaults::CACHE_SEARCH_RESULTS_MAX_ENTRIES
        );
    }
}
