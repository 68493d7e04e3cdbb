//! Service configuration assembled from defaults and the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use docket_cache::{CacheConfig, CacheNamespace};
use docket_core::{defaults, Error, Result};
use docket_db::StoreConfig;
use docket_jobs::QueueConfig;
use docket_search::{index_queue_config, SearchConfig};

/// Top-level configuration for a docket service instance.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub snapshot_path: PathBuf,
    pub extraction_concurrency: usize,
    pub job_max_retries: u32,
    pub job_timeout: Duration,
    pub job_retry_delay: Duration,
    pub fuzzy_threshold: f64,
    pub shutdown_timeout: Duration,
    pub search_cache_ttl: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(defaults::SNAPSHOT_PATH),
            extraction_concurrency: defaults::EXTRACTION_CONCURRENCY,
            job_max_retries: defaults::JOB_MAX_RETRIES,
            job_timeout: Duration::from_secs(defaults::JOB_TIMEOUT_SECS),
            job_retry_delay: Duration::from_millis(defaults::JOB_RETRY_BASE_DELAY_MS),
            fuzzy_threshold: defaults::FUZZY_THRESHOLD,
            shutdown_timeout: Duration::from_secs(defaults::SHUTDOWN_TIMEOUT_SECS),
            search_cache_ttl: Duration::from_secs(defaults::CACHE_SEARCH_RESULTS_TTL_SECS),
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DOCKET_SNAPSHOT_PATH` | `./data/records.json` | Snapshot file |
    /// | `DOCKET_EXTRACTION_CONCURRENCY` | `2` | Concurrent extraction jobs |
    /// | `DOCKET_JOB_MAX_RETRIES` | `3` | Retries per extraction job |
    /// | `DOCKET_JOB_TIMEOUT_SECS` | `60` | Per-attempt timeout |
    /// | `DOCKET_JOB_RETRY_DELAY_MS` | `1000` | Backoff unit |
    /// | `DOCKET_FUZZY_THRESHOLD` | `0.3` | Fuzzy match threshold |
    /// | `DOCKET_SHUTDOWN_TIMEOUT_SECS` | `10` | Queue drain grace period |
    /// | `DOCKET_SEARCH_CACHE_TTL_SECS` | `300` | Search result cache TTL |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Missing values fall back to
    /// defaults; unparsable or out-of-range values fall back with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse::<T>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, value = %raw, "Invalid config value, using default");
                    None
                }
            }
        }

        let base = Self::default();
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

        Self {
            snapshot_path: lookup("DOCKET_SNAPSHOT_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(base.snapshot_path),
            extraction_concurrency: parsed::<usize>(lookup, "DOCKET_EXTRACTION_CONCURRENCY")
                .unwrap_or(base.extraction_concurrency)
                .max(1),
            job_max_retries: parsed(lookup, "DOCKET_JOB_MAX_RETRIES")
                .unwrap_or(base.job_max_retries),
            job_timeout: parsed(lookup, "DOCKET_JOB_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.job_timeout),
            job_retry_delay: parsed(lookup, "DOCKET_JOB_RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(base.job_retry_delay),
            fuzzy_threshold: parsed::<f64>(lookup, "DOCKET_FUZZY_THRESHOLD")
                .filter(|t| {
                    let in_range = (0.0..=1.0).contains(t);
                    if !in_range {
                        warn!(
                            key = "DOCKET_FUZZY_THRESHOLD",
                            value = *t,
                            "Config value out of range, using default"
                        );
                    }
                    in_range
                })
                .unwrap_or(base.fuzzy_threshold),
            shutdown_timeout: parsed(lookup, "DOCKET_SHUTDOWN_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.shutdown_timeout),
            search_cache_ttl: parsed(lookup, "DOCKET_SEARCH_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(base.search_cache_ttl),
        }
    }

    pub fn with_snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn with_extraction_concurrency(mut self, concurrency: usize) -> Self {
        self.extraction_concurrency = concurrency;
        self
    }

    pub fn with_job_max_retries(mut self, retries: u32) -> Self {
        self.job_max_retries = retries;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn with_job_retry_delay(mut self, delay: Duration) -> Self {
        self.job_retry_delay = delay;
        self
    }

    pub fn with_fuzzy_threshold(mut self, threshold: f64) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Reject settings that cannot produce a working service.
    pub fn validate(&self) -> Result<()> {
        if self.extraction_concurrency == 0 {
            return Err(Error::Config(
                "extraction concurrency must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold) {
            return Err(Error::Config(format!(
                "fuzzy threshold must be within 0.0..=1.0, got {}",
                self.fuzzy_threshold
            )));
        }
        if self.job_timeout.is_zero() {
            return Err(Error::Config("job timeout must be non-zero".into()));
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::default().with_ttl(CacheNamespace::SearchResults, self.search_cache_ttl)
    }

    pub fn extraction_queue_config(&self) -> QueueConfig {
        QueueConfig::new("extraction")
            .with_concurrency(self.extraction_concurrency)
            .with_max_retries(self.job_max_retries)
            .with_timeout(self.job_timeout)
            .with_retry_delay(self.job_retry_delay)
    }

    pub fn index_queue_config(&self) -> QueueConfig {
        index_queue_config().with_retry_delay(self.job_retry_delay)
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig::default().with_threshold(self.fuzzy_threshold)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.snapshot_path.clone())
    }
}
