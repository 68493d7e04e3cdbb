//! Aggregated, read-only health snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use docket_cache::CacheStats;
use docket_db::StoreStats;
use docket_jobs::QueueStats;
use docket_search::RebuildState;

use crate::container::ServiceContainer;

/// Current fuzzy index snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHealth {
    pub generation: u64,
    pub records: usize,
    pub tokens: usize,
    pub built_at: DateTime<Utc>,
    pub rebuild_state: RebuildState,
    pub completed_rebuilds: u64,
    pub failed_rebuilds: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// "ok", or "degraded" when a queue has stopped accepting work.
    pub status: String,
    pub store: StoreStats,
    pub index: IndexHealth,
    pub caches: BTreeMap<String, CacheStats>,
    pub queues: Vec<QueueStats>,
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    /// Collect stats from every component. Side-effect free.
    pub fn collect(container: &ServiceContainer) -> Self {
        let snapshot = container.index().load();
        let rebuild = container.rebuild();

        let queues = vec![
            container.extraction_queue().stats(),
            rebuild.queue().stats(),
        ];
        let status = if queues.iter().all(|q| q.accepting) {
            "ok"
        } else {
            "degraded"
        };

        Self {
            status: status.to_string(),
            store: container.store().get_stats(),
            index: IndexHealth {
                generation: container.index().generation(),
                records: snapshot.len(),
                tokens: snapshot.token_count(),
                built_at: snapshot.built_at(),
                rebuild_state: rebuild.state(),
                completed_rebuilds: rebuild.completed_rebuilds(),
                failed_rebuilds: rebuild.failed_rebuilds(),
            },
            caches: container.cache().all_stats(),
            queues,
            generated_at: Utc::now(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
