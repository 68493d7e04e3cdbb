//! Dependency-injection root: constructs every shared component once.

use std::sync::Arc;

use tracing::{info, warn};

use docket_cache::CacheManager;
use docket_core::{RecordSource, Result};
use docket_db::{RecordStore, RecordTable};
use docket_jobs::{ExtractionHandler, ExtractorRegistry, JobQueue};
use docket_search::{IndexHandle, IndexRebuildHandler, RebuildCoordinator, SearchEngine};

use crate::config::ServiceConfig;
use crate::documents::DocumentService;
use crate::health::HealthReport;

/// Owns the single instance of each component; consumers get `Arc`s.
pub struct ServiceContainer {
    config: ServiceConfig,
    cache: Arc<CacheManager>,
    registry: Arc<ExtractorRegistry>,
    extraction_queue: JobQueue<ExtractionHandler>,
    index: Arc<IndexHandle>,
    rebuild: Arc<RebuildCoordinator>,
    store: Arc<RecordStore>,
    engine: Arc<SearchEngine>,
}

impl ServiceContainer {
    /// Validate `config` and wire up every component.
    ///
    /// Must be called inside a Tokio runtime; queues and the snapshot writer
    /// start background tasks.
    pub async fn build(config: ServiceConfig) -> Result<Self> {
        config.validate()?;

        let cache = Arc::new(CacheManager::new(config.cache_config()));
        let table = Arc::new(RecordTable::new());
        let source: Arc<dyn RecordSource> = table.clone();
        let index = Arc::new(IndexHandle::new());

        let registry = Arc::new(ExtractorRegistry::with_builtin());
        let extraction_queue = JobQueue::new(
            ExtractionHandler::new(registry.clone()),
            config.extraction_queue_config(),
        );

        let rebuild = RebuildCoordinator::new(JobQueue::new(
            IndexRebuildHandler::new(source.clone(), index.clone(), cache.clone()),
            config.index_queue_config(),
        ));

        let store = Arc::new(
            RecordStore::open(
                config.store_config(),
                table,
                cache.clone(),
                rebuild.clone(),
            )
            .await,
        );

        let engine = Arc::new(SearchEngine::new(
            index.clone(),
            cache.clone(),
            source,
            config.search_config(),
        ));

        info!(
            snapshot = %config.snapshot_path.display(),
            records = store.count(),
            extractors = ?registry.names(),
            "Service container built"
        );

        Ok(Self {
            config,
            cache,
            registry,
            extraction_queue,
            index,
            rebuild,
            store,
            engine,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<ExtractorRegistry> {
        &self.registry
    }

    pub fn extraction_queue(&self) -> &JobQueue<ExtractionHandler> {
        &self.extraction_queue
    }

    pub fn index(&self) -> &Arc<IndexHandle> {
        &self.index
    }

    pub fn rebuild(&self) -> &Arc<RebuildCoordinator> {
        &self.rebuild
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<SearchEngine> {
        &self.engine
    }

    /// Document operations backed by this container's components.
    pub fn documents(&self) -> DocumentService {
        DocumentService::new(
            self.store.clone(),
            self.engine.clone(),
            self.extraction_queue.clone(),
            self.registry.clone(),
        )
    }

    pub fn health(&self) -> HealthReport {
        HealthReport::collect(self)
    }

    /// Drain both queues and close the store with a final snapshot flush.
    pub async fn shutdown(&self) -> Result<()> {
        let grace = self.config.shutdown_timeout;
        info!(grace_ms = grace.as_millis() as u64, "Shutting down service");

        self.extraction_queue.shutdown(grace).await;
        self.rebuild.queue().shutdown(grace).await;

        if let Err(e) = self.store.close().await {
            warn!(error = %e, "Record store did not close cleanly");
            return Err(e);
        }
        info!("Service stopped");
        Ok(())
    }
}
