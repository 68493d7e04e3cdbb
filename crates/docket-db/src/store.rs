//! Record store: the system of record for document records.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use docket_cache::{CacheManager, CacheNamespace};
use docket_core::{defaults, DocumentRecord, Error, Metadata, RecordSource, Result};
use docket_search::RebuildCoordinator;

use crate::snapshot::{load_or_empty, SnapshotFile, SnapshotWriter};
use crate::table::RecordTable;

/// Configuration for the record store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file location.
    pub snapshot_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(defaults::SNAPSHOT_PATH),
        }
    }
}

impl StoreConfig {
    pub fn new(snapshot_path: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_path: snapshot_path.into(),
        }
    }
}

/// Read-only store statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_records: usize,
    pub rebuild_in_progress: bool,
    pub index_dirty: bool,
}

/// In-memory record collection with snapshot persistence.
///
/// Every mutation invalidates the record's cache entries (and all cached
/// search results), schedules an index rebuild and schedules a snapshot
/// rewrite. None of those side effects block the caller.
pub struct RecordStore {
    table: Arc<RecordTable>,
    cache: Arc<CacheManager>,
    rebuild: Arc<RebuildCoordinator>,
    writer: SnapshotWriter,
}

impl RecordStore {
    /// Load the snapshot into `table` and start the background writer.
    ///
    /// A missing or unreadable snapshot starts an empty store. If records
    /// were loaded an initial index rebuild is requested.
    pub async fn open(
        config: StoreConfig,
        table: Arc<RecordTable>,
        cache: Arc<CacheManager>,
        rebuild: Arc<RebuildCoordinator>,
    ) -> Self {
        let file = Arc::new(SnapshotFile::new(config.snapshot_path));
        let records = load_or_empty(&file).await;
        let loaded = records.len();
        table.load(records);

        let source: Arc<dyn RecordSource> = table.clone();
        let writer = SnapshotWriter::spawn(file, source);

        if loaded > 0 {
            rebuild.request_rebuild();
        }
        info!(records = loaded, "Record store opened");

        Self {
            table,
            cache,
            rebuild,
            writer,
        }
    }

    /// Propagate a mutation of `id` to caches, the index and the snapshot.
    fn after_mutation(&self, id: &Uuid) {
        self.cache.invalidate_record(id);
        self.rebuild.request_rebuild();
        self.writer.schedule();
    }

    fn cache_record(&self, record: &DocumentRecord) {
        self.cache.set(
            CacheNamespace::RecordContent,
            record.id.to_string(),
            record,
            None,
        );
    }

    /// Insert or overwrite by id.
    ///
    /// Overwriting keeps the stored `created_at` and stamps
    /// `last_modified_at`; a fresh insert is stored as given.
    #[instrument(
        skip(self, record),
        fields(subsystem = "store", op = "save", record_id = %record.id)
    )]
    pub fn save(&self, mut record: DocumentRecord) -> DocumentRecord {
        if let Some(existing) = self.table.get(&record.id) {
            record.created_at = existing.created_at;
            record.touch();
        }
        self.table.upsert(record.clone());
        self.after_mutation(&record.id);
        self.cache_record(&record);
        debug!("Record saved");
        record
    }

    /// Overwrite an existing record.
    pub fn update(&self, record: DocumentRecord) -> Result<DocumentRecord> {
        if !self.table.contains(&record.id) {
            return Err(Error::RecordNotFound(record.id));
        }
        Ok(self.save(record))
    }

    /// Mutate a stored record in place and propagate the change.
    pub fn modify<F>(&self, id: &Uuid, f: F) -> Result<DocumentRecord>
    where
        F: FnOnce(&mut DocumentRecord),
    {
        let record = self
            .table
            .modify(id, |r| {
                f(r);
                r.touch();
            })
            .ok_or(Error::RecordNotFound(*id))?;
        self.after_mutation(id);
        self.cache_record(&record);
        Ok(record)
    }

    /// Cache-first point lookup; a miss back-fills the cache.
    pub fn find_by_id(&self, id: &Uuid) -> Option<DocumentRecord> {
        let key = id.to_string();
        let epoch = self.cache.epoch(CacheNamespace::RecordContent);
        if let Some(hit) = self
            .cache
            .get::<DocumentRecord>(CacheNamespace::RecordContent, &key)
        {
            return Some(hit);
        }
        let record = self.table.get(id)?;
        self.cache
            .set_if_epoch(CacheNamespace::RecordContent, key, &record, None, epoch);
        Some(record)
    }

    /// Linear scan for the newest record whose `field` equals `value`.
    pub fn find_by_field(&self, field: &str, value: &str) -> Option<DocumentRecord> {
        self.table.find_by_field(field, value)
    }

    /// Records sorted by `created_at` descending, sliced to the window.
    pub fn find_all(&self, limit: usize, offset: usize) -> Vec<DocumentRecord> {
        self.table
            .sorted_newest_first()
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect()
    }

    /// Remove a record. Returns whether it existed.
    #[instrument(skip(self), fields(subsystem = "store", op = "delete"))]
    pub fn delete(&self, id: &Uuid) -> bool {
        let existed = self.table.remove(id).is_some();
        if existed {
            self.after_mutation(id);
            debug!("Record deleted");
        }
        existed
    }

    pub fn count(&self) -> usize {
        self.table.len()
    }

    pub fn exists(&self, id: &Uuid) -> bool {
        self.table.contains(id)
    }

    /// Cache-first metadata read through `recordMetadata`.
    pub fn metadata(&self, id: &Uuid) -> Option<Metadata> {
        let key = id.to_string();
        let epoch = self.cache.epoch(CacheNamespace::RecordMetadata);
        if let Some(hit) = self
            .cache
            .get::<Metadata>(CacheNamespace::RecordMetadata, &key)
        {
            return Some(hit);
        }
        let metadata = self.table.get(id)?.metadata;
        self.cache
            .set_if_epoch(CacheNamespace::RecordMetadata, key, &metadata, None, epoch);
        Some(metadata)
    }

    /// Cache-first extracted text read through `extractedTextPayloads`.
    pub fn extracted_text(&self, id: &Uuid) -> Option<String> {
        let key = id.to_string();
        let epoch = self.cache.epoch(CacheNamespace::ExtractedTextPayloads);
        if let Some(hit) = self
            .cache
            .get::<String>(CacheNamespace::ExtractedTextPayloads, &key)
        {
            return Some(hit);
        }
        let text = self.table.get(id)?.extracted_text;
        self.cache
            .set_if_epoch(CacheNamespace::ExtractedTextPayloads, key, &text, None, epoch);
        Some(text)
    }

    pub fn get_stats(&self) -> StoreStats {
        StoreStats {
            total_records: self.table.len(),
            rebuild_in_progress: self.rebuild.is_rebuilding(),
            index_dirty: self.rebuild.is_dirty(),
        }
    }

    pub fn table(&self) -> &Arc<RecordTable> {
        &self.table
    }

    /// Write the snapshot now, returning any I/O error.
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    /// Stop background persistence after a final flush.
    pub async fn close(&self) -> Result<()> {
        self.writer.close().await
    }
}
