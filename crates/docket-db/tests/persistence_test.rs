//! Persistence round-trips through the snapshot file.

use std::sync::Arc;

use docket_cache::CacheManager;
use docket_db::{DocumentRecord, RecordStore, RecordTable, StoreConfig};
use docket_jobs::JobQueue;
use docket_search::{index_queue_config, IndexHandle, IndexRebuildHandler, RebuildCoordinator};

struct Opened {
    store: RecordStore,
    index: Arc<IndexHandle>,
    rebuild: Arc<RebuildCoordinator>,
}

async fn open(path: &std::path::Path) -> Opened {
    let table = Arc::new(RecordTable::new());
    let cache = Arc::new(CacheManager::default());
    let index = Arc::new(IndexHandle::new());
    let handler = IndexRebuildHandler::new(table.clone(), index.clone(), cache.clone());
    let rebuild = RebuildCoordinator::new(JobQueue::new(handler, index_queue_config()));
    let store = RecordStore::open(StoreConfig::new(path), table, cache, rebuild.clone()).await;
    Opened {
        store,
        index,
        rebuild,
    }
}

#[tokio::test]
async fn test_saved_records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data/records.json");

    let first = open(&path).await;
    let mut saved: Vec<DocumentRecord> = (0..5)
        .map(|i| {
            first.store.save(
                DocumentRecord::new(format!("doc{}.txt", i), "text/plain", i, format!("/u/{}", i))
                    .with_extracted_text(format!("body {}", i))
                    .with_metadata("author", "kim"),
            )
        })
        .collect();
    first.store.close().await.unwrap();

    let second = open(&path).await;
    assert_eq!(second.store.count(), 5);
    let mut loaded = second.store.find_all(100, 0);

    saved.sort_by_key(|r| r.id);
    loaded.sort_by_key(|r| r.id);
    assert_eq!(loaded, saved);

    // Loading a non-empty snapshot schedules an initial rebuild
    second.rebuild.wait_idle().await;
    assert_eq!(second.index.load().len(), 5);
}

#[tokio::test]
async fn test_deleted_record_is_gone_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");

    let first = open(&path).await;
    let keep = first
        .store
        .save(DocumentRecord::new("keep.txt", "text/plain", 1, "/k"));
    let gone = first
        .store
        .save(DocumentRecord::new("gone.txt", "text/plain", 1, "/g"));
    assert!(first.store.delete(&gone.id));
    first.store.flush().await.unwrap();

    let second = open(&path).await;
    assert!(second.store.exists(&keep.id));
    assert!(!second.store.exists(&gone.id));
    assert_eq!(
        second.store.find_by_field("originalName", "keep.txt").map(|r| r.id),
        Some(keep.id)
    );
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");
    std::fs::write(&path, b"[{\"id\": 12").unwrap();

    let opened = open(&path).await;
    assert_eq!(opened.store.count(), 0);
    assert!(!opened.store.get_stats().rebuild_in_progress);
}
