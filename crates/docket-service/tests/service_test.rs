//! End-to-end tests through the service container.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use docket_cache::CacheNamespace;
use docket_service::{
    Error, MatchKind, SearchQuery, ServiceConfig, ServiceContainer, UploadedFile,
    META_EXTRACTION_ERROR_MESSAGE,
};

fn test_config(dir: &Path) -> ServiceConfig {
    ServiceConfig::default()
        .with_snapshot_path(dir.join("records.json"))
        .with_job_retry_delay(Duration::from_millis(5))
        .with_job_max_retries(1)
        .with_shutdown_timeout(Duration::from_secs(2))
}

fn write_file(dir: &Path, name: &str, contents: &str) -> UploadedFile {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    UploadedFile {
        original_name: name.to_string(),
        mime_type: "text/plain".to_string(),
        size_bytes: contents.len() as u64,
        storage_path: path.display().to_string(),
    }
}

#[tokio::test]
async fn test_ingest_extract_and_search() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    let docs = container.documents();

    let record = docs
        .ingest_and_wait(write_file(dir.path(), "scan.txt", "Invoice #1021\nTotal: 40 EUR"))
        .await
        .unwrap();
    assert_eq!(record.extracted_text, "Invoice #1021\nTotal: 40 EUR");
    assert_eq!(record.metadata["extractor"], "plain_text");
    assert!(!record.has_extraction_error());

    container.rebuild().wait_idle().await;

    let results = docs.search(&SearchQuery::new("invioce"));
    assert_eq!(results.match_kind, Some(MatchKind::Fuzzy));
    assert_eq!(results.hits[0].record.id, record.id);

    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_extraction_flags_record_but_keeps_it() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    let docs = container.documents();

    let upload = UploadedFile {
        original_name: "lost.txt".into(),
        mime_type: "text/plain".into(),
        size_bytes: 10,
        storage_path: dir.path().join("missing.txt").display().to_string(),
    };
    let record = docs.ingest_and_wait(upload).await.unwrap();

    assert!(record.has_extraction_error());
    assert!(record.metadata_str(META_EXTRACTION_ERROR_MESSAGE).is_some());
    assert_eq!(docs.list(10, 0).len(), 1);
    assert_eq!(docs.get(&record.id).unwrap(), record);

    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unsupported_mime_is_stored_without_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    let docs = container.documents();

    let record = docs
        .ingest_and_wait(UploadedFile {
            original_name: "photo.png".into(),
            mime_type: "image/png".into(),
            size_bytes: 2048,
            storage_path: "/uploads/photo.png".into(),
        })
        .await
        .unwrap();

    assert!(record.extracted_text.is_empty());
    assert!(!record.has_extraction_error());
    assert_eq!(container.extraction_queue().stats().completed_jobs, 0);

    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_invalid_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    let err = container
        .documents()
        .ingest(UploadedFile {
            original_name: "  ".into(),
            mime_type: "text/plain".into(),
            size_bytes: 0,
            storage_path: "/uploads/x".into(),
        })
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(container.store().count(), 0);
}

#[tokio::test]
async fn test_delete_invalidates_cached_search() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    let docs = container.documents();

    let record = docs
        .ingest_and_wait(write_file(dir.path(), "memo.txt", "quarterly forecast"))
        .await
        .unwrap();
    container.rebuild().wait_idle().await;

    assert_eq!(docs.search(&SearchQuery::new("forecast")).total_count, 1);
    assert!(docs.delete(&record.id));
    assert_eq!(
        container
            .cache()
            .stats(CacheNamespace::SearchResults)
            .entry_count,
        0
    );

    container.rebuild().wait_idle().await;
    assert_eq!(docs.search(&SearchQuery::new("forecast")).total_count, 0);
    assert!(docs.get(&record.id).is_none());

    container.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_restart_restores_records_and_index() {
    let dir = tempfile::tempdir().unwrap();

    let first = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    let record = first
        .documents()
        .ingest_and_wait(write_file(dir.path(), "notes.txt", "retrospective action items"))
        .await
        .unwrap();
    first.shutdown().await.unwrap();

    let second = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    assert_eq!(second.documents().get(&record.id).unwrap(), record);
    second.rebuild().wait_idle().await;
    let results = second.documents().search(&SearchQuery::new("retrospective"));
    assert_eq!(results.hits[0].record.id, record.id);
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_health_report_serializes() {
    let dir = tempfile::tempdir().unwrap();
    let container = ServiceContainer::build(test_config(dir.path())).await.unwrap();
    container
        .documents()
        .ingest_and_wait(write_file(dir.path(), "a.txt", "alpha"))
        .await
        .unwrap();
    container.rebuild().wait_idle().await;

    let report = container.health();
    assert!(report.is_ok());
    assert_eq!(report.store.total_records, 1);
    assert_eq!(report.queues.len(), 2);
    assert_eq!(report.caches.len(), 4);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["store"]["totalRecords"], 1);
    assert!(json["caches"]["searchResults"].is_object());
    assert_eq!(json["index"]["records"], 1);

    container.shutdown().await.unwrap();
    assert!(!container.health().is_ok());
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let result =
        ServiceContainer::build(test_config(dir.path()).with_fuzzy_threshold(-1.0)).await;
    assert!(matches!(result, Err(Error::Config(_))));
}
