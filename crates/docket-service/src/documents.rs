//! Document operations: ingest with background extraction, search, listing.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use docket_core::{
    DocumentRecord, Error, ExtractedText, Result, SearchQuery, SearchResults, UploadedFile,
};
use docket_db::RecordStore;
use docket_jobs::{
    ExtractionHandler, ExtractionRequest, ExtractorRegistry, JobHandle, JobOptions, JobQueue,
};
use docket_search::SearchEngine;

/// Front door for callers handling uploads and queries.
#[derive(Clone)]
pub struct DocumentService {
    store: Arc<RecordStore>,
    engine: Arc<SearchEngine>,
    extraction: JobQueue<ExtractionHandler>,
    registry: Arc<ExtractorRegistry>,
}

impl DocumentService {
    pub fn new(
        store: Arc<RecordStore>,
        engine: Arc<SearchEngine>,
        extraction: JobQueue<ExtractionHandler>,
        registry: Arc<ExtractorRegistry>,
    ) -> Self {
        Self {
            store,
            engine,
            extraction,
            registry,
        }
    }

    /// Save a record for `upload` and extract its text in the background.
    ///
    /// Returns the saved record immediately. Extraction results (or the
    /// failure flags) are applied to the record when the job finishes.
    pub fn ingest(&self, upload: UploadedFile) -> Result<DocumentRecord> {
        let (record, handle) = self.start_ingest(upload)?;
        if let Some(handle) = handle {
            let store = self.store.clone();
            let id = record.id;
            tokio::spawn(async move {
                apply_extraction(&store, id, handle.wait().await);
            });
        }
        Ok(record)
    }

    /// Like [`ingest`](Self::ingest) but waits for extraction and returns
    /// the record as updated by it.
    pub async fn ingest_and_wait(&self, upload: UploadedFile) -> Result<DocumentRecord> {
        let (record, handle) = self.start_ingest(upload)?;
        let Some(handle) = handle else {
            return Ok(record);
        };
        let id = record.id;
        Ok(apply_extraction(&self.store, id, handle.wait().await)
            .unwrap_or(record))
    }

    fn start_ingest(
        &self,
        upload: UploadedFile,
    ) -> Result<(DocumentRecord, Option<JobHandle<ExtractedText>>)> {
        if upload.original_name.trim().is_empty() {
            return Err(Error::InvalidInput("upload has no file name".into()));
        }
        if upload.storage_path.trim().is_empty() {
            return Err(Error::InvalidInput("upload has no storage path".into()));
        }

        let record = self.store.save(DocumentRecord::from_upload(&upload));
        info!(
            record_id = %record.id,
            name = %record.original_name,
            mime_type = %record.mime_type,
            size_bytes = record.size_bytes,
            "Document ingested"
        );

        if !self.registry.can_extract(&record.mime_type) {
            debug!(
                record_id = %record.id,
                mime_type = %record.mime_type,
                "No extractor for MIME type"
            );
            return Ok((record, None));
        }

        let request = ExtractionRequest::new(record.id, &record.storage_path, &record.mime_type);
        match self.extraction.enqueue(request, JobOptions::default()) {
            Ok(handle) => Ok((record, Some(handle))),
            Err(e) => {
                let flagged = apply_extraction(&self.store, record.id, Err(e));
                Ok((flagged.unwrap_or(record), None))
            }
        }
    }

    /// Run a search query.
    pub fn search(&self, query: &SearchQuery) -> SearchResults {
        self.engine.search(query)
    }

    pub fn get(&self, id: &Uuid) -> Option<DocumentRecord> {
        self.store.find_by_id(id)
    }

    /// Records newest first.
    pub fn list(&self, limit: usize, offset: usize) -> Vec<DocumentRecord> {
        self.store.find_all(limit, offset)
    }

    pub fn delete(&self, id: &Uuid) -> bool {
        self.store.delete(id)
    }
}

/// Record an extraction outcome on the record.
///
/// Success stores the text and merges metadata; failure sets the
/// `extractionError` flags. Returns `None` if the record was deleted
/// in the meantime.
fn apply_extraction(
    store: &RecordStore,
    id: Uuid,
    outcome: Result<ExtractedText>,
) -> Option<DocumentRecord> {
    let result = match outcome {
        Ok(extracted) => store.modify(&id, |record| {
            record.set_extracted_text(extracted.text);
            record.merge_metadata(extracted.metadata);
        }),
        Err(e) => {
            warn!(record_id = %id, error = %e, "Extraction failed, flagging record");
            let message = e.to_string();
            store.modify(&id, |record| record.mark_extraction_error(message))
        }
    };

    match result {
        Ok(record) => Some(record),
        Err(Error::RecordNotFound(_)) => {
            debug!(record_id = %id, "Record deleted before extraction finished");
            None
        }
        Err(e) => {
            warn!(record_id = %id, error = %e, "Could not apply extraction result");
            None
        }
    }
}
