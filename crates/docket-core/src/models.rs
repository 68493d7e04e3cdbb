//! Data models for docket: document records, uploads, extraction output and jobs.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Open key/value metadata attached to a record.
///
/// A `BTreeMap` keeps snapshot output stable across rewrites.
pub type Metadata = BTreeMap<String, JsonValue>;

/// Metadata key set when text extraction failed for a record.
pub const META_EXTRACTION_ERROR: &str = "extractionError";

/// Metadata key holding the extraction failure message.
pub const META_EXTRACTION_ERROR_MESSAGE: &str = "extractionErrorMessage";

// =============================================================================
// DOCUMENT RECORDS
// =============================================================================

/// A stored document: upload facts, extracted text and open metadata.
///
/// `id` and `created_at` never change once assigned. Every mutation through
/// the helper methods stamps `last_modified_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: Uuid,
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_path: String,
    #[serde(default)]
    pub extracted_text: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create a record with a fresh id and both timestamps set to now.
    pub fn new(
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
        size_bytes: u64,
        storage_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            original_name: original_name.into(),
            mime_type: mime_type.into(),
            size_bytes,
            storage_path: storage_path.into(),
            extracted_text: String::new(),
            metadata: Metadata::new(),
            created_at: now,
            last_modified_at: now,
        }
    }

    /// Create a record from an uploaded file.
    pub fn from_upload(upload: &UploadedFile) -> Self {
        Self::new(
            upload.original_name.clone(),
            upload.mime_type.clone(),
            upload.size_bytes,
            upload.storage_path.clone(),
        )
    }

    /// Builder-style extracted text setter (does not touch timestamps).
    pub fn with_extracted_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = text.into();
        self
    }

    /// Builder-style metadata setter (does not touch timestamps).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamp `last_modified_at` with the current time.
    pub fn touch(&mut self) {
        self.last_modified_at = Utc::now();
    }

    /// Replace the extracted text.
    pub fn set_extracted_text(&mut self, text: impl Into<String>) {
        self.extracted_text = text.into();
        self.touch();
    }

    /// Merge metadata entries, overwriting existing keys.
    pub fn merge_metadata(&mut self, entries: Metadata) {
        self.metadata.extend(entries);
        self.touch();
    }

    /// Flag the record as having failed extraction.
    pub fn mark_extraction_error(&mut self, message: impl Into<String>) {
        self.metadata
            .insert(META_EXTRACTION_ERROR.to_string(), JsonValue::Bool(true));
        self.metadata.insert(
            META_EXTRACTION_ERROR_MESSAGE.to_string(),
            JsonValue::String(message.into()),
        );
        self.touch();
    }

    /// Whether extraction failed for this record.
    pub fn has_extraction_error(&self) -> bool {
        self.metadata
            .get(META_EXTRACTION_ERROR)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    /// String value of a metadata key, if present and a string.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(JsonValue::as_str)
    }

    /// Value of a named field as a string, for field-equality lookups.
    ///
    /// Supports `id`, `originalName`, `mimeType`, `storagePath`,
    /// `extractedText`, `sizeBytes` and `metadata.<key>`. Non-string
    /// metadata values are rendered as JSON.
    pub fn field_value(&self, name: &str) -> Option<String> {
        if let Some(key) = name.strip_prefix("metadata.") {
            return self.metadata.get(key).map(|v| match v {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        match name {
            "id" => Some(self.id.to_string()),
            "originalName" => Some(self.original_name.clone()),
            "mimeType" => Some(self.mime_type.clone()),
            "storagePath" => Some(self.storage_path.clone()),
            "extractedText" => Some(self.extracted_text.clone()),
            "sizeBytes" => Some(self.size_bytes.to_string()),
            _ => None,
        }
    }
}

/// Facts about an uploaded file, as handed over by the upload layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub storage_path: String,
}

/// Output of a text extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedText {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

// =============================================================================
// JOBS
// =============================================================================

/// Kind of background work. Each queue runs a handler for one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Extract text from an uploaded file
    Extraction,
    /// Rebuild the fuzzy search index from the record store
    IndexRebuild,
}

impl JobType {
    /// Default priority for this job type (higher = more urgent)
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::IndexRebuild => 5,
            JobType::Extraction => crate::defaults::JOB_PRIORITY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Extraction => "extraction",
            JobType::IndexRebuild => "index_rebuild",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job.
///
/// ```text
/// queued -> running -> completed
///                   -> retrying -> queued
///                   -> failed
/// queued | retrying -> abandoned   (queue shutdown)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Retrying,
    Completed,
    Failed,
    Abandoned,
}

impl JobStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Abandoned
        )
    }

    /// Whether `self -> next` is a legal lifecycle transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Abandoned)
                | (Running, Completed)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Queued)
                | (Retrying, Abandoned)
        )
    }
}

/// A unit of work owned by the queue that accepted it.
#[derive(Debug, Clone)]
pub struct Job<P> {
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: P,
    pub priority: i32,
    /// Number of attempts started so far.
    pub attempt: u32,
    pub max_retries: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl<P> Job<P> {
    pub fn new(
        job_type: JobType,
        payload: P,
        priority: i32,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            payload,
            priority,
            attempt: 0,
            max_retries,
            timeout,
            status: JobStatus::Queued,
            created_at: Utc::now(),
        }
    }

    /// Move to `next`. Illegal transitions are a queue bug and trip a debug
    /// assertion.
    pub fn transition(&mut self, next: JobStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal job transition {:?} -> {:?}",
            self.status,
            next
        );
        self.status = next;
    }

    /// Whether another attempt is allowed after the current one fails.
    pub fn can_retry(&self) -> bool {
        self.attempt <= self.max_retries
    }
}
