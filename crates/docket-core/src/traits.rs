//! Trait seams between docket components and external collaborators.

use std::path::Path;

use async_trait::async_trait;

use crate::models::{DocumentRecord, ExtractedText};
use crate::Result;

// =============================================================================
// EXTRACTION
// =============================================================================

/// Provider that turns a stored file into searchable text.
///
/// Implementations may fail; callers record failures as metadata flags
/// rather than propagating them.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Human-readable name of this extractor.
    fn name(&self) -> &str;

    /// Whether this extractor handles the given MIME type.
    fn can_extract(&self, mime_type: &str) -> bool;

    /// Extract text and metadata from the file at `path`.
    async fn extract_text(&self, path: &Path, mime_type: &str) -> Result<ExtractedText>;
}

// =============================================================================
// RECORD ACCESS
// =============================================================================

/// Read-only view over the authoritative record collection.
///
/// Index rebuilds and the substring fallback read through this so that
/// neither ever owns record state.
pub trait RecordSource: Send + Sync {
    /// A point-in-time copy of every record.
    fn snapshot(&self) -> Vec<DocumentRecord>;

    /// Number of records.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSource for Vec<DocumentRecord> {
    fn snapshot(&self) -> Vec<DocumentRecord> {
        self.clone()
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }
}
