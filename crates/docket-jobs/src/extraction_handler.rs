//! ExtractionHandler - runs the text extractor matching an upload's MIME type.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use uuid::Uuid;

use docket_core::{Error, ExtractedText, JobType};

use crate::extraction::ExtractorRegistry;
use crate::handler::{JobContext, JobHandler, JobResult};

/// Payload of an extraction job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub record_id: Uuid,
    pub storage_path: PathBuf,
    pub mime_type: String,
}

impl ExtractionRequest {
    pub fn new(
        record_id: Uuid,
        storage_path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            record_id,
            storage_path: storage_path.into(),
            mime_type: mime_type.into(),
        }
    }
}

pub struct ExtractionHandler {
    registry: Arc<ExtractorRegistry>,
}

impl ExtractionHandler {
    pub fn new(registry: Arc<ExtractorRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ExtractorRegistry> {
        &self.registry
    }
}

#[async_trait]
impl JobHandler for ExtractionHandler {
    type Payload = ExtractionRequest;
    type Output = ExtractedText;

    fn job_type(&self) -> JobType {
        JobType::Extraction
    }

    async fn execute(&self, ctx: JobContext<ExtractionRequest>) -> JobResult<ExtractedText> {
        let request = ctx.payload();

        let extractor = match self.registry.find(&request.mime_type) {
            Some(e) => e,
            None => {
                return JobResult::Failed(format!(
                    "No extractor registered for MIME type: {}",
                    request.mime_type
                ))
            }
        };

        ctx.report_progress(10, Some("Extracting text"));

        match extractor
            .extract_text(&request.storage_path, &request.mime_type)
            .await
        {
            Ok(mut extracted) => {
                extracted
                    .metadata
                    .insert("extractor".into(), JsonValue::from(extractor.name()));
                ctx.report_progress(100, Some("Extraction complete"));
                info!(
                    record_id = %request.record_id,
                    extractor = extractor.name(),
                    chars = extracted.text.len(),
                    attempt = ctx.attempt(),
                    "Text extracted"
                );
                JobResult::Success(extracted)
            }
            Err(Error::InvalidInput(msg)) => JobResult::Failed(msg),
            Err(e) => {
                warn!(
                    record_id = %request.record_id,
                    path = %request.storage_path.display(),
                    attempt = ctx.attempt(),
                    error = %e,
                    "Text extraction attempt failed"
                );
                JobResult::Retry(e.to_string())
            }
        }
    }
}
