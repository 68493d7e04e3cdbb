//! Plain text extractor - handles text and text-like structured files.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::io::AsyncReadExt;
use tracing::debug;

use docket_core::{defaults, ExtractedText, Metadata, Result, TextExtractor};

/// Non-`text/*` MIME types that are plain text on disk.
const TEXT_LIKE_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/javascript",
    "application/x-yaml",
    "application/yaml",
    "application/toml",
    "application/x-sh",
];

/// Extractor for plain text files.
///
/// Reads the file as UTF-8 (with lossy conversion for invalid sequences),
/// up to `max_bytes`, and returns the text with char and line counts.
pub struct PlainTextExtractor {
    max_bytes: usize,
}

impl PlainTextExtractor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new(defaults::TEXT_EXTRACTION_MAX_BYTES)
    }
}

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn can_extract(&self, mime_type: &str) -> bool {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence.starts_with("text/")
            || essence.ends_with("+json")
            || essence.ends_with("+xml")
            || TEXT_LIKE_TYPES.contains(&essence.as_str())
    }

    async fn extract_text(&self, path: &Path, _mime_type: &str) -> Result<ExtractedText> {
        let file = tokio::fs::File::open(path).await?;
        let file_len = file.metadata().await?.len();

        let mut data = Vec::new();
        file.take(self.max_bytes as u64).read_to_end(&mut data).await?;
        let truncated = file_len > data.len() as u64;

        let text = String::from_utf8_lossy(&data).into_owned();
        let char_count = text.chars().count();
        let line_count = text.lines().count();

        debug!(
            path = %path.display(),
            bytes = data.len(),
            truncated,
            "Extracted plain text"
        );

        let mut metadata = Metadata::new();
        metadata.insert("charCount".into(), JsonValue::from(char_count));
        metadata.insert("lineCount".into(), JsonValue::from(line_count));
        if truncated {
            metadata.insert("truncated".into(), JsonValue::Bool(true));
        }

        Ok(ExtractedText { text, metadata })
    }
}
