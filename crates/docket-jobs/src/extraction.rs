//! Extractor registry for dispatching text extraction by MIME type.

use std::path::Path;
use std::sync::Arc;

use docket_core::{Error, ExtractedText, Result, TextExtractor};

use crate::adapters::PlainTextExtractor;

/// Ordered list of text extractors.
///
/// Lookup walks extractors in registration order and picks the first whose
/// `can_extract` accepts the MIME type.
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn TextExtractor>>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Registry preloaded with the built-in extractors.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PlainTextExtractor::default()));
        registry
    }

    /// Register an extractor after all existing ones.
    pub fn register(&mut self, extractor: Arc<dyn TextExtractor>) {
        self.extractors.push(extractor);
    }

    /// First extractor able to handle `mime_type`.
    pub fn find(&self, mime_type: &str) -> Option<Arc<dyn TextExtractor>> {
        self.extractors
            .iter()
            .find(|e| e.can_extract(mime_type))
            .cloned()
    }

    pub fn can_extract(&self, mime_type: &str) -> bool {
        self.find(mime_type).is_some()
    }

    /// Extract text using the first matching extractor.
    pub async fn extract(&self, path: &Path, mime_type: &str) -> Result<ExtractedText> {
        let extractor = self.find(mime_type).ok_or_else(|| {
            Error::Extraction(format!(
                "No extractor registered for MIME type: {}",
                mime_type
            ))
        })?;
        extractor.extract_text(path, mime_type).await
    }

    /// Names of registered extractors, in lookup order.
    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|e| e.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedExtractor {
        name: &'static str,
        prefix: &'static str,
    }

    #[async_trait]
    impl TextExtractor for FixedExtractor {
        fn name(&self) -> &str {
            self.name
        }

        fn can_extract(&self, mime_type: &str) -> bool {
            mime_type.starts_with(self.prefix)
        }

        async fn extract_text(&self, _path: &Path, _mime_type: &str) -> Result<ExtractedText> {
            Ok(ExtractedText {
                text: self.name.to_string(),
                metadata: Default::default(),
            })
        }
    }

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ExtractorRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.can_extract("text/plain"));
    }

    #[test]
    fn test_builtin_registry_handles_text() {
        let registry = ExtractorRegistry::with_builtin();
        assert_eq!(registry.names(), vec!["plain_text".to_string()]);
        assert!(registry.can_extract("text/markdown"));
        assert!(!registry.can_extract("application/pdf"));
    }

    #[tokio::test]
    async fn test_first_matching_extractor_wins() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Arc::new(FixedExtractor {
            name: "first",
            prefix: "application/",
        }));
        registry.register(Arc::new(FixedExtractor {
            name: "second",
            prefix: "application/pdf",
        }));

        let out = registry
            .extract(Path::new("/tmp/unused"), "application/pdf")
            .await
            .unwrap();
        assert_eq!(out.text, "first");
    }

    #[tokio::test]
    async fn test_extract_without_match_fails() {
        let registry = ExtractorRegistry::new();
        let err = registry
            .extract(Path::new("/tmp/unused"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }
}
