//! Error types for docket.

use thiserror::Error;

/// Result type alias using docket's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docket operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document record not found
    #[error("Record not found: {0}")]
    RecordNotFound(uuid::Uuid),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Job reached a terminal failure
    #[error("Job error: {0}")]
    Job(String),

    /// A single job attempt exceeded its timeout
    #[error("Job timed out after {0}ms")]
    JobTimeout(u64),

    /// Job was dropped by a queue shutdown before it could finish
    #[error("Job abandoned: {0}")]
    JobAbandoned(uuid::Uuid),

    /// Queue no longer accepts work
    #[error("Queue closed: {0}")]
    QueueClosed(String),

    /// Text extraction failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_record_not_found() {
        let id = Uuid::nil();
        let err = Error::RecordNotFound(id);
        assert_eq!(err.to_string(), format!("Record not found: {}", id));
    }

    #[test]
    fn test_error_display_job_timeout() {
        let err = Error::JobTimeout(1500);
        assert_eq!(err.to_string(), "Job timed out after 1500ms");
    }

    #[test]
    fn test_error_display_queue_closed() {
        let err = Error::QueueClosed("extraction".to_string());
        assert_eq!(err.to_string(), "Queue closed: extraction");
    }

    #[test]
    fn test_error_display_extraction() {
        let err = Error::Extraction("unreadable".to_string());
        assert_eq!(err.to_string(), "Extraction error: unreadable");
    }

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("I/O error:"));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
