/// Error types for the synchronization engine
use std::collections::BTreeMap;

use thiserror::Error;

use crate::entity::EntityRef;

/// Failure talking to the translation management service.
///
/// Every transport-level or envelope-level problem collapses into this single
/// `(code, message)` pair. Transport failures that never produced an HTTP
/// status use code `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: i64,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error that did not come from the remote side (no status code available)
    pub fn local(message: impl Into<String>) -> Self {
        Self::new(-1, message)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let code = err.status().map(|s| i64::from(s.as_u16())).unwrap_or(-1);
        ProviderError::new(code, err.to_string())
    }
}

/// Aggregate of per-item failures from a batch operation.
///
/// Keys are item identifiers (file ids, entity keys, base names), values the
/// error description. The batch that produced it kept going past each item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("Failed files: {errors_by_item:?}")]
pub struct FilesError {
    pub errors_by_item: BTreeMap<String, String>,
}

impl FilesError {
    pub fn new(errors_by_item: BTreeMap<String, String>) -> Self {
        Self { errors_by_item }
    }

    pub fn single(item: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors_by_item = BTreeMap::new();
        errors_by_item.insert(item.into(), message.into());
        Self { errors_by_item }
    }

    pub fn len(&self) -> usize {
        self.errors_by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors_by_item.is_empty()
    }

    pub fn contains(&self, item: &str) -> bool {
        self.errors_by_item.contains_key(item)
    }
}

/// Top-level error for the sync engines
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Files(#[from] FilesError),

    /// Required identifiers missing for an ad hoc operation
    #[error("Argument error: {0}")]
    Argument(String),

    /// Raised by the storage collaborator
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote content that does not have the expected shape
    #[error("Malformed content: {0}")]
    Content(String),

    #[error("Can't find {0}")]
    EntityNotFound(EntityRef),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type for engine operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new(404, "not found");
        assert_eq!(err.to_string(), "404: not found");
        assert_eq!(ProviderError::local("boom").code, -1);
    }

    #[test]
    fn test_files_error_display_lists_items() {
        let err = FilesError::single("12", "404: not found");
        assert_eq!(err.to_string(), r#"Failed files: {"12": "404: not found"}"#);
        assert!(err.contains("12"));
        assert_eq!(err.len(), 1);
    }

    #[test]
    fn test_sync_error_wraps_provider_error_transparently() {
        let err: SyncError = ProviderError::new(500, "server error").into();
        assert_eq!(err.to_string(), "500: server error");
    }

    #[test]
    fn test_entity_not_found_message() {
        let err = SyncError::EntityNotFound(EntityRef::new("Post", "1"));
        assert_eq!(err.to_string(), "Can't find Post 1");
    }
}
