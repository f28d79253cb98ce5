use crate::backend::BackendError;

/// Errors from the store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage quota exceeded while saving {key}")]
    QuotaExceeded { key: String },
    #[error("permission denied while accessing {key}")]
    PermissionDenied { key: String },
    #[error("storage failure on {key}: {source}")]
    Backend {
        key: String,
        #[source]
        source: BackendError,
    },
    #[error("stored data under {key} is corrupted: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Classify a backend failure for `key`.
    pub(crate) fn from_backend(key: &str, source: BackendError) -> Self {
        match source {
            BackendError::QuotaExceeded { .. } => StoreError::QuotaExceeded {
                key: key.to_string(),
            },
            BackendError::PermissionDenied(_) => StoreError::PermissionDenied {
                key: key.to_string(),
            },
            other => StoreError::Backend {
                key: key.to_string(),
                source: other,
            },
        }
    }
}

/// A single migration step failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MigrationError {
    #[error("Migration to {target_version} failed: {cause}")]
    Step {
        target_version: String,
        cause: String,
    },
}

/// Rejected prize or participant names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntryError {
    #[error("name must not be empty")]
    Empty,
    #[error("name is longer than {max} characters")]
    TooLong { max: usize },
    #[error("\"{0}\" already exists")]
    Duplicate(String),
}

/// Malformed import documents.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("import is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("import has an unexpected shape: {0}")]
    Shape(&'static str),
    #[error("import could not be migrated: {0}")]
    Migration(#[from] MigrationError),
}
