//! Merge error types

use thiserror::Error;

/// Errors that abort a merge
///
/// None of these leave a partially merged dataset behind: the caller must not
/// push anything upstream when a merge fails.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// Payload is not a JSON array of records
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Client tried to create a record whose unique key is live on the server
    #[error(
        "Duplicate key conflict: a record with unique key {key} is already present on the server; \
         sync before pushing this change"
    )]
    DuplicateKeyConflict { key: String },

    /// Local and server copies disagree on the shape of a field
    #[error("Schema mismatch on field '{field}': {detail}")]
    SchemaMismatch { field: String, detail: String },
}

impl MergeError {
    pub(crate) fn schema(field: &str, detail: impl Into<String>) -> Self {
        MergeError::SchemaMismatch {
            field: field.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;
