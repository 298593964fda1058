use std::path::PathBuf;

use thiserror::Error;

/// Errors from the direct-database extraction path.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Resource type '{0}' has no entry in the table-FHIR mapping")]
    UnmappedResource(String),

    #[error("Table name '{0}' is not a plain SQL identifier")]
    InvalidTableName(String),

    #[error("Failed to load table-FHIR mapping from {path}: {message}")]
    MappingLoad { path: PathBuf, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::error::Error),
}

impl DbError {
    pub fn mapping_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MappingLoad {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, DbError>;
