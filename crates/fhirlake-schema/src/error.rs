use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving Arrow schemas for FHIR resource types.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("No structure definition loaded for resource type '{0}'")]
    UnknownResourceType(String),

    #[error("Failed to load profile from {path}: {message}")]
    ProfileLoad { path: PathBuf, message: String },

    #[error("View definition '{0}' has no 'id' column; mergeable views must declare one")]
    ViewMissingId(String),

    #[error("Failed to load view definition from {path}: {message}")]
    ViewLoad { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    pub fn profile_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ProfileLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn view_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ViewLoad {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;
