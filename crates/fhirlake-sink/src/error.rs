use thiserror::Error;

use fhirlake_core::CoreError;
use fhirlake_schema::SchemaError;

/// Errors from the Parquet sink. I/O failures are fatal for the affected
/// resource type: the writer is discarded and later writes to the type
/// report [`SinkError::TypePoisoned`].
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink is closed; no further writes are accepted")]
    Closed,

    #[error("Writer for resource type '{0}' failed earlier in this run")]
    TypePoisoned(String),

    #[error("Resource cannot be written: {0}")]
    InvalidResource(#[from] CoreError),

    #[error("Schema resolution failed: {0}")]
    Schema(#[from] SchemaError),

    #[error("Arrow conversion failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet write failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;
