use thiserror::Error;

use fhirlake_client::ClientError;
use fhirlake_db::DbError;
use fhirlake_sink::SinkError;

/// Fatal pipeline errors. Per-segment failures are counted and skipped;
/// everything here aborts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source server error: {0}")]
    Client(#[from] ClientError),

    #[error("Warehouse sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Source database error: {0}")]
    Db(#[from] DbError),

    #[error("Count probe for '{0}' returned no total")]
    MissingTotal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
