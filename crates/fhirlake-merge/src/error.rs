use thiserror::Error;

use fhirlake_schema::SchemaError;

/// Errors raised while merging two warehouse snapshots.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("Table '{table}' has no '{column}' column")]
    MissingColumn { table: String, column: String },

    #[error("Table '{table}' row {row} has no id")]
    MissingId { table: String, row: usize },

    #[error("Record '{table}/{id}' has no meta.lastUpdated; cannot order snapshots")]
    MissingLastUpdated { table: String, id: String },

    #[error("Inputs disagree on the schema of table '{table}'; re-extract with identical structure definitions")]
    SchemaMismatch { table: String },

    #[error("View definition error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    pub fn missing_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            table: table.into(),
            column: column.into(),
        }
    }
}

/// Convenience result type for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;
