pub mod error;
pub mod sink;
pub mod writer;

pub use error::{Result, SinkError};
pub use sink::{ParquetSink, SinkConfig, DEFAULT_ROW_GROUP_BYTES};
