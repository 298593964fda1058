pub mod config;
pub mod error;
pub mod mapping;
pub mod partitioner;
pub mod pool;

pub use config::DbConfig;
pub use error::{DbError, Result};
pub use mapping::{TableFhirMap, TableMapping};
pub use partitioner::{IdBatch, IdRangePartitioner, chunk_ids, id_ranges};
pub use pool::create_pool;
