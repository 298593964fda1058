pub mod error;
pub mod merger;
pub mod reader;

pub use error::{MergeError, Result};
pub use merger::{MergeConfig, MergeReport, Merger, TypeStats};
