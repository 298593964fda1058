pub mod error;
pub mod executor;
pub mod pipeline;
pub mod plan;
pub mod summary;

pub use error::{PipelineError, Result};
pub use executor::{RunCounters, SegmentExecutor};
pub use pipeline::{Pipeline, PipelineConfig, TYPES_FILE};
pub use plan::{FetchTask, SearchSegment, page_offsets, plan_search_segments};
pub use summary::RunSummary;
