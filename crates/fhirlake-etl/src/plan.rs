//! Segment planning: turn totals into fetchable windows.

use tracing::{debug, info};

use fhirlake_client::{ClientError, SourceClient, next_page_token};
use fhirlake_db::IdBatch;

use crate::error::{PipelineError, Result};

/// One paged FHIR query window. Value object; segments with identical
/// fields are equal.
///
/// `page_token` is the server's `_getpages` cursor. It is `None` only in
/// the degenerate plan for a type whose whole extent fits in the first
/// page: the server issued no cursor, and the segment re-runs the plain
/// type search instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchSegment {
    pub page_token: Option<String>,
    pub resource_type: String,
    pub offset: u64,
    pub count: u32,
}

/// A unit of fetch work for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchTask {
    Page(SearchSegment),
    Ids(IdBatch),
}

/// The page starts covering `[0, total)` in `page_size` steps, with no
/// gaps and no overlap.
pub fn page_offsets(total: u64, page_size: u32) -> Vec<u64> {
    (0..total).step_by(page_size.max(1) as usize).collect()
}

/// Probe each requested type and plan its search segments.
///
/// The `_summary=count` probe yields the total; a second single-entry
/// probe yields the `_getpages` cursor all segments share. A type whose
/// probe carries no `next` link gets the single degenerate segment.
pub async fn plan_search_segments(
    client: &SourceClient,
    resource_types: &[String],
    page_size: u32,
) -> Result<Vec<FetchTask>> {
    let mut tasks = Vec::new();

    for resource_type in resource_types {
        let probe = client.search_for_resource(resource_type, 1, true).await?;
        let total = probe
            .total()
            .ok_or_else(|| PipelineError::MissingTotal(resource_type.clone()))?;
        if total == 0 {
            info!(resource_type = %resource_type, "no records at source, skipping");
            continue;
        }

        let first = client.search_for_resource(resource_type, 1, false).await?;
        match next_page_token(&first) {
            Ok(token) => {
                let offsets = page_offsets(total, page_size);
                debug!(resource_type = %resource_type, total, segments = offsets.len(), "planned segments");
                tasks.extend(offsets.into_iter().map(|offset| {
                    FetchTask::Page(SearchSegment {
                        page_token: Some(token.clone()),
                        resource_type: resource_type.clone(),
                        offset,
                        count: page_size,
                    })
                }));
            }
            Err(ClientError::NoNextLink) => {
                debug!(resource_type = %resource_type, total, "single-page extent, degenerate segment");
                tasks.push(FetchTask::Page(SearchSegment {
                    page_token: None,
                    resource_type: resource_type.clone(),
                    offset: 0,
                    count: page_size,
                }));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(tasks)
}
