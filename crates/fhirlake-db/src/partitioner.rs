//! Equal-width ID-range partitioning over the source tables.
//!
//! Scales extraction past the FHIR search API: read each table's integer
//! PK space directly, split it into ranges, resolve the UUIDs per range,
//! and emit id batches sized for a single `_id=a,b,c` search.

use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::PgPool;
use tracing::{debug, info};

use crate::error::Result;
use crate::mapping::TableFhirMap;

/// One `GET <base>/<type>?_id=...` worth of work. Value object; batches
/// with identical fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdBatch {
    pub resource_type: String,
    pub ids: Vec<String>,
}

impl IdBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Split `[0, max_id]` into contiguous half-open ranges of `batch_size`.
/// The union covers `[0, max_id + 1)` with no gaps or overlap, so the
/// row carrying the maximum id is never dropped by the `id < to` probe.
pub fn id_ranges(max_id: i64, batch_size: i64) -> Vec<(i64, i64)> {
    assert!(batch_size > 0, "batch_size must be positive");
    let mut ranges = Vec::new();
    let mut from = 0;
    while from <= max_id {
        let to = (from + batch_size).min(max_id + 1);
        ranges.push((from, to));
        from += batch_size;
    }
    ranges
}

/// Group resolved UUIDs into batches of at most `fetch_size`.
pub fn chunk_ids(resource_type: &str, ids: Vec<String>, fetch_size: usize) -> Vec<IdBatch> {
    assert!(fetch_size > 0, "fetch_size must be positive");
    ids.chunks(fetch_size)
        .map(|chunk| IdBatch {
            resource_type: resource_type.to_string(),
            ids: chunk.to_vec(),
        })
        .collect()
}

/// Plans id batches for the requested resource types by scanning the
/// mapped tables of the backing store.
pub struct IdRangePartitioner {
    pool: PgPool,
    mapping: TableFhirMap,
    batch_size: i64,
    fetch_size: usize,
}

impl IdRangePartitioner {
    pub fn new(pool: PgPool, mapping: TableFhirMap, batch_size: i64, fetch_size: usize) -> Self {
        Self {
            pool,
            mapping,
            batch_size,
            fetch_size,
        }
    }

    /// Resolve every id batch for the requested types. Mapping misses fail
    /// fast before any query runs.
    pub async fn plan(&self, resource_types: &[String]) -> Result<Vec<IdBatch>> {
        // Validate the whole request up front.
        for ty in resource_types {
            self.mapping.tables_for(ty)?;
        }

        let mut batches = Vec::new();
        for ty in resource_types {
            for table in self.mapping.tables_for(ty)? {
                let Some(max_id) = self.max_id(&table.table_name).await? else {
                    debug!(table = %table.table_name, "table is empty, skipping");
                    continue;
                };
                let mut ids = Vec::new();
                for (from, to) in id_ranges(max_id, self.batch_size) {
                    ids.extend(self.uuids_in_range(&table.table_name, from, to).await?);
                }
                info!(
                    resource_type = %ty,
                    table = %table.table_name,
                    max_id,
                    uuids = ids.len(),
                    "partitioned table"
                );
                batches.extend(chunk_ids(ty, ids, self.fetch_size));
            }
        }
        Ok(batches)
    }

    async fn max_id(&self, table: &str) -> Result<Option<i64>> {
        // Table names come from the validated mapping file, not user input.
        let sql = format!("SELECT MAX(id) FROM {table}");
        let max: Option<i64> = query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(max)
    }

    async fn uuids_in_range(&self, table: &str, from: i64, to: i64) -> Result<Vec<String>> {
        let sql = format!("SELECT uuid FROM {table} WHERE id >= $1 AND id < $2 ORDER BY id");
        let uuids: Vec<String> = query_scalar(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;
        Ok(uuids)
    }
}
