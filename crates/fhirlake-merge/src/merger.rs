//! Two-snapshot warehouse merge.
//!
//! For every id present in either input the merged warehouse keeps exactly
//! one record: the one with the greatest `meta.lastUpdated`, unless that
//! winner is a tombstone, in which case the id is dropped. Timestamps are
//! compared lexicographically, which is correct because the sink stores
//! UTC-normalized RFC 3339 instants verbatim; snapshots with mixed
//! timezone renderings must be re-extracted first.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ListArray, StringArray, StructArray, UInt32Array};
use arrow::compute::{concat_batches, take};
use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::{debug, info, warn};

use fhirlake_core::{REMOVE_TAG_CODE, REMOVE_TAG_SYSTEM};
use fhirlake_schema::{
    COL_ID, COL_LAST_UPDATED, COL_META, COL_TAG, COL_TAG_CODE, COL_TAG_SYSTEM, VIEW_COL_ID,
    VIEW_COL_LAST_UPDATED, load_view_definitions, view_schema,
};

use crate::error::{MergeError, Result};
use crate::reader::{list_tables, part_files, read_table};

const TYPES_FILE: &str = "_types.txt";
const WRITE_CHUNK_ROWS: usize = 8192;

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub dwh1: PathBuf,
    pub dwh2: PathBuf,
    pub output: PathBuf,
    pub row_group_bytes: usize,
    /// Part files each merged table is split across.
    pub num_shards: usize,
    /// When set, view tables named by the definitions in this directory
    /// are merged alongside the resource tables.
    pub view_definitions_dir: Option<PathBuf>,
}

impl MergeConfig {
    pub fn new(
        dwh1: impl Into<PathBuf>,
        dwh2: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dwh1: dwh1.into(),
            dwh2: dwh2.into(),
            output: output.into(),
            row_group_bytes: 32 * 1024 * 1024,
            num_shards: 1,
            view_definitions_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeStats {
    /// Ids that appeared more than once across both inputs.
    pub num_duplicates: u64,
    pub num_output_records: u64,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    pub tables: BTreeMap<String, TypeStats>,
    pub views: BTreeMap<String, TypeStats>,
    /// Tables present in only one input, copied verbatim.
    pub carried: Vec<String>,
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (table, stats) in self.tables.iter().chain(self.views.iter()) {
            writeln!(
                f,
                "  {table}: {} records ({} duplicate ids)",
                stats.num_output_records, stats.num_duplicates
            )?;
        }
        write!(f, "  carried over: {}", self.carried.len())
    }
}

/// How the merge key is read off a row.
enum KeyMode {
    /// Envelope columns: `id`, `meta.lastUpdated`, `meta.tag` tombstones.
    Resource,
    /// Flat view columns: `id`, `last_updated`; views have no tombstones.
    View,
}

pub struct Merger {
    config: MergeConfig,
}

impl Merger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<MergeReport> {
        let views = match &self.config.view_definitions_dir {
            Some(dir) => load_view_definitions(dir)?,
            None => Vec::new(),
        };
        // Reject unmergeable view definitions before touching any data.
        for view in &views {
            view_schema(view)?;
        }
        let view_names: HashSet<&str> = views.iter().map(|v| v.name.as_str()).collect();

        let tables_1: Vec<String> = list_tables(&self.config.dwh1)?
            .into_iter()
            .filter(|t| !view_names.contains(t.as_str()))
            .collect();
        let tables_2: Vec<String> = list_tables(&self.config.dwh2)?
            .into_iter()
            .filter(|t| !view_names.contains(t.as_str()))
            .collect();

        let mut report = MergeReport::default();
        let mut all: Vec<&String> = tables_1.iter().chain(tables_2.iter()).collect();
        all.sort();
        all.dedup();

        for table in all {
            let in_1 = tables_1.contains(table);
            let in_2 = tables_2.contains(table);
            let stats = if in_1 && in_2 {
                self.merge_table(table, KeyMode::Resource)?
            } else {
                let src = if in_1 { &self.config.dwh1 } else { &self.config.dwh2 };
                report.carried.push(table.clone());
                self.carry_table(table, src)?
            };
            report.tables.insert(table.clone(), stats);
        }

        for view in &views {
            let in_1 = self.config.dwh1.join(&view.name).is_dir();
            let in_2 = self.config.dwh2.join(&view.name).is_dir();
            let stats = match (in_1, in_2) {
                (true, true) => self.merge_table(&view.name, KeyMode::View)?,
                (true, false) => {
                    report.carried.push(view.name.clone());
                    self.carry_table(&view.name, &self.config.dwh1)?
                }
                (false, true) => {
                    report.carried.push(view.name.clone());
                    self.carry_table(&view.name, &self.config.dwh2)?
                }
                (false, false) => continue,
            };
            report.views.insert(view.name.clone(), stats);
        }

        self.write_types_file(&report)?;
        info!(
            tables = report.tables.len(),
            views = report.views.len(),
            "merge finished\n{report}"
        );
        Ok(report)
    }

    /// Merge one table present in both inputs.
    fn merge_table(&self, table: &str, mode: KeyMode) -> Result<TypeStats> {
        let batches_1 = read_table(&self.config.dwh1.join(table))?;
        let batches_2 = read_table(&self.config.dwh2.join(table))?;
        // Input order is the tie-break: rows read later win equal
        // timestamps, so the second snapshot overrides the first.
        let batches: Vec<RecordBatch> = batches_1.into_iter().chain(batches_2).collect();
        let Some(first) = batches.first() else {
            return Ok(TypeStats::default());
        };

        let schema = first.schema();
        if batches.iter().any(|b| b.schema() != schema) {
            return Err(MergeError::SchemaMismatch {
                table: table.to_string(),
            });
        }

        // Pick the winner per id.
        struct Winner {
            batch: usize,
            row: usize,
            last_updated: String,
            tombstone: bool,
            occurrences: u64,
        }
        let mut winners: IndexMap<String, Winner> = IndexMap::new();

        for (batch_idx, batch) in batches.iter().enumerate() {
            let keys = KeyReader::new(table, batch, &mode)?;
            for row in 0..batch.num_rows() {
                let key = keys.key(row)?;
                match winners.get_mut(&key.id) {
                    None => {
                        winners.insert(
                            key.id,
                            Winner {
                                batch: batch_idx,
                                row,
                                last_updated: key.last_updated,
                                tombstone: key.tombstone,
                                occurrences: 1,
                            },
                        );
                    }
                    Some(current) => {
                        current.occurrences += 1;
                        if key.last_updated >= current.last_updated {
                            current.batch = batch_idx;
                            current.row = row;
                            current.last_updated = key.last_updated;
                            current.tombstone = key.tombstone;
                        }
                    }
                }
            }
        }

        let num_duplicates = winners.values().filter(|w| w.occurrences > 1).count() as u64;
        for (id, winner) in &winners {
            if winner.occurrences > 2 {
                warn!(
                    table,
                    id = %id,
                    occurrences = winner.occurrences,
                    "id appears more than twice across two snapshots"
                );
            }
        }

        // Survivor rows per source batch, tombstones dropped.
        let mut take_plan: Vec<Vec<u32>> = vec![Vec::new(); batches.len()];
        for winner in winners.values().filter(|w| !w.tombstone) {
            take_plan[winner.batch].push(winner.row as u32);
        }

        let mut survivors = Vec::new();
        for (batch_idx, indices) in take_plan.iter().enumerate() {
            if indices.is_empty() {
                continue;
            }
            survivors.push(take_batch(&batches[batch_idx], indices)?);
        }

        let num_output_records = survivors.iter().map(|b| b.num_rows() as u64).sum();
        if num_output_records > 0 {
            let merged = concat_batches(&schema, survivors.iter())?;
            self.write_shards(table, &merged)?;
        }

        debug!(table, num_output_records, num_duplicates, "merged table");
        Ok(TypeStats {
            num_duplicates,
            num_output_records,
        })
    }

    /// Copy a table present in only one input, renumbering its part files.
    fn carry_table(&self, table: &str, src_root: &Path) -> Result<TypeStats> {
        let files = part_files(&src_root.join(table))?;
        let out_dir = self.config.output.join(table);
        let mut rows = 0u64;
        if !files.is_empty() {
            fs::create_dir_all(&out_dir)?;
        }
        for (index, src) in files.iter().enumerate() {
            let dst = out_dir.join(format!("part-{index:05}.parquet"));
            fs::copy(src, &dst)?;
            let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(src)?)?;
            rows += reader.metadata().file_metadata().num_rows().max(0) as u64;
        }
        debug!(table, rows, files = files.len(), "carried table over");
        Ok(TypeStats {
            num_duplicates: 0,
            num_output_records: rows,
        })
    }

    /// Write survivors across `num_shards` part files with Snappy and the
    /// configured row-group byte budget.
    fn write_shards(&self, table: &str, merged: &RecordBatch) -> Result<()> {
        let out_dir = self.config.output.join(table);
        fs::create_dir_all(&out_dir)?;

        let rows = merged.num_rows();
        let shards = self.config.num_shards.max(1).min(rows);
        let base = rows / shards;
        let remainder = rows % shards;

        let mut offset = 0;
        for shard in 0..shards {
            let len = base + usize::from(shard < remainder);
            if len == 0 {
                continue;
            }
            let chunk = merged.slice(offset, len);
            offset += len;

            let path = out_dir.join(format!("part-{shard:05}.parquet"));
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .build();
            let mut writer =
                ArrowWriter::try_new(File::create(&path)?, merged.schema(), Some(props))?;
            let mut written = 0;
            while written < chunk.num_rows() {
                let step = WRITE_CHUNK_ROWS.min(chunk.num_rows() - written);
                writer.write(&chunk.slice(written, step))?;
                written += step;
                if writer.in_progress_size() >= self.config.row_group_bytes {
                    writer.flush()?;
                }
            }
            writer.close()?;
        }
        Ok(())
    }

    fn write_types_file(&self, report: &MergeReport) -> Result<()> {
        fs::create_dir_all(&self.config.output)?;
        let mut file = File::create(self.config.output.join(TYPES_FILE))?;
        for (table, stats) in &report.tables {
            if stats.num_output_records > 0 {
                writeln!(file, "{table}")?;
            }
        }
        Ok(())
    }
}

struct RowKey {
    id: String,
    last_updated: String,
    tombstone: bool,
}

/// Column accessors for one batch, resolved once per batch.
struct KeyReader<'a> {
    table: &'a str,
    ids: &'a StringArray,
    last_updated: &'a StringArray,
    tags: Option<&'a ListArray>,
}

impl<'a> KeyReader<'a> {
    fn new(table: &'a str, batch: &'a RecordBatch, mode: &KeyMode) -> Result<Self> {
        match mode {
            KeyMode::Resource => {
                let ids = utf8_column(table, batch, COL_ID)?;
                let meta = batch
                    .column_by_name(COL_META)
                    .and_then(|c| c.as_any().downcast_ref::<StructArray>())
                    .ok_or_else(|| MergeError::missing_column(table, COL_META))?;
                let last_updated = meta
                    .column_by_name(COL_LAST_UPDATED)
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .ok_or_else(|| MergeError::missing_column(table, COL_LAST_UPDATED))?;
                let tags = meta
                    .column_by_name(COL_TAG)
                    .and_then(|c| c.as_any().downcast_ref::<ListArray>());
                Ok(Self {
                    table,
                    ids,
                    last_updated,
                    tags,
                })
            }
            KeyMode::View => Ok(Self {
                table,
                ids: utf8_column(table, batch, VIEW_COL_ID)?,
                last_updated: utf8_column(table, batch, VIEW_COL_LAST_UPDATED)?,
                tags: None,
            }),
        }
    }

    fn key(&self, row: usize) -> Result<RowKey> {
        if self.ids.is_null(row) {
            return Err(MergeError::MissingId {
                table: self.table.to_string(),
                row,
            });
        }
        let id = self.ids.value(row).to_string();

        if self.last_updated.is_null(row) {
            return Err(MergeError::MissingLastUpdated {
                table: self.table.to_string(),
                id,
            });
        }
        let last_updated = self.last_updated.value(row).to_string();

        Ok(RowKey {
            tombstone: self.is_tombstone(row),
            id,
            last_updated,
        })
    }

    fn is_tombstone(&self, row: usize) -> bool {
        let Some(tags) = self.tags else {
            return false;
        };
        if tags.is_null(row) {
            return false;
        }
        let entries = tags.value(row);
        let Some(entries) = entries.as_any().downcast_ref::<StructArray>() else {
            return false;
        };
        let (Some(systems), Some(codes)) = (
            entries
                .column_by_name(COL_TAG_SYSTEM)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>()),
            entries
                .column_by_name(COL_TAG_CODE)
                .and_then(|c| c.as_any().downcast_ref::<StringArray>()),
        ) else {
            return false;
        };
        (0..entries.len()).any(|i| {
            !systems.is_null(i)
                && !codes.is_null(i)
                && systems.value(i) == REMOVE_TAG_SYSTEM
                && codes.value(i) == REMOVE_TAG_CODE
        })
    }
}

fn utf8_column<'a>(table: &str, batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| MergeError::missing_column(table, name))
}

fn take_batch(batch: &RecordBatch, indices: &[u32]) -> Result<RecordBatch> {
    let indices = UInt32Array::from(indices.to_vec());
    let columns = batch
        .columns()
        .iter()
        .map(|column| take(column.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}
