//! The warehouse sink: one lazy Parquet writer per resource type.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info};

use fhirlake_core::RawResource;
use fhirlake_schema::{COL_RESOURCE_JSON, SchemaRegistry};

use crate::error::{Result, SinkError};
use crate::writer::TypeWriter;

/// Default part-file/row-group byte budget (32 MiB).
pub const DEFAULT_ROW_GROUP_BYTES: usize = 32 * 1024 * 1024;

const DEFAULT_BATCH_ROWS: usize = 1024;

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub root: PathBuf,
    pub row_group_bytes: usize,
    /// Rows buffered in the JSON decoder before a record batch is cut.
    pub batch_rows: usize,
}

impl SinkConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            row_group_bytes: DEFAULT_ROW_GROUP_BYTES,
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    pub fn with_row_group_bytes(mut self, row_group_bytes: usize) -> Self {
        self.row_group_bytes = row_group_bytes;
        self
    }
}

/// A writer slot. A failed writer stays poisoned so later writes to the
/// type fail fast instead of producing a corrupt file.
enum WriterSlot {
    Open(TypeWriter),
    Poisoned,
    Finished,
}

/// Owns every per-type writer of one extraction run.
///
/// `write` may be called from any number of worker tasks; the per-type
/// mutex is the unit of mutual exclusion, so distinct resource types
/// proceed independently. `close_all` observes every write issued before
/// it and is safe to call more than once.
pub struct ParquetSink {
    registry: Arc<SchemaRegistry>,
    config: SinkConfig,
    writers: DashMap<String, Arc<Mutex<WriterSlot>>>,
    counts: DashMap<String, u64>,
    closed: AtomicBool,
}

impl ParquetSink {
    pub fn new(registry: Arc<SchemaRegistry>, config: SinkConfig) -> Self {
        Self {
            registry,
            config,
            writers: DashMap::new(),
            counts: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The deterministic output directory for a resource type.
    pub fn resource_path(&self, resource_type: &str) -> PathBuf {
        self.config.root.join(resource_type)
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Append one resource to its type's current part file.
    pub async fn write(&self, resource: &RawResource) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let resource_type = resource.require_resource_type()?.to_string();
        resource.require_id()?;

        let slot = self.writer_slot(&resource_type)?;
        let mut guard = slot.lock().await;
        match &mut *guard {
            WriterSlot::Open(writer) => {
                let row = sink_row(resource);
                match writer.append(&row) {
                    Ok(()) => {
                        *self.counts.entry(resource_type).or_insert(0) += 1;
                        Ok(())
                    }
                    Err(e) => {
                        error!(resource_type = %resource_type, error = %e, "parquet writer failed, poisoning type");
                        *guard = WriterSlot::Poisoned;
                        Err(e)
                    }
                }
            }
            WriterSlot::Poisoned => Err(SinkError::TypePoisoned(resource_type)),
            WriterSlot::Finished => Err(SinkError::Closed),
        }
    }

    fn writer_slot(&self, resource_type: &str) -> Result<Arc<Mutex<WriterSlot>>> {
        if let Some(slot) = self.writers.get(resource_type) {
            return Ok(slot.clone());
        }
        // Resolve the schema outside the map entry to keep shard lock
        // hold times short.
        let schema = self.registry.schema_for(resource_type)?;
        let writer = TypeWriter::create(
            resource_type,
            schema,
            self.resource_path(resource_type),
            self.config.row_group_bytes,
            self.config.batch_rows,
        )?;
        let slot = self
            .writers
            .entry(resource_type.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(WriterSlot::Open(writer))));
        Ok(slot.clone())
    }

    /// Flush and close every writer. Later writes fail with
    /// [`SinkError::Closed`]. Every writer is closed even when one fails;
    /// the first failure is returned.
    pub async fn close_all(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);

        let slots: Vec<(String, Arc<Mutex<WriterSlot>>)> = self
            .writers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut first_error = None;
        for (resource_type, slot) in slots {
            let mut guard = slot.lock().await;
            let state = std::mem::replace(&mut *guard, WriterSlot::Finished);
            if let WriterSlot::Open(writer) = state {
                match writer.finish() {
                    Ok(rows) => info!(resource_type = %resource_type, rows, "closed parquet writer"),
                    Err(e) => {
                        error!(resource_type = %resource_type, error = %e, "failed to close parquet writer");
                        first_error.get_or_insert(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Rows written so far, per resource type.
    pub fn written_counts(&self) -> HashMap<String, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Resource types that received at least one record.
    pub fn non_empty_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .counts
            .iter()
            .filter(|entry| *entry.value() > 0)
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }
}

/// The row handed to the Arrow JSON decoder: the resource document itself
/// plus the full document serialized into the `resource_json` column.
fn sink_row(resource: &RawResource) -> Value {
    let mut row = resource.as_value().clone();
    let raw = resource.as_value().to_string();
    row.as_object_mut()
        .expect("RawResource is always a JSON object")
        .insert(COL_RESOURCE_JSON.to_string(), Value::String(raw));
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    use arrow::array::{Array as _, StringArray, StructArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use serde_json::json;

    use fhirlake_core::FhirVersion;

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::new(FhirVersion::R4, None, 1).unwrap())
    }

    fn patient(id: &str, last_updated: &str) -> RawResource {
        RawResource::new(json!({
            "resourceType": "Patient",
            "id": id,
            "meta": {"versionId": "1", "lastUpdated": last_updated},
            "gender": "other"
        }))
        .unwrap()
    }

    fn read_all(path: &Path) -> Vec<arrow::record_batch::RecordBatch> {
        let mut batches = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        entries.sort();
        for part in entries {
            let file = File::open(part).unwrap();
            let reader = ParquetRecordBatchReaderBuilder::try_new(file)
                .unwrap()
                .build()
                .unwrap();
            for batch in reader {
                batches.push(batch.unwrap());
            }
        }
        batches
    }

    #[tokio::test]
    async fn test_layout_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ParquetSink::new(registry(), SinkConfig::new(dir.path()));

        sink.write(&patient("p1", "2024-01-01T00:00:00Z")).await.unwrap();
        sink.write(&patient("p2", "2024-01-02T00:00:00Z")).await.unwrap();
        sink.write(
            &RawResource::new(json!({
                "resourceType": "Observation",
                "id": "o1",
                "meta": {"lastUpdated": "2024-01-03T00:00:00Z"}
            }))
            .unwrap(),
        )
        .await
        .unwrap();
        sink.close_all().await.unwrap();

        assert!(dir.path().join("Patient/part-00000.parquet").exists());
        assert!(dir.path().join("Observation/part-00000.parquet").exists());

        let batches = read_all(&dir.path().join("Patient"));
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 2);

        let batch = &batches[0];
        let ids = batch
            .column_by_name("id")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(ids.value(0), "p1");

        let meta = batch
            .column_by_name("meta")
            .unwrap()
            .as_any()
            .downcast_ref::<StructArray>()
            .unwrap();
        let last_updated = meta
            .column_by_name("lastUpdated")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(last_updated.value(0), "2024-01-01T00:00:00Z");
        let version = meta
            .column_by_name("versionId")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(version.value(0), "1");

        // The full document survives in resource_json.
        let raw = batch
            .column_by_name("resource_json")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(raw.value(0)).unwrap();
        assert_eq!(parsed, *patient("p1", "2024-01-01T00:00:00Z").as_value());
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ParquetSink::new(registry(), SinkConfig::new(dir.path()));
        sink.write(&patient("p1", "2024-01-01T00:00:00Z")).await.unwrap();
        sink.close_all().await.unwrap();

        let err = sink
            .write(&patient("p2", "2024-01-01T00:00:00Z"))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[tokio::test]
    async fn test_close_all_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ParquetSink::new(registry(), SinkConfig::new(dir.path()));
        sink.write(&patient("p1", "2024-01-01T00:00:00Z")).await.unwrap();
        sink.close_all().await.unwrap();
        sink.close_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_rotation_on_row_group_budget() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SinkConfig::new(dir.path()).with_row_group_bytes(1);
        config.batch_rows = 1;
        let sink = ParquetSink::new(registry(), config);

        for i in 0..3 {
            sink.write(&patient(&format!("p{i}"), "2024-01-01T00:00:00Z"))
                .await
                .unwrap();
        }
        sink.close_all().await.unwrap();

        let mut parts: Vec<_> = std::fs::read_dir(dir.path().join("Patient"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        parts.sort();
        assert_eq!(
            parts,
            vec![
                "part-00000.parquet",
                "part-00001.parquet",
                "part-00002.parquet"
            ]
        );

        let total: usize = read_all(&dir.path().join("Patient"))
            .iter()
            .map(|b| b.num_rows())
            .sum();
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn test_missing_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ParquetSink::new(registry(), SinkConfig::new(dir.path()));
        let no_id = RawResource::new(json!({"resourceType": "Patient"})).unwrap();
        assert!(matches!(
            sink.write(&no_id).await,
            Err(SinkError::InvalidResource(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(ParquetSink::new(registry(), SinkConfig::new(dir.path())));

        let mut handles = Vec::new();
        for task in 0..4 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let ty = if i % 2 == 0 { "Patient" } else { "Encounter" };
                    let resource = RawResource::new(json!({
                        "resourceType": ty,
                        "id": format!("t{task}-r{i}"),
                        "meta": {"lastUpdated": "2024-01-01T00:00:00Z"}
                    }))
                    .unwrap();
                    sink.write(&resource).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        sink.close_all().await.unwrap();

        let counts = sink.written_counts();
        assert_eq!(counts["Patient"], 52);
        assert_eq!(counts["Encounter"], 48);
        assert_eq!(sink.non_empty_types(), vec!["Encounter", "Patient"]);
    }
}
