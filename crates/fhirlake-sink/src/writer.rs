//! The per-resource-type Parquet file writer.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::datatypes::SchemaRef;
use arrow::json::reader::{Decoder, ReaderBuilder};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;

/// Owns the open part file for one resource type plus the JSON decoder
/// feeding it. Rows buffer in the decoder and flush to a row group in
/// batches; once a part file's flushed bytes pass the row-group budget it
/// rotates to the next `part-NNNNN.parquet`. Part files open lazily, so a
/// rotation never leaves an empty trailing file behind.
pub struct TypeWriter {
    resource_type: String,
    schema: SchemaRef,
    dir: PathBuf,
    row_group_bytes: usize,
    batch_rows: usize,

    writer: Option<ArrowWriter<File>>,
    decoder: Decoder,
    part_index: u32,
    buffered_rows: usize,
    rows_written: u64,
}

impl TypeWriter {
    pub fn create(
        resource_type: &str,
        schema: SchemaRef,
        dir: PathBuf,
        row_group_bytes: usize,
        batch_rows: usize,
    ) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        let decoder = new_decoder(&schema)?;
        debug!(resource_type, dir = %dir.display(), "created parquet type writer");
        Ok(Self {
            resource_type: resource_type.to_string(),
            schema,
            dir,
            row_group_bytes,
            batch_rows,
            writer: None,
            decoder,
            part_index: 0,
            buffered_rows: 0,
            rows_written: 0,
        })
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Append one decoded row. The caller guarantees the value matches the
    /// writer's resource type.
    pub fn append(&mut self, row: &Value) -> Result<()> {
        self.decoder.serialize(std::slice::from_ref(row))?;
        self.buffered_rows += 1;
        self.rows_written += 1;
        if self.buffered_rows >= self.batch_rows {
            self.flush_buffered()?;
        }
        Ok(())
    }

    /// Drain the decoder into the current part file, then flush/rotate on
    /// the byte thresholds.
    fn flush_buffered(&mut self) -> Result<()> {
        if self.buffered_rows == 0 {
            return Ok(());
        }
        let Some(batch) = self.decoder.flush()? else {
            self.buffered_rows = 0;
            return Ok(());
        };
        self.buffered_rows = 0;
        trace!(
            resource_type = %self.resource_type,
            rows = batch.num_rows(),
            "writing record batch"
        );

        if self.writer.is_none() {
            self.writer = Some(open_part(
                &self.dir,
                self.part_index,
                &self.schema,
            )?);
        }
        let writer = self
            .writer
            .as_mut()
            .expect("part writer was just opened");
        writer.write(&batch)?;

        if writer.in_progress_size() >= self.row_group_bytes {
            writer.flush()?;
        }
        let flushed: usize = writer
            .flushed_row_groups()
            .iter()
            .map(|rg| rg.compressed_size().max(0) as usize)
            .sum();
        if flushed >= self.row_group_bytes
            && let Some(full) = self.writer.take()
        {
            full.close()?;
            self.part_index += 1;
            debug!(
                resource_type = %self.resource_type,
                next_part = self.part_index,
                "rotated parquet part file"
            );
        }
        Ok(())
    }

    /// Flush buffered rows and close the open part file, if any. Consumes
    /// the writer; the sink drops it afterwards.
    pub fn finish(mut self) -> Result<u64> {
        self.flush_buffered()?;
        if let Some(writer) = self.writer.take() {
            writer.close()?;
        }
        Ok(self.rows_written)
    }
}

pub fn part_file_name(index: u32) -> String {
    format!("part-{index:05}.parquet")
}

fn open_part(dir: &Path, index: u32, schema: &SchemaRef) -> Result<ArrowWriter<File>> {
    let path = dir.join(part_file_name(index));
    let file = File::create(&path)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    Ok(ArrowWriter::try_new(file, schema.clone(), Some(props))?)
}

fn new_decoder(schema: &SchemaRef) -> Result<Decoder> {
    Ok(ReaderBuilder::new(schema.clone())
        .with_strict_mode(false)
        .build_decoder()?)
}
