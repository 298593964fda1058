//! Reading one warehouse table (a directory of part files) back as batches.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::Result;

/// The sorted part files of one table directory. Missing directories read
/// as empty.
pub fn part_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "parquet"))
        .collect();
    files.sort();
    Ok(files)
}

/// Every record batch of one table, in part-file order.
pub fn read_table(dir: &Path) -> Result<Vec<RecordBatch>> {
    let mut batches = Vec::new();
    for path in part_files(dir)? {
        let file = File::open(&path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        for batch in reader {
            batches.push(batch?);
        }
    }
    Ok(batches)
}

/// Subdirectory names of a warehouse root, which are its table set.
pub fn list_tables(root: &Path) -> Result<Vec<String>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }
    let mut tables: Vec<String> = std::fs::read_dir(root)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    tables.sort();
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_dir_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(part_files(&dir.path().join("nope")).unwrap().is_empty());
        assert!(read_table(&dir.path().join("nope")).unwrap().is_empty());
        assert!(list_tables(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_list_tables_ignores_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Patient")).unwrap();
        std::fs::create_dir(dir.path().join("Encounter")).unwrap();
        std::fs::write(dir.path().join("_types.txt"), "Patient\n").unwrap();

        let tables = list_tables(dir.path()).unwrap();
        assert_eq!(tables, vec!["Encounter", "Patient"]);
    }
}
