//! CSV dataset
//!
//! The dataset is rewritten in full on every flush so the header always
//! covers every column seen so far, even when later pages introduce new keys.

use crate::record::{normalize_scalar, FlatRow};
use crate::storage::atomic::{remove_if_exists, write_atomically};
use crate::storage::{DatasetStore, StorageError, StorageResult, WriteResult};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Dataset stored as a CSV file with a header row
#[derive(Debug, Clone)]
pub struct CsvDatasetStore {
    path: PathBuf,
}

impl CsvDatasetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetStore for CsvDatasetStore {
    fn load(&self) -> StorageResult<Vec<FlatRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_rows(&self.path)
    }

    fn flush(&mut self, existing: &[FlatRow], new: &[FlatRow]) -> StorageResult<WriteResult> {
        let columns = union_columns(existing.iter().chain(new));
        let rows = existing.iter().chain(new);

        write_table(&self.path, &columns, rows)?;

        let result = WriteResult {
            rows: (existing.len() + new.len()) as u64,
            columns: columns.len(),
        };
        tracing::debug!(
            "Dataset written to {}: {} rows, {} columns",
            self.path.display(),
            result.rows,
            result.columns
        );
        Ok(result)
    }

    fn clear(&mut self) -> StorageResult<()> {
        remove_if_exists(&self.path).map_err(|source| StorageError::DatasetIo {
            path: self.path.clone(),
            source,
        })
    }

    fn location(&self) -> &Path {
        &self.path
    }
}

/// Collects the column names of all rows, in first-seen order
pub fn union_columns<'a>(rows: impl IntoIterator<Item = &'a FlatRow>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();

    for row in rows {
        for key in row.keys() {
            if seen.insert(key) {
                columns.push(key.to_string());
            }
        }
    }

    columns
}

/// Renders one cell as CSV text
///
/// | Value | Text |
/// |-------|------|
/// | null | empty |
/// | bool | `true` / `false` |
/// | number | JSON number |
/// | string | as-is |
/// | sequence / mapping | compact JSON |
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Writes a copy of a dataset restricted to the given columns, in that order
///
/// # Returns
///
/// * `Ok(u64)` - Number of rows exported
/// * `Err(StorageError::UnknownColumn)` - A requested column is not in the dataset
pub fn export_columns(source: &Path, columns: &[String], destination: &Path) -> StorageResult<u64> {
    let rows = CsvDatasetStore::new(source).load()?;
    let available = union_columns(&rows);

    if let Some(missing) = columns.iter().find(|c| !available.contains(*c)) {
        return Err(StorageError::UnknownColumn(missing.clone()));
    }

    write_table(destination, columns, rows.iter())?;

    tracing::info!(
        "Exported {} rows x {} columns to {}",
        rows.len(),
        columns.len(),
        destination.display()
    );
    Ok(rows.len() as u64)
}

/// Reads a CSV table back into rows
///
/// Empty cells (and `NaN` sentinels) load as null, every other cell as a string.
fn read_rows(path: &Path) -> StorageResult<Vec<FlatRow>> {
    let csv_error = |source| StorageError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers = reader.headers().map_err(csv_error)?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row: FlatRow = headers
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let cell = match record.get(i) {
                    Some(text) if !text.is_empty() => {
                        normalize_scalar(Value::String(text.to_string()))
                    }
                    _ => Value::Null,
                };
                (column.to_string(), cell)
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Writes rows under a fixed header, atomically replacing `path`
fn write_table<'a>(
    path: &Path,
    columns: &[String],
    rows: impl Iterator<Item = &'a FlatRow>,
) -> StorageResult<()> {
    write_atomically(path, |file| {
        // A table without columns is an empty file
        if columns.is_empty() {
            return Ok(());
        }

        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(columns)?;

        for row in rows {
            let record = columns
                .iter()
                .map(|column| row.get(column).map(render_cell).unwrap_or_default());
            writer.write_record(record)?;
        }

        writer.flush()?;
        Ok(())
    })
    .map_err(|source| StorageError::DatasetIo {
        path: path.to_path_buf(),
        source,
    })
}
