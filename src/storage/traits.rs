//! Storage traits and error types
//!
//! This module defines the trait interface for the two persistence units of a
//! crawl (checkpoint and dataset) and their shared error type.

use crate::record::FlatRow;
use crate::storage::Checkpoint;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Checkpoint IO error at {}: {source}", path.display())]
    CheckpointIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Dataset IO error at {}: {source}", path.display())]
    DatasetIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupt checkpoint at {}: {message}", path.display())]
    CorruptCheckpoint { path: PathBuf, message: String },

    #[error("CSV error in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Unknown column: {0}")]
    UnknownColumn(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a dataset flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// Rows written
    pub rows: u64,

    /// Columns in the written header
    pub columns: usize,
}

/// Durable record of the last completed page
///
/// Implementations must replace the stored checkpoint atomically: after a
/// crash, `load` returns either the previous checkpoint or the new one, never
/// a partial record.
pub trait CheckpointStore: Send {
    /// Loads the stored checkpoint, if one exists
    fn load(&self) -> StorageResult<Option<Checkpoint>>;

    /// Overwrites the stored checkpoint
    fn save(&mut self, checkpoint: &Checkpoint) -> StorageResult<()>;

    /// Removes the stored checkpoint
    fn clear(&mut self) -> StorageResult<()>;

    /// Where the checkpoint lives, for log messages
    fn location(&self) -> &Path;
}

/// Materialized table of every row collected for a target
pub trait DatasetStore: Send {
    /// Loads previously written rows (empty if nothing was written yet)
    fn load(&self) -> StorageResult<Vec<FlatRow>>;

    /// Rewrites the table as `existing ∪ new` with the union of their columns
    ///
    /// Columns appear in first-seen order; cells a row lacks are written as null.
    /// The previous table must stay intact if the write fails.
    fn flush(&mut self, existing: &[FlatRow], new: &[FlatRow]) -> StorageResult<WriteResult>;

    /// Removes the table
    fn clear(&mut self) -> StorageResult<()>;

    /// Where the table lives, for log messages
    fn location(&self) -> &Path;
}
