//! Storage module for persisting crawl progress
//!
//! This module handles everything the crawler writes to disk, including:
//! - The JSON checkpoint recording the next page to fetch
//! - The CSV dataset holding every flattened listing
//! - Atomic replace-on-write for both files
//! - Column-subset export of a finished dataset

mod atomic;
mod checkpoint;
mod dataset;
mod traits;

pub use checkpoint::{Checkpoint, FileCheckpointStore};
pub use dataset::{export_columns, render_cell, union_columns, CsvDatasetStore};
pub use traits::{CheckpointStore, DatasetStore, StorageError, StorageResult, WriteResult};

use crate::config::Config;

/// Opens the file-backed checkpoint and dataset stores named by a config
///
/// Nothing is read or created until the stores are used.
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// The checkpoint store and the dataset store, in that order
pub fn open_stores(config: &Config) -> (FileCheckpointStore, CsvDatasetStore) {
    (
        FileCheckpointStore::new(config.checkpoint_path()),
        CsvDatasetStore::new(config.output.dataset_path.clone()),
    )
}
