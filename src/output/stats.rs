//! Statistics about a harvested dataset
//!
//! This module reads the checkpoint and dataset files of a crawl target and
//! summarizes them for the `--stats` mode.

use crate::config::{target_id, Config};
use crate::crawler::CrawlReport;
use crate::storage::{open_stores, union_columns, Checkpoint, CheckpointStore, DatasetStore};
use crate::Result;
use std::path::PathBuf;

/// How many rows carry a value for one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFill {
    pub name: String,
    pub filled: u64,
}

/// Dataset and checkpoint summary
#[derive(Debug, Clone)]
pub struct DatasetStatistics {
    pub dataset_path: PathBuf,
    pub checkpoint_path: PathBuf,

    /// Rows in the dataset
    pub total_rows: u64,

    /// Every column, in header order
    pub columns: Vec<ColumnFill>,

    /// Stored checkpoint, if any
    pub checkpoint: Option<Checkpoint>,

    /// Identity of the configured crawl target
    pub target_id: String,
}

impl DatasetStatistics {
    /// Returns true if a checkpoint exists for the configured target
    pub fn checkpoint_matches(&self) -> bool {
        self.checkpoint
            .as_ref()
            .is_some_and(|checkpoint| checkpoint.belongs_to(&self.target_id))
    }

    /// Page the next crawl would start from
    ///
    /// A checkpoint left by a different target is ignored, as a crawl would.
    pub fn next_page(&self) -> u32 {
        match &self.checkpoint {
            Some(checkpoint) if self.checkpoint_matches() => checkpoint.last_page.max(1),
            _ => 1,
        }
    }
}

/// Loads statistics for the files named by a config
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(DatasetStatistics)` - Summary (empty if nothing was crawled yet)
/// * `Err(HarvestError)` - A file exists but could not be read
pub fn load_statistics(config: &Config) -> Result<DatasetStatistics> {
    let (checkpoints, dataset) = open_stores(config);

    let checkpoint = checkpoints.load()?;
    let rows = dataset.load()?;

    let columns = union_columns(&rows)
        .into_iter()
        .map(|name| {
            let filled = rows.iter().filter(|row| row.has_value(&name)).count() as u64;
            ColumnFill { name, filled }
        })
        .collect();

    Ok(DatasetStatistics {
        dataset_path: dataset.location().to_path_buf(),
        checkpoint_path: checkpoints.location().to_path_buf(),
        total_rows: rows.len() as u64,
        columns,
        checkpoint,
        target_id: target_id(&config.target.base_url),
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &DatasetStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Checkpoint: {}", stats.checkpoint_path.display());
    match &stats.checkpoint {
        Some(checkpoint) if !stats.checkpoint_matches() => {
            println!(
                "  (left by a different target, saved at {}; next crawl starts at page 1)",
                checkpoint.timestamp
            );
        }
        Some(checkpoint) => {
            println!("  Next page: {}", checkpoint.last_page);
            println!("  Saved at: {}", checkpoint.timestamp);
            if let Some(rows) = checkpoint.rows {
                println!("  Rows confirmed: {}", rows);
            }
        }
        None => println!("  (none, next crawl starts at page 1)"),
    }
    println!();

    println!("Dataset: {}", stats.dataset_path.display());
    println!("  Rows: {}", stats.total_rows);
    println!("  Columns: {}", stats.columns.len());
    println!();

    if !stats.columns.is_empty() {
        println!("Column Fill:");
        for column in &stats.columns {
            let percentage = if stats.total_rows > 0 {
                (column.filled as f64 / stats.total_rows as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", column.name, column.filled, percentage);
        }
    }
}

/// Prints the end-of-run summary to stdout
pub fn print_report(report: &CrawlReport) {
    println!("=== Harvest {} ===\n", report.outcome);
    println!("  Reason: {}", report.reason);
    println!("  Pages fetched this run: {}", report.pages_fetched);
    println!("  Rows in dataset: {}", report.total_rows);
    println!("  Next page: {}", report.resume_page);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FlatRow;
    use crate::storage::{CsvDatasetStore, FileCheckpointStore};
    use serde_json::{json, Value};

    fn create_test_config(dir: &tempfile::TempDir) -> Config {
        let mut config = Config::for_base_url("https://example.com/search");
        config.output.dataset_path = dir.path().join("listings.csv");
        config
    }

    #[test]
    fn test_statistics_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let stats = load_statistics(&create_test_config(&dir)).unwrap();

        assert_eq!(stats.total_rows, 0);
        assert!(stats.columns.is_empty());
        assert!(stats.checkpoint.is_none());
        assert_eq!(stats.next_page(), 1);
    }

    #[test]
    fn test_statistics_with_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(&dir);

        let rows: Vec<FlatRow> = vec![
            vec![("id".to_string(), json!(1)), ("price".to_string(), json!(10))],
            vec![("id".to_string(), json!(2)), ("price".to_string(), Value::Null)],
            vec![("id".to_string(), json!(3))],
        ]
        .into_iter()
        .map(|pairs| pairs.into_iter().collect())
        .collect();
        CsvDatasetStore::new(config.output.dataset_path.clone())
            .flush(&[], &rows)
            .unwrap();
        FileCheckpointStore::new(config.checkpoint_path())
            .save(&Checkpoint::new(4, 3, target_id(&config.target.base_url)))
            .unwrap();

        let stats = load_statistics(&config).unwrap();

        assert_eq!(stats.total_rows, 3);
        assert_eq!(stats.next_page(), 4);
        assert_eq!(
            stats.columns,
            vec![
                ColumnFill {
                    name: "id".to_string(),
                    filled: 3
                },
                ColumnFill {
                    name: "price".to_string(),
                    filled: 1
                },
            ]
        );
    }

    #[test]
    fn test_statistics_ignore_other_target_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = create_test_config(&dir);
        FileCheckpointStore::new(config.checkpoint_path())
            .save(&Checkpoint::new(7, 0, "someone-else"))
            .unwrap();

        let stats = load_statistics(&config).unwrap();

        assert!(stats.checkpoint.is_some());
        assert!(!stats.checkpoint_matches());
        assert_eq!(stats.next_page(), 1);
    }
}
