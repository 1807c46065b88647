//! Output module for reporting on harvested data
//!
//! This module handles:
//! - Summarizing the dataset and checkpoint of a crawl target
//! - Printing end-of-run reports

pub mod stats;

pub use stats::{load_statistics, print_report, print_statistics, ColumnFill, DatasetStatistics};
