//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Only `[target] base-url` is required; every other setting has a default.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting {}", config.target.base_url);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlConfig, HttpConfig, OutputConfig, TargetConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, target_id};
pub use validation::validate;
