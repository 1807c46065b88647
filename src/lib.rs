//! Sumi-Harvest: a resilient paginated listing harvester
//!
//! This crate fetches search-result pages that carry their listings in an
//! embedded JSON data island, flattens every listing into a tabular row and
//! keeps a checkpointed CSV dataset so that long crawls survive transient
//! failures and process restarts.

pub mod config;
pub mod crawler;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: state::CrawlPhase,
        to: state::CrawlPhase,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Page numbers start at 1, got {0}")]
    InvalidPage(u32),

    #[error("Page placeholder must be the value of the `page` query parameter: {0}")]
    MisplacedPlaceholder(String),
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlOrchestrator, CrawlOutcome, CrawlReport};
pub use record::{FlatRow, Flattener};
pub use state::CrawlPhase;
pub use url::{apply_page, PageRequest};
