use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Harvest
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The site being harvested and where its listings live
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetConfig {
    /// Search URL; may carry a `{page}` (or `{}`) placeholder as the `page` query value
    pub base_url: String,

    /// Identifier of the element carrying the JSON data island
    #[serde(default = "default_element_id")]
    pub element_id: String,

    /// Key path from the document root to the listings array
    #[serde(default = "default_json_path")]
    pub json_path: Vec<String>,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpConfig {
    /// Browser-like User-Agent; the target rejects obvious bots
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept")]
    pub accept: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// Total request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Refuse plain-HTTP URLs
    #[serde(default)]
    pub https_only: bool,

    /// Additional headers sent with every request
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

/// Retry, circuit breaker and pacing configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlConfig {
    /// Attempts per page before the page counts as failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for linear backoff between attempts (milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Consecutive failed pages that trip the circuit breaker
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Pause after the breaker trips (seconds)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Stop after this many cooldowns without a successful page; unlimited when unset
    #[serde(default)]
    pub max_cooldowns: Option<u32>,

    /// Polite delay between pages (milliseconds)
    #[serde(default = "default_inter_page_delay_ms")]
    pub inter_page_delay_ms: u64,

    /// Highest page number that will be requested
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// Extra fetches of an empty page before it is accepted as the end of results
    #[serde(default)]
    pub empty_page_retries: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the CSV dataset
    #[serde(default = "default_dataset_path")]
    pub dataset_path: PathBuf,

    /// Path to the checkpoint file; derived from the dataset path when unset
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,

    /// Separator joining nested keys into column names
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Rows missing a value for any of these columns are dropped
    #[serde(default)]
    pub require_columns: Vec<String>,
}

impl Config {
    /// Builds a configuration with defaults everywhere except the target URL
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            target: TargetConfig {
                base_url: base_url.into(),
                element_id: default_element_id(),
                json_path: default_json_path(),
            },
            http: HttpConfig::default(),
            crawl: CrawlConfig::default(),
            output: OutputConfig::default(),
        }
    }

    /// Checkpoint location, next to the dataset unless configured explicitly
    ///
    /// `listings.csv` gets `listings.checkpoint.json` in the same directory.
    pub fn checkpoint_path(&self) -> PathBuf {
        if let Some(path) = &self.output.checkpoint_path {
            return path.clone();
        }

        let dataset = &self.output.dataset_path;
        let stem = dataset
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        dataset.with_file_name(format!("{}.checkpoint.json", stem))
    }
}

impl CrawlConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            accept: default_accept(),
            accept_language: default_accept_language(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            https_only: false,
            extra_headers: BTreeMap::new(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            max_consecutive_failures: default_max_consecutive_failures(),
            cooldown_secs: default_cooldown_secs(),
            max_cooldowns: None,
            inter_page_delay_ms: default_inter_page_delay_ms(),
            max_pages: default_max_pages(),
            empty_page_retries: 0,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dataset_path: default_dataset_path(),
            checkpoint_path: None,
            separator: default_separator(),
            require_columns: Vec::new(),
        }
    }
}

fn default_element_id() -> String {
    "__NEXT_DATA__".to_string()
}

fn default_json_path() -> Vec<String> {
    ["props", "pageProps", "searchResult", "listings"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/93.0.4577.82 Safari/537.36"
        .to_string()
}

fn default_accept() -> String {
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string()
}

fn default_accept_language() -> String {
    "en-US,en;q=0.9".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_inter_page_delay_ms() -> u64 {
    1_000
}

fn default_max_pages() -> u32 {
    10_000
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("listings.csv")
}

fn default_separator() -> String {
    ".".to_string()
}
