//! Page fetching with bounded retries
//!
//! This module turns one page request into one classified outcome:
//! - Fetching the page through a [`PageClient`]
//! - Extracting the listings from the page's data island
//! - Retrying transient failures with linear backoff
//! - Telling an empty result page apart from a failed one

use crate::config::{CrawlConfig, TargetConfig};
use crate::crawler::client::{PageClient, TransportError};
use crate::crawler::extractor::{extract_listings, ExtractError};
use crate::url::PageRequest;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;

/// Why a page could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Network-level failure (timeout, refused connection, truncated body)
    Transport(TransportError),

    /// The server answered with a non-2xx status
    Http { status: u16 },

    /// The page arrived but its listings could not be extracted
    Parse(ExtractError),
}

impl FailureReason {
    /// Short label used in progress events and reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Http { .. } => "http",
            Self::Parse(_) => "parse",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{}", e),
            Self::Http { status } => write!(f, "HTTP {}", status),
            Self::Parse(e) => write!(f, "{}", e),
        }
    }
}

/// Classified result of fetching one page
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The page carried at least one listing
    Listings(Vec<Value>),

    /// The page was fetched and parsed but the listings array was empty
    EmptyPage,

    /// Every attempt failed; holds the reason of the last one
    Failed(FailureReason),
}

/// How often and how patiently a page is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per page before it counts as failed
    pub max_retries: u32,

    /// Base delay; attempt `n` is followed by a wait of `n * retry_delay`
    pub retry_delay: Duration,

    /// Extra fetches of an empty page before accepting it as the end of results
    pub empty_page_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            empty_page_retries: config.empty_page_retries,
        }
    }

    /// Wait after the given (1-based) attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}

/// Fetches pages and extracts their listings, retrying transient failures
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | Non-empty listings | Return `Listings` |
/// | Empty listings | Return `EmptyPage` (after `empty_page_retries` re-checks) |
/// | Non-2xx status | Retry, then `Failed(Http)` |
/// | Missing data island, bad JSON, wrong path | Retry, then `Failed(Parse)` |
/// | Timeout, connection error | Retry, then `Failed(Transport)` |
///
/// No wait follows the final attempt. The fetcher keeps no state between pages.
pub struct RetryingFetcher<C> {
    client: C,
    policy: RetryPolicy,
    element_id: String,
    json_path: Vec<String>,
}

impl<C: PageClient> RetryingFetcher<C> {
    pub fn new(client: C, policy: RetryPolicy, target: &TargetConfig) -> Self {
        Self {
            client,
            policy,
            element_id: target.element_id.clone(),
            json_path: target.json_path.clone(),
        }
    }

    /// Fetches one page and classifies the result
    ///
    /// # Arguments
    ///
    /// * `request` - The page to fetch
    ///
    /// # Returns
    ///
    /// The classified outcome; this never fails outright
    pub async fn fetch_page(&self, request: &PageRequest) -> FetchOutcome {
        let page = request.page_number;
        let url = match request.url() {
            Ok(url) => url,
            Err(e) => {
                return FetchOutcome::Failed(FailureReason::Transport(TransportError::Other {
                    url: request.base_url.clone(),
                    message: e.to_string(),
                }))
            }
        };

        let mut failures = 0;
        let mut empty_checks = 0;

        loop {
            match self.attempt(&url).await {
                Ok(listings) if !listings.is_empty() => {
                    tracing::debug!("Page {}: {} listings", page, listings.len());
                    return FetchOutcome::Listings(listings);
                }
                Ok(_) if empty_checks >= self.policy.empty_page_retries => {
                    tracing::debug!("Page {}: no listings", page);
                    return FetchOutcome::EmptyPage;
                }
                Ok(_) => {
                    empty_checks += 1;
                    tracing::info!(
                        "Page {} came back empty, checking again ({}/{})",
                        page,
                        empty_checks,
                        self.policy.empty_page_retries
                    );
                    sleep(self.policy.backoff(empty_checks)).await;
                }
                Err(reason) => {
                    failures += 1;
                    tracing::warn!(
                        "Attempt {}/{} for page {} failed: {}",
                        failures,
                        self.policy.max_retries,
                        page,
                        reason
                    );

                    if failures >= self.policy.max_retries {
                        return FetchOutcome::Failed(reason);
                    }
                    sleep(self.policy.backoff(failures)).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<Vec<Value>, FailureReason> {
        let response = self
            .client
            .fetch(url)
            .await
            .map_err(FailureReason::Transport)?;

        if !response.is_success() {
            return Err(FailureReason::Http {
                status: response.status,
            });
        }

        extract_listings(&response.body, &self.element_id, &self.json_path)
            .map_err(FailureReason::Parse)
    }
}
