//! Crawler module for fetching and harvesting search pages
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching behind the `PageClient` seam
//! - Data island extraction from page bodies
//! - Retry with linear backoff and failure classification
//! - The consecutive-failure circuit breaker
//! - Overall crawl orchestration, checkpointing and cancellation

mod breaker;
mod client;
mod extractor;
mod fetcher;
mod orchestrator;

#[cfg(test)]
mod scripted;

pub use breaker::{BreakerAction, CircuitBreaker};
pub use client::{build_http_client, PageClient, PageResponse, ReqwestPageClient, TransportError};
pub use extractor::{extract_listings, ExtractError};
pub use fetcher::{FailureReason, FetchOutcome, RetryPolicy, RetryingFetcher};
pub use orchestrator::{CrawlOrchestrator, CrawlOutcome, CrawlProgress, CrawlReport, ProgressEvent};

use crate::config::Config;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Build the HTTP client and open the checkpoint and dataset files
/// 2. Resume from the stored checkpoint (or page 1)
/// 3. Fetch pages in order until the results run out
/// 4. Persist rows and progress after every page
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `cancel` - Token that interrupts the crawl
///
/// # Returns
///
/// * `Ok(CrawlReport)` - How the crawl ended and where it would resume
/// * `Err(HarvestError)` - The crawl could not start
pub async fn crawl(config: Config, cancel: CancellationToken) -> Result<CrawlReport> {
    CrawlOrchestrator::new(config)?.run(cancel).await
}
