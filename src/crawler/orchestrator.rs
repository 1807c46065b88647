//! Crawl orchestration
//!
//! The orchestrator is the only component with a lifecycle. It:
//! - Resumes from the stored checkpoint and dataset
//! - Walks pages strictly in order, one request in flight at a time
//! - Consults the circuit breaker after every page outcome
//! - Flushes the dataset and then saves the checkpoint after every page
//! - Leaves both files consistent on completion, interruption or fatal error

use crate::config::{target_id, Config};
use crate::crawler::breaker::{BreakerAction, CircuitBreaker};
use crate::crawler::client::{PageClient, ReqwestPageClient};
use crate::crawler::fetcher::{FetchOutcome, RetryPolicy, RetryingFetcher};
use crate::record::{FlatRow, Flattener};
use crate::state::{CrawlPhase, CrawlState};
use crate::storage::{open_stores, Checkpoint, CheckpointStore, DatasetStore, StorageResult};
use crate::url::PageRequest;
use crate::{HarvestError, Result};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// How a crawl ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Reached the end of results (or the page limit)
    Completed,

    /// Stopped by the caller
    Interrupted,

    /// Stopped by an unrecoverable condition
    Fatal,
}

impl CrawlOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Interrupted => 130,
            Self::Fatal => 1,
        }
    }
}

impl fmt::Display for CrawlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::Fatal => "fatal",
        };
        write!(f, "{}", s)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,

    /// Why the run ended
    pub reason: String,

    /// Page a restart would fetch first
    pub resume_page: u32,

    /// Rows in the dataset, including rows from earlier runs
    pub total_rows: u64,

    /// Page fetches (successful or not) made during this run
    pub pages_fetched: u32,
}

/// What just happened, as seen by progress observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Nothing has happened yet
    Pending,
    Started,
    PageCompleted { rows: usize },
    PageFailed { reason: String },
    CoolingDown { duration: Duration },
    Finished { outcome: CrawlOutcome },
}

/// Latest progress snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlProgress {
    pub page: u32,
    pub total_rows: u64,

    /// Highest page whose rows are stored (0 before the first page)
    pub last_completed_page: u32,

    /// Failed pages in a row since the last success
    pub consecutive_failures: u32,

    pub event: ProgressEvent,
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self {
            page: 0,
            total_rows: 0,
            last_completed_page: 0,
            consecutive_failures: 0,
            event: ProgressEvent::Pending,
        }
    }
}

/// How the page loop ended: outcome, reason, page to resume from
type LoopEnd = (CrawlOutcome, String, u32);

/// Drives a crawl from checkpoint to completion
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::{Config, CrawlOrchestrator};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> sumi_harvest::Result<()> {
/// let config = Config::for_base_url("https://example.com/search?c=1");
/// let mut orchestrator = CrawlOrchestrator::new(config)?;
/// let report = orchestrator.run(CancellationToken::new()).await?;
/// println!("{} rows, next page {}", report.total_rows, report.resume_page);
/// # Ok(())
/// # }
/// ```
pub struct CrawlOrchestrator<C> {
    config: Config,
    target_id: String,
    fetcher: RetryingFetcher<C>,
    breaker: CircuitBreaker,
    flattener: Flattener,
    checkpoints: Box<dyn CheckpointStore>,
    dataset: Box<dyn DatasetStore>,
    phase: CrawlPhase,
    state: CrawlState,
    progress: watch::Sender<CrawlProgress>,
    pages_fetched: u32,
}

impl CrawlOrchestrator<ReqwestPageClient> {
    /// Creates an orchestrator using HTTP and the files named by the config
    pub fn new(config: Config) -> Result<Self> {
        let client = ReqwestPageClient::new(&config.http)?;
        let (checkpoints, dataset) = open_stores(&config);
        Ok(Self::with_parts(
            config,
            client,
            Box::new(checkpoints),
            Box::new(dataset),
        ))
    }
}

impl<C: PageClient> CrawlOrchestrator<C> {
    /// Creates an orchestrator from explicit collaborators
    pub fn with_parts(
        config: Config,
        client: C,
        checkpoints: Box<dyn CheckpointStore>,
        dataset: Box<dyn DatasetStore>,
    ) -> Self {
        let fetcher = RetryingFetcher::new(
            client,
            RetryPolicy::from_config(&config.crawl),
            &config.target,
        );
        let (progress, _) = watch::channel(CrawlProgress::default());

        Self {
            target_id: target_id(&config.target.base_url),
            breaker: CircuitBreaker::from_config(&config.crawl),
            flattener: Flattener::new(config.output.separator.clone()),
            fetcher,
            checkpoints,
            dataset,
            phase: CrawlPhase::Idle,
            state: CrawlState::default(),
            progress,
            pages_fetched: 0,
            config,
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    /// Subscribes to progress snapshots
    ///
    /// Observers only ever see the latest snapshot; a slow observer never
    /// holds up the crawl.
    pub fn subscribe(&self) -> watch::Receiver<CrawlProgress> {
        self.progress.subscribe()
    }

    /// Deletes the stored checkpoint and dataset so the next run starts at page 1
    pub fn reset_storage(&mut self) -> Result<()> {
        self.checkpoints.clear()?;
        self.dataset.clear()?;
        tracing::info!(
            "Cleared {} and {}",
            self.checkpoints.location().display(),
            self.dataset.location().display()
        );
        Ok(())
    }

    /// Runs the crawl until the results end, the caller cancels, or it gives up
    ///
    /// # Arguments
    ///
    /// * `cancel` - Token that interrupts the crawl at any fetch or wait
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The run ended; see `outcome` for how
    /// * `Err(HarvestError)` - The checkpoint or dataset could not be loaded,
    ///   or the orchestrator was already used
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<CrawlReport> {
        self.transition(CrawlPhase::Resuming)?;
        let start_page = self.resume()?;
        self.emit(start_page, ProgressEvent::Started);

        self.transition(CrawlPhase::Fetching(start_page))?;
        let (outcome, reason, resume_page) = self.crawl_pages(start_page, &cancel).await?;

        self.transition(CrawlPhase::Stopping)?;
        self.finish(resume_page);
        self.transition(CrawlPhase::Stopped)?;

        let report = CrawlReport {
            outcome,
            reason,
            resume_page,
            total_rows: self.state.total_rows(),
            pages_fetched: self.pages_fetched,
        };

        match outcome {
            CrawlOutcome::Completed => tracing::info!(
                "Crawl completed ({}): {} rows in {}",
                report.reason,
                report.total_rows,
                self.dataset.location().display()
            ),
            CrawlOutcome::Interrupted => tracing::warn!(
                "Crawl interrupted; {} rows saved, will resume at page {}",
                report.total_rows,
                report.resume_page
            ),
            CrawlOutcome::Fatal => tracing::error!(
                "Crawl stopped: {}; will resume at page {}",
                report.reason,
                report.resume_page
            ),
        }
        self.emit(resume_page, ProgressEvent::Finished { outcome });

        Ok(report)
    }

    fn transition(&mut self, next: CrawlPhase) -> Result<()> {
        if !self.phase.can_transition_to(&next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!("Phase {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Loads the checkpoint and dataset and returns the first page to fetch
    ///
    /// Dataset rows beyond the checkpoint's confirmed count are dropped, even
    /// when the checkpoint belongs to another target. A checkpoint for another
    /// target contributes only that count; the crawl itself starts at page 1.
    fn resume(&mut self) -> Result<u32> {
        let checkpoint = self.checkpoints.load()?;

        let mut baseline = self.dataset.load()?;
        let rows_on_disk = baseline.len() as u64;

        if let Some(rows) = checkpoint.as_ref().and_then(|c| c.rows) {
            if rows_on_disk > rows {
                tracing::warn!(
                    "Discarding {} rows written after the last checkpoint",
                    rows_on_disk - rows
                );
                baseline.truncate(rows as usize);
            } else if rows_on_disk < rows {
                tracing::warn!(
                    "Dataset holds {} rows but the checkpoint recorded {}",
                    rows_on_disk,
                    rows
                );
            }
        }

        let start_page = match &checkpoint {
            Some(checkpoint) if !checkpoint.belongs_to(&self.target_id) => {
                tracing::warn!(
                    "Ignoring checkpoint at {}: it belongs to a different target",
                    self.checkpoints.location().display()
                );
                1
            }
            Some(checkpoint) => checkpoint.last_page.max(1),
            None => 1,
        };

        self.state = CrawlState::with_baseline(baseline);
        self.state.persisted_rows = rows_on_disk;
        self.state.last_completed_page = start_page - 1;

        if start_page > 1 || rows_on_disk > 0 {
            tracing::info!(
                "Resuming at page {} with {} existing rows",
                start_page,
                self.state.total_rows()
            );
        } else {
            tracing::info!("Starting fresh crawl of {}", self.config.target.base_url);
        }

        Ok(start_page)
    }

    async fn crawl_pages(
        &mut self,
        start_page: u32,
        cancel: &CancellationToken,
    ) -> Result<LoopEnd> {
        let crawl = self.config.crawl.clone();
        let mut page = start_page;

        loop {
            if page > crawl.max_pages {
                return Ok((
                    CrawlOutcome::Completed,
                    format!("page limit {} reached", crawl.max_pages),
                    page,
                ));
            }

            let request = PageRequest::new(self.config.target.base_url.as_str(), page);
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                outcome = self.fetcher.fetch_page(&request) => Some(outcome),
            };
            let Some(fetched) = fetched else {
                return Ok(interrupted(page));
            };

            self.pages_fetched += 1;
            let action = self.breaker.on_outcome(&fetched);
            self.state.consecutive_failures = self.breaker.consecutive_failures();

            match fetched {
                FetchOutcome::Listings(listings) => {
                    self.transition(CrawlPhase::Accumulating(page))?;

                    match self.accept_page(page, &listings) {
                        Ok(rows) => {
                            tracing::info!(
                                "Page {}: {} rows (total {})",
                                page,
                                rows,
                                self.state.total_rows()
                            );
                            self.emit(page, ProgressEvent::PageCompleted { rows });
                        }
                        Err(e) => {
                            return Ok((CrawlOutcome::Fatal, e.to_string(), page));
                        }
                    }

                    page += 1;
                    if !pause(crawl.inter_page_delay(), cancel).await {
                        return Ok(interrupted(page));
                    }
                    self.transition(CrawlPhase::Fetching(page))?;
                }
                FetchOutcome::EmptyPage => {
                    return Ok((
                        CrawlOutcome::Completed,
                        format!("no more listings on page {}", page),
                        page,
                    ));
                }
                FetchOutcome::Failed(reason) => {
                    self.emit(
                        page,
                        ProgressEvent::PageFailed {
                            reason: reason.to_string(),
                        },
                    );

                    match action {
                        BreakerAction::Continue => {
                            tracing::warn!(
                                "Page {} failed ({} in a row): {}",
                                page,
                                self.breaker.consecutive_failures(),
                                reason
                            );
                            if !pause(crawl.inter_page_delay(), cancel).await {
                                return Ok(interrupted(page));
                            }
                            self.transition(CrawlPhase::Fetching(page))?;
                        }
                        BreakerAction::Cooldown(duration) => {
                            self.transition(CrawlPhase::Cooling(page))?;
                            tracing::warn!(
                                "Page {} failed {} times in a row, cooling down for {}s",
                                page,
                                crawl.max_consecutive_failures,
                                duration.as_secs()
                            );
                            self.emit(page, ProgressEvent::CoolingDown { duration });

                            if !pause(duration, cancel).await {
                                return Ok(interrupted(page));
                            }
                            self.breaker.cooldown_elapsed();
                            self.transition(CrawlPhase::Fetching(page))?;
                        }
                        BreakerAction::Stop => {
                            return Ok((
                                CrawlOutcome::Fatal,
                                format!("giving up on page {}: {}", page, reason),
                                page,
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Flattens, filters and persists one page of listings
    ///
    /// On error the page's rows are dropped again, so the in-memory state
    /// matches the last saved checkpoint.
    fn accept_page(&mut self, page: u32, listings: &[Value]) -> StorageResult<usize> {
        let rows: Vec<FlatRow> = self
            .flattener
            .flatten_all(listings)
            .into_iter()
            .filter(|row| self.has_required_columns(row))
            .collect();
        let kept = rows.len();

        let dropped = listings.len() - kept;
        if dropped > 0 {
            tracing::debug!(
                "Page {}: dropped {} rows missing required columns",
                page,
                dropped
            );
        }

        let accumulated_before = self.state.accumulated.len();
        let last_completed_before = self.state.last_completed_page;
        self.state.record_page(page, rows);

        if let Err(e) = self.flush_and_checkpoint(page + 1) {
            self.state.accumulated.truncate(accumulated_before);
            self.state.last_completed_page = last_completed_before;
            return Err(e);
        }

        Ok(kept)
    }

    fn has_required_columns(&self, row: &FlatRow) -> bool {
        self.config
            .output
            .require_columns
            .iter()
            .all(|column| row.has_value(column))
    }

    fn flush_and_checkpoint(&mut self, next_page: u32) -> StorageResult<()> {
        self.flush()?;
        self.save_checkpoint(next_page)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let result = self
            .dataset
            .flush(&self.state.baseline, &self.state.accumulated)?;
        self.state.persisted_rows = result.rows;
        Ok(())
    }

    fn save_checkpoint(&mut self, next_page: u32) -> StorageResult<()> {
        let checkpoint = Checkpoint::new(
            next_page,
            self.state.total_rows(),
            self.target_id.as_str(),
        );
        self.checkpoints.save(&checkpoint)
    }

    /// Brings the dataset and checkpoint in line with the in-memory state
    ///
    /// Errors are logged rather than returned; the files on disk stay at their
    /// last consistent version.
    fn finish(&mut self, resume_page: u32) {
        if self.state.has_unflushed_rows() {
            if let Err(e) = self.flush() {
                tracing::error!("Final dataset flush failed: {}", e);
            }
        }

        if let Err(e) = self.save_checkpoint(resume_page) {
            tracing::error!("Final checkpoint save failed: {}", e);
        }
    }

    fn emit(&self, page: u32, event: ProgressEvent) {
        self.progress.send_replace(CrawlProgress {
            page,
            total_rows: self.state.total_rows(),
            last_completed_page: self.state.last_completed_page,
            consecutive_failures: self.state.consecutive_failures,
            event,
        });
    }
}

fn interrupted(page: u32) -> LoopEnd {
    (CrawlOutcome::Interrupted, "interrupted".to_string(), page)
}

/// Waits for `duration`; returns false if cancelled first
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep(duration) => true,
    }
}
