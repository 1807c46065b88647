use crate::config::CrawlConfig;
use crate::crawler::fetcher::FetchOutcome;
use std::time::Duration;

/// What the orchestrator should do after a page outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerAction {
    /// Carry on (next page after a success, same page after a failure)
    Continue,

    /// Pause for the given duration, then retry the same page
    Cooldown(Duration),

    /// End the crawl
    Stop,
}

/// Consecutive-failure circuit breaker
///
/// Counts failed pages in a row. Reaching `max_consecutive_failures` asks for
/// a cooldown; the count starts over once the cooldown has elapsed. A page
/// with listings resets everything. An empty page is not a failure: it ends
/// the crawl without touching the counter.
///
/// With `max_cooldowns` set, the breaker gives up (`Stop`) instead of
/// starting another cooldown once that many have passed without a success.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    max_consecutive_failures: u32,
    cooldown: Duration,
    max_cooldowns: Option<u32>,
    consecutive_failures: u32,
    cooldowns_without_success: u32,
}

impl CircuitBreaker {
    pub fn new(max_consecutive_failures: u32, cooldown: Duration) -> Self {
        Self {
            max_consecutive_failures,
            cooldown,
            max_cooldowns: None,
            consecutive_failures: 0,
            cooldowns_without_success: 0,
        }
    }

    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(config.max_consecutive_failures, config.cooldown())
            .with_max_cooldowns(config.max_cooldowns)
    }

    pub fn with_max_cooldowns(mut self, max_cooldowns: Option<u32>) -> Self {
        self.max_cooldowns = max_cooldowns;
        self
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Folds one page outcome into the breaker
    pub fn on_outcome(&mut self, outcome: &FetchOutcome) -> BreakerAction {
        match outcome {
            FetchOutcome::Listings(_) => {
                self.consecutive_failures = 0;
                self.cooldowns_without_success = 0;
                BreakerAction::Continue
            }
            FetchOutcome::EmptyPage => BreakerAction::Stop,
            FetchOutcome::Failed(_) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures < self.max_consecutive_failures {
                    return BreakerAction::Continue;
                }

                if self
                    .max_cooldowns
                    .is_some_and(|max| self.cooldowns_without_success >= max)
                {
                    return BreakerAction::Stop;
                }
                BreakerAction::Cooldown(self.cooldown)
            }
        }
    }

    /// Marks a cooldown as served, so the next failure counts from zero
    pub fn cooldown_elapsed(&mut self) {
        self.consecutive_failures = 0;
        self.cooldowns_without_success += 1;
    }
}
