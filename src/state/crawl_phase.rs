//! Crawl phase definitions for the orchestrator state machine
//!
//! ```text
//! Idle → Resuming → Fetching(p) ─┬→ Accumulating(p) → Fetching(p+1)
//!                     ↑   │      ├→ Cooling(p) → Fetching(p)
//!                     └───┘      └→ Stopping → Stopped
//! ```

use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Nothing has happened yet
    Idle,

    /// Loading the checkpoint and any previously written dataset
    Resuming,

    /// Fetching the given page (including its retries)
    Fetching(u32),

    /// Persisting the rows of the given page
    Accumulating(u32),

    /// Circuit breaker tripped; waiting before retrying the given page
    Cooling(u32),

    /// Persisting final state before exit
    Stopping,

    /// Run finished; nothing more will happen
    Stopped,
}

impl CrawlPhase {
    /// Returns true once the run is over
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns the page this phase is about, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            Self::Fetching(page) | Self::Accumulating(page) | Self::Cooling(page) => Some(*page),
            _ => None,
        }
    }

    /// Short name used in logs and progress output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resuming => "resuming",
            Self::Fetching(_) => "fetching",
            Self::Accumulating(_) => "accumulating",
            Self::Cooling(_) => "cooling",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }

    /// Checks whether moving from `self` to `next` is a legal transition
    ///
    /// Any non-terminal phase after `Idle` may move to `Stopping`, which is
    /// how interruption and fatal errors leave the loop.
    pub fn can_transition_to(&self, next: &CrawlPhase) -> bool {
        use CrawlPhase::*;

        match (*self, *next) {
            (Idle, Resuming) => true,
            (Resuming, Fetching(_)) => true,
            (Fetching(p), Fetching(q)) => p == q,
            (Fetching(p), Accumulating(q)) => p == q,
            (Fetching(p), Cooling(q)) => p == q,
            (Accumulating(p), Fetching(q)) => q == p + 1,
            (Cooling(p), Fetching(q)) => p == q,
            (Resuming | Fetching(_) | Accumulating(_) | Cooling(_), Stopping) => true,
            (Stopping, Stopped) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.page() {
            Some(page) => write!(f, "{}({})", self.name(), page),
            None => write!(f, "{}", self.name()),
        }
    }
}
