//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `CrawlPhase`: the orchestrator's state machine (idle, resuming, fetching, cooling, ...)
//! - `CrawlState`: rows and counters owned by the orchestrator during a run

mod crawl_phase;
mod crawl_state;

// Re-export main types
pub use crawl_phase::CrawlPhase;
pub use crawl_state::CrawlState;
