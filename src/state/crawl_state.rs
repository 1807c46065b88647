use crate::record::FlatRow;

/// In-memory progress of a crawl run
///
/// Owned by the orchestrator. `baseline` holds the rows that were already in
/// the dataset when the run started; `accumulated` holds everything fetched
/// since. A flush writes `baseline ∪ accumulated`.
#[derive(Debug, Clone, Default)]
pub struct CrawlState {
    /// Highest page whose rows have been accumulated (0 before the first page)
    pub last_completed_page: u32,

    /// Mirror of the circuit breaker counter, for progress reporting
    pub consecutive_failures: u32,

    /// Rows loaded from the dataset at startup
    pub baseline: Vec<FlatRow>,

    /// Rows collected during this run
    pub accumulated: Vec<FlatRow>,

    /// Row count of the last successful flush
    pub persisted_rows: u64,
}

impl CrawlState {
    /// Creates a state seeded with previously persisted rows
    pub fn with_baseline(baseline: Vec<FlatRow>) -> Self {
        let persisted_rows = baseline.len() as u64;
        Self {
            baseline,
            persisted_rows,
            ..Self::default()
        }
    }

    /// Records a completed page
    pub fn record_page(&mut self, page: u32, rows: Vec<FlatRow>) {
        self.accumulated.extend(rows);
        self.last_completed_page = page;
        self.consecutive_failures = 0;
    }

    /// Total rows across baseline and this run
    pub fn total_rows(&self) -> u64 {
        (self.baseline.len() + self.accumulated.len()) as u64
    }

    /// Returns true if rows exist that the last flush did not write
    pub fn has_unflushed_rows(&self) -> bool {
        self.total_rows() != self.persisted_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(id: i64) -> FlatRow {
        vec![("id".to_string(), json!(id))].into_iter().collect()
    }

    #[test]
    fn test_with_baseline() {
        let state = CrawlState::with_baseline(vec![row(1), row(2)]);
        assert_eq!(state.total_rows(), 2);
        assert_eq!(state.persisted_rows, 2);
        assert!(!state.has_unflushed_rows());
        assert_eq!(state.last_completed_page, 0);
    }

    #[test]
    fn test_record_page() {
        let mut state = CrawlState::with_baseline(vec![row(1)]);
        state.consecutive_failures = 3;

        state.record_page(4, vec![row(2), row(3)]);

        assert_eq!(state.last_completed_page, 4);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.total_rows(), 3);
        assert!(state.has_unflushed_rows());
    }
}
