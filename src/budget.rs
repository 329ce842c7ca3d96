//! Compute budget for a single analysis request.
//!
//! The budget is checked between stages, before each fold and once per
//! tree or boosting round. Like the rest of the crate's time checks it
//! has an `_at` form taking the current instant so tests stay
//! deterministic.
//!
//! Exceeded means strictly greater than the limit:
//!   elapsed >  limit → exceeded
//!   elapsed == limit → still within budget

use std::time::{Duration, Instant};

use crate::error::TimeoutError;

#[derive(Debug, Clone, Copy)]
pub struct Budget {
    started: Instant,
    limit_ms: Option<u64>,
}

impl Budget {
    /// Start a budget now. `None` never expires.
    pub fn new(limit_ms: Option<u64>) -> Self {
        Self::starting_at(limit_ms, Instant::now())
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn starting_at(limit_ms: Option<u64>, started: Instant) -> Self {
        Self { started, limit_ms }
    }

    pub fn limit_ms(&self) -> Option<u64> {
        self.limit_ms
    }

    pub fn check_at(&self, stage: &str, now: Instant) -> Result<(), TimeoutError> {
        let Some(limit_ms) = self.limit_ms else {
            return Ok(());
        };
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed > Duration::from_millis(limit_ms) {
            return Err(TimeoutError {
                stage: stage.to_string(),
                budget_ms: limit_ms,
            });
        }
        Ok(())
    }

    /// Fails with `TimeoutError` naming `stage` once the limit has passed.
    pub fn check(&self, stage: &str) -> Result<(), TimeoutError> {
        self.check_at(stage, Instant::now())
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::unlimited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_budget_never_expires() {
        let start = Instant::now();
        let budget = Budget::starting_at(None, start);
        assert!(budget.check_at("evaluate", start + Duration::from_secs(86_400)).is_ok());
    }

    #[test]
    fn test_exactly_at_limit_is_not_exceeded() {
        let start = Instant::now();
        let budget = Budget::starting_at(Some(250), start);
        assert!(budget.check_at("evaluate", start + Duration::from_millis(250)).is_ok());
    }

    #[test]
    fn test_past_limit_names_the_stage() {
        let start = Instant::now();
        let budget = Budget::starting_at(Some(250), start);
        let err = budget
            .check_at("evaluate", start + Duration::from_millis(251))
            .unwrap_err();
        assert_eq!(err.stage, "evaluate");
        assert_eq!(err.budget_ms, 250);
    }

    #[test]
    fn test_clock_before_start_counts_as_zero_elapsed() {
        let start = Instant::now() + Duration::from_secs(5);
        let budget = Budget::starting_at(Some(0), start);
        assert!(budget.check_at("trend", Instant::now()).is_ok());
    }
}
