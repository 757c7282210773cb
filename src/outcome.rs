use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::runner::TestResult;

/// One recorded failure: the phase it came from and enough context to
/// locate the offending artifact.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseFailure {
    pub phase: String,
    pub detail: String,
}

/// Aggregate run outcome, threaded through every phase.
///
/// Phases append failures instead of returning early, so one run surfaces
/// every failure category at once. The exit status is the OR-combination
/// of everything recorded here.
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub variant: String,
    pub started_at: DateTime<Utc>,
    pub failures: Vec<PhaseFailure>,
    /// False once leftover scratch state was found.
    pub cleaned_up: bool,
    /// None when leak checking was not required this run.
    pub leak_check_ok: Option<bool>,
    pub tests_total: usize,
    pub tests_failed: usize,
    pub reports_synthesized: usize,
    pub results: Vec<TestResult>,
}

impl RunOutcome {
    pub fn new(variant: &str) -> Self {
        Self {
            variant: variant.to_string(),
            started_at: Utc::now(),
            failures: Vec::new(),
            cleaned_up: true,
            leak_check_ok: None,
            tests_total: 0,
            tests_failed: 0,
            reports_synthesized: 0,
            results: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, phase: &str, detail: impl Into<String>) {
        self.failures.push(PhaseFailure {
            phase: phase.to_string(),
            detail: detail.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn exit_status(&self) -> i32 {
        i32::from(!self.is_clean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_outcome_is_clean() {
        let outcome = RunOutcome::new("debug");
        assert!(outcome.is_clean());
        assert_eq!(outcome.exit_status(), 0);
    }

    #[test]
    fn test_failures_accumulate_without_short_circuit() {
        let mut outcome = RunOutcome::new("tsan");
        outcome.record_failure("tests", "3 tests failed");
        outcome.record_failure("cleanup", "leftover scratch entries: foo");
        outcome.record_failure("leak-check", "marker missing: tablet-test");

        assert_eq!(outcome.failures.len(), 3);
        assert_eq!(outcome.exit_status(), 1);
        assert_eq!(outcome.failures[1].phase, "cleanup");
    }
}
