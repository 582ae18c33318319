use crate::report::TestStatus;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Per-run counters, one increment per test report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
  pub total: usize,
  pub passed: usize,
  /// Failures that were not expected.
  pub failed: usize,
  pub xfailed: usize,
  pub xpassed: usize,
  pub skipped: usize,
}

impl RunSummary {
  pub fn record(&mut self, status: TestStatus) {
    self.total += 1;
    match status {
      TestStatus::Passed => self.passed += 1,
      TestStatus::Failed => self.failed += 1,
      TestStatus::Xfailed => self.xfailed += 1,
      TestStatus::Xpassed => self.xpassed += 1,
      TestStatus::Skipped => self.skipped += 1,
    }
  }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum FailOn {
  /// Non-zero on any failure, expected or not.
  All,
  /// Non-zero only for failures not covered by the expectation file (default).
  #[default]
  New,
  /// Always zero.
  None,
}

impl FailOn {
  pub fn should_fail(&self, summary: &RunSummary) -> bool {
    match self {
      FailOn::All => summary.failed + summary.xfailed > 0,
      FailOn::New => summary.failed > 0,
      FailOn::None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::coordinator::Outcome;

  #[test]
  fn records_each_outcome_once() {
    let mut summary = RunSummary::default();
    for (outcome, expected_failure) in [
      (Outcome::Passed, false),
      (Outcome::Passed, true),
      (Outcome::Failed, false),
      (Outcome::Failed, true),
      (Outcome::Skipped, true),
    ] {
      summary.record(TestStatus::classify(outcome, expected_failure));
    }

    assert_eq!(
      summary,
      RunSummary {
        total: 5,
        passed: 1,
        failed: 1,
        xfailed: 1,
        xpassed: 1,
        skipped: 1,
      }
    );
  }

  #[test]
  fn fail_on_policies() {
    let expected_only = RunSummary {
      total: 2,
      passed: 1,
      xfailed: 1,
      ..RunSummary::default()
    };
    assert!(FailOn::All.should_fail(&expected_only));
    assert!(!FailOn::New.should_fail(&expected_only));
    assert!(!FailOn::None.should_fail(&expected_only));

    let unexpected = RunSummary {
      total: 1,
      failed: 1,
      ..RunSummary::default()
    };
    assert!(FailOn::New.should_fail(&unexpected));
    assert!(!FailOn::None.should_fail(&unexpected));
  }
}
