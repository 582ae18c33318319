use crate::options::{RunConfig, RunMode};
use crate::regime::{NodeId, TextRegime};
use crate::report::TestStatus;
use crate::store::{ExpectationSet, ExpectationStore};
use crate::summary::RunSummary;
use crate::warning::WarningSink;
use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Passed,
  Failed,
  Skipped,
}

/// The result of collecting one collector, e.g. a module or a parametrized
/// function, and the ids it expanded into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
  pub node_id: NodeId,
  pub outcome: Outcome,
  pub result: Vec<NodeId>,
}

/// The result of running one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestReport {
  pub node_id: NodeId,
  pub outcome: Outcome,
  /// The host already treated this test as an expected failure.
  pub expected_failure: bool,
}

impl TestReport {
  pub fn status(&self) -> TestStatus {
    TestStatus::classify(self.outcome, self.expected_failure)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
  Xfail,
  Skip,
}

/// A collected test the host is about to run.
pub trait TestItem {
  fn node_id(&self) -> &NodeId;
  fn add_marker(&mut self, marker: Marker);
}

/// Whether this process owns the run. In a distributed run only the primary
/// process writes the expectation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
  Primary,
  Worker,
}

/// Drives one test run against the expectation file.
///
/// The host calls, in order: [`collect_report`](Self::collect_report) for each
/// collector, [`prepare_items`](Self::prepare_items) once before any test
/// executes, [`test_report`](Self::test_report) for each finished test, and
/// finally [`finish`](Self::finish).
pub struct Coordinator<S> {
  config: RunConfig,
  store: ExpectationStore,
  working_set: ExpectationSet,
  summary: RunSummary,
  sink: S,
}

impl<S: WarningSink> Coordinator<S> {
  pub fn new(config: RunConfig, sink: S) -> Self {
    Self::with_regime(config, TextRegime::native(), sink)
  }

  /// Starts a run whose host produces ids in `regime`.
  ///
  /// In check mode the expectation file is loaded here. A file that cannot be
  /// read is reported to `sink` and the run continues with no expectations.
  pub fn with_regime(config: RunConfig, regime: TextRegime, sink: S) -> Self {
    let store = ExpectationStore::new(&config.path).with_regime(regime);
    let working_set = match config.mode {
      RunMode::Check => store.load_or_warn(&sink),
      RunMode::Update => ExpectationSet::new(regime),
    };
    debug!(
      mode = ?config.mode,
      path = %config.path.display(),
      expected = working_set.len(),
      "starting run"
    );

    Self {
      config,
      store,
      working_set,
      summary: RunSummary::default(),
      sink,
    }
  }

  pub fn config(&self) -> &RunConfig {
    &self.config
  }

  pub fn mode(&self) -> RunMode {
    self.config.mode
  }

  pub fn warn_on_python_xfail(&self) -> bool {
    self.config.warn_on_python_xfail
  }

  /// The sink this run reports to, for host warnings that belong with the
  /// run's own.
  pub fn sink(&self) -> &S {
    &self.sink
  }

  pub fn working_set(&self) -> &ExpectationSet {
    &self.working_set
  }

  pub fn summary(&self) -> &RunSummary {
    &self.summary
  }

  pub fn is_expected(&self, id: &NodeId) -> bool {
    self.config.mode == RunMode::Check && self.working_set.contains(id)
  }

  pub fn collect_report(&mut self, report: &CollectReport) {
    match self.config.mode {
      RunMode::Check => {
        if report.outcome == Outcome::Failed || !self.working_set.remove(&report.node_id) {
          return;
        }
        debug!(
          id = %report.node_id,
          children = report.result.len(),
          "expectation expanded into collected children"
        );
        self.working_set.extend(report.result.iter().cloned());
      }
      RunMode::Update => {
        if report.outcome == Outcome::Failed {
          self.working_set.insert(report.node_id.clone());
        }
      }
    }
  }

  /// Marks every item in the working set before it runs. Returns how many items
  /// were marked.
  pub fn prepare_items<I: TestItem>(&self, items: &mut [I]) -> usize {
    if self.config.mode != RunMode::Check {
      return 0;
    }

    let marker = if self.config.skip_xfail {
      Marker::Skip
    } else {
      Marker::Xfail
    };
    let mut marked = 0;
    for item in items.iter_mut() {
      if self.working_set.contains(item.node_id()) {
        item.add_marker(marker);
        marked += 1;
      }
    }
    debug!(marked, ?marker, "marked expected failures");
    marked
  }

  pub fn test_report(&mut self, report: &TestReport) {
    self.summary.record(report.status());
    match self.config.mode {
      RunMode::Update => {
        if report.outcome == Outcome::Failed && !report.expected_failure {
          self.working_set.insert(report.node_id.clone());
        }
      }
      RunMode::Check => {
        if report.outcome == Outcome::Passed && self.working_set.remove(&report.node_id) {
          info!(id = %report.node_id, "expected failure passed");
        }
      }
    }
  }

  /// Ends the run. In update mode the primary process writes the working set;
  /// a write failure is returned to the caller.
  pub fn finish(self, role: ProcessRole) -> Result<RunSummary> {
    if self.config.mode == RunMode::Update {
      match role {
        ProcessRole::Primary => {
          self.store.save(&self.working_set)?;
          info!(
            path = %self.store.path().display(),
            count = self.working_set.len(),
            "updated expectation file"
          );
        }
        ProcessRole::Worker => debug!("worker process, not writing expectation file"),
      }
    }
    Ok(self.summary)
  }
}
