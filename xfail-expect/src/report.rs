use crate::coordinator::Outcome;
use crate::summary::RunSummary;
use crate::Result;
use crate::ExpectError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Final classification of one test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
  Passed,
  Failed,
  Xfailed,
  Xpassed,
  Skipped,
}

impl TestStatus {
  pub fn classify(outcome: Outcome, expected_failure: bool) -> Self {
    match (outcome, expected_failure) {
      (Outcome::Skipped, _) => TestStatus::Skipped,
      (Outcome::Passed, true) => TestStatus::Xpassed,
      (Outcome::Passed, false) => TestStatus::Passed,
      (Outcome::Failed, true) => TestStatus::Xfailed,
      (Outcome::Failed, false) => TestStatus::Failed,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRecord {
  pub id: String,
  pub status: TestStatus,
}

/// The top-level JSON report of a run.
///
/// `results` should be sorted by test id so the report is reproducible.
#[derive(Debug, Serialize)]
pub struct ReportRef<'a> {
  pub schema_version: u32,
  pub summary: &'a RunSummary,
  pub results: &'a [TestRecord],
}

impl<'a> ReportRef<'a> {
  pub fn new(summary: &'a RunSummary, results: &'a [TestRecord]) -> Self {
    Self {
      schema_version: REPORT_SCHEMA_VERSION,
      summary,
      results,
    }
  }
}

/// Write a pretty JSON report to `path`, creating parent directories as
/// needed.
pub fn write_json_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
  let write_failure = |source: io::Error| ExpectError::Report {
    path: path.to_path_buf(),
    source,
  };

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(write_failure)?;
  }

  let file = fs::File::create(path).map_err(write_failure)?;
  let mut writer = BufWriter::new(file);
  write_json_report_to_writer(&mut writer, report).map_err(write_failure)?;
  writer.flush().map_err(write_failure)?;
  Ok(())
}

/// Write a pretty JSON report to `writer`, followed by a newline.
pub fn write_json_report_to_writer<W: Write, T: Serialize>(
  writer: &mut W,
  report: &T,
) -> io::Result<()> {
  serde_json::to_writer_pretty(&mut *writer, report)?;
  writeln!(&mut *writer)
}

/// Write a pretty JSON report to stdout.
pub fn write_json_report_to_stdout<T: Serialize>(report: &T) -> io::Result<()> {
  let stdout = io::stdout();
  let mut handle = stdout.lock();
  write_json_report_to_writer(&mut handle, report)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_report_is_stable_and_ordered() {
    let summary = RunSummary {
      total: 2,
      passed: 1,
      xfailed: 1,
      ..RunSummary::default()
    };
    let results = [
      TestRecord {
        id: "a.py::t".to_string(),
        status: TestStatus::Passed,
      },
      TestRecord {
        id: "b.py::t".to_string(),
        status: TestStatus::classify(Outcome::Failed, true),
      },
    ];
    let report = ReportRef::new(&summary, &results);

    let mut one = Vec::new();
    write_json_report_to_writer(&mut one, &report).unwrap();
    let mut two = Vec::new();
    write_json_report_to_writer(&mut two, &report).unwrap();
    assert_eq!(one, two);

    let json = String::from_utf8(one).unwrap();
    let schema_idx = json.find("\"schema_version\"").unwrap();
    let summary_idx = json.find("\"summary\"").unwrap();
    let results_idx = json.find("\"results\"").unwrap();
    assert!(schema_idx < summary_idx);
    assert!(summary_idx < results_idx);
    assert!(json.contains("\"xfailed\""));
  }

  #[test]
  fn report_file_lands_in_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/report.json");
    let summary = RunSummary::default();
    write_json_report(&path, &ReportRef::new(&summary, &[])).unwrap();

    let value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(value["schema_version"], REPORT_SCHEMA_VERSION);
    assert_eq!(value["summary"]["total"], 0);
  }

  #[test]
  fn report_write_errors_name_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"").unwrap();
    let summary = RunSummary::default();

    let err = write_json_report(&blocker.join("report.json"), &ReportRef::new(&summary, &[]))
      .unwrap_err();
    assert!(matches!(err, ExpectError::Report { .. }));
    assert!(err.to_string().contains("failed to write report"));
    assert!(!err.is_read_error());
  }
}
