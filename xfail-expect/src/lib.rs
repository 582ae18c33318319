//! Persistent expected-failure tracking for test runners.
//!
//! A run in update mode records the ids of every failing test into an
//! expectation file. Later runs in check mode load that file and annotate the
//! same tests as expected failures before they execute, so known-broken tests
//! keep running without failing the build while new failures still do.
//!
//! The crate is split into the [`ExpectationStore`], which owns the on-disk
//! document, and the [`Coordinator`], which drives one run against a host test
//! runner through the [`TestItem`] and [`WarningSink`] seams.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

mod coordinator;
mod options;
mod regime;
pub mod report;
mod store;
mod summary;
mod warning;

pub type Result<T> = std::result::Result<T, ExpectError>;

#[derive(Debug, Error)]
pub enum ExpectError {
  #[error("{path}: invalid expectation file: {reason}")]
  CorruptFile { path: PathBuf, reason: String },
  #[error("{path}: {}", describe_version(.found, .supported, .legacy))]
  UnsupportedVersion {
    path: PathBuf,
    found: u32,
    supported: u32,
    /// The file uses one of the headerless formats that predate `MAGIC`.
    legacy: bool,
  },
  #[error("{path}: failed to read expectation file: {source}")]
  Unreadable {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("{path}: failed to write expectation file: {source}")]
  WriteFailure {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("{path}: failed to encode expectation file: {reason}")]
  Encode { path: PathBuf, reason: String },
  #[error("{path}: failed to write report: {source}")]
  Report {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl ExpectError {
  /// Whether this error came from reading an expectation file. Read errors are
  /// recoverable: the run continues with no expectations.
  pub fn is_read_error(&self) -> bool {
    matches!(
      self,
      ExpectError::CorruptFile { .. }
        | ExpectError::UnsupportedVersion { .. }
        | ExpectError::Unreadable { .. }
    )
  }
}

fn describe_version(found: &u32, supported: &u32, legacy: &bool) -> String {
  if *legacy {
    format!("legacy file version {found} is no longer supported (expected {supported})")
  } else if found > supported {
    format!("expectation file version {found} is newer than supported version {supported}")
  } else {
    format!("expectation file version {found} is no longer supported (expected {supported})")
  }
}

pub use coordinator::{
  CollectReport, Coordinator, Marker, Outcome, ProcessRole, TestItem, TestReport,
};
pub use options::{ExpectOptions, RunConfig, RunMode, DEFAULT_XFAIL_FILE};
pub use regime::{bridge, NodeId, TextRegime};
pub use store::{ExpectationSet, ExpectationStore, FORMAT_VERSION, MAGIC};
pub use summary::{FailOn, RunSummary};
pub use warning::{RecordingSink, Warning, WarningSink};
