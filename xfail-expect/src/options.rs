use clap::Args;
use std::path::{Path, PathBuf};

/// File name of the expectation file in the project root, used when
/// `--xfail-file` is not given.
pub const DEFAULT_XFAIL_FILE: &str = ".xfail-expect";

/// Command-line options. Hosts flatten these into their own parser.
#[derive(Debug, Clone, Default, Args)]
pub struct ExpectOptions {
  /// Store test expectations in FILE
  #[arg(long, value_name = "FILE")]
  pub xfail_file: Option<PathBuf>,

  /// Rebaseline test expectations with the currently failing tests
  #[arg(long)]
  pub update_xfail: bool,

  /// Trigger a warning whenever an expected failure fails
  #[arg(long)]
  pub warn_on_python_xfail: bool,

  /// Skip expected failures instead of running them
  #[arg(long)]
  pub skip_xfail: bool,
}

impl ExpectOptions {
  /// Fixes the expectation file path and run mode for one run.
  pub fn resolve(&self, root: &Path) -> RunConfig {
    RunConfig {
      path: self
        .xfail_file
        .clone()
        .unwrap_or_else(|| root.join(DEFAULT_XFAIL_FILE)),
      mode: if self.update_xfail {
        RunMode::Update
      } else {
        RunMode::Check
      },
      skip_xfail: self.skip_xfail,
      warn_on_python_xfail: self.warn_on_python_xfail,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
  /// Rebuild the expectation set from this run's failures.
  Update,
  /// Mark tests in the existing expectation set as expected failures.
  Check,
}

/// Settings for one run. Fixed when the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
  pub path: PathBuf,
  pub mode: RunMode,
  pub skip_xfail: bool,
  pub warn_on_python_xfail: bool,
}

impl RunConfig {
  pub fn new(path: impl Into<PathBuf>, mode: RunMode) -> Self {
    Self {
      path: path.into(),
      mode,
      skip_xfail: false,
      warn_on_python_xfail: false,
    }
  }
}
