use std::cell::RefCell;
use std::fmt;

/// A non-fatal problem reported to the host, e.g. an unreadable expectation
/// file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
  pub code: &'static str,
  pub message: String,
}

impl Warning {
  pub fn new(code: &'static str, message: impl Into<String>) -> Self {
    Self {
      code,
      message: message.into(),
    }
  }
}

impl fmt::Display for Warning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}] {}", self.code, self.message)
  }
}

/// Where warnings go. Supplied by the host when a run starts.
pub trait WarningSink {
  fn warn(&self, warning: Warning);
}

impl<S: WarningSink + ?Sized> WarningSink for &S {
  fn warn(&self, warning: Warning) {
    (**self).warn(warning)
  }
}

/// Keeps warnings in memory for the host to print or inspect later.
#[derive(Debug, Default)]
pub struct RecordingSink {
  warnings: RefCell<Vec<Warning>>,
}

impl RecordingSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn warnings(&self) -> Vec<Warning> {
    self.warnings.borrow().clone()
  }

  pub fn take(&self) -> Vec<Warning> {
    self.warnings.take()
  }
}

impl WarningSink for RecordingSink {
  fn warn(&self, warning: Warning) {
    self.warnings.borrow_mut().push(warning);
  }
}
