//! Drives one coordinator run from a JSON-lines event log.
//!
//! Each line is one event:
//!
//! ```text
//! {"event":"collect","id":"mod.py::test_x","outcome":"passed","items":["mod.py::test_x[a]"]}
//! {"event":"items","ids":["mod.py::test_x[a]"]}
//! {"event":"run","id":"mod.py::test_x[a]","outcome":"failed"}
//! ```
//!
//! `items` lists the tests about to run. They are marked before any of their
//! `run` events are processed, and a `run` event for an id no `items` event
//! listed is an error.
//!
//! Warnings are collected during the run and printed to stderr once it ends,
//! whether or not it succeeded.

use anyhow::{anyhow, Context};
use clap::Args;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use xfail_expect::report::{
  write_json_report, write_json_report_to_stdout, ReportRef, TestRecord, TestStatus,
};
use xfail_expect::{
  CollectReport, Coordinator, ExpectOptions, FailOn, Marker, NodeId, Outcome, ProcessRole,
  RecordingSink, TestItem, TestReport, TextRegime, Warning, WarningSink,
};

#[derive(Args)]
pub struct ReplayArgs {
  /// JSON-lines event log to replay
  events: PathBuf,

  #[command(flatten)]
  expect: ExpectOptions,

  /// Project root holding the default expectation file
  #[arg(long, default_value = ".")]
  root: PathBuf,

  /// Act as a worker process; never write the expectation file
  #[arg(long)]
  worker: bool,

  /// Which failures make the exit status non-zero
  #[arg(long, value_enum, default_value_t = FailOn::New)]
  fail_on: FailOn,

  /// Print a JSON report instead of the human summary
  #[arg(long)]
  json: bool,

  /// Also write the JSON report to PATH
  #[arg(long, value_name = "PATH")]
  report_out: Option<PathBuf>,

  /// Enable tracing output
  #[arg(long)]
  pub trace: bool,

  /// Text regime the replayed host produces ids in
  #[arg(long, value_enum, default_value_t = TextRegime::native())]
  text_regime: TextRegime,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event {
  Collect {
    id: String,
    #[serde(default = "collected")]
    outcome: Outcome,
    #[serde(default)]
    items: Vec<String>,
  },
  Items {
    ids: Vec<String>,
  },
  Run {
    id: String,
    outcome: Outcome,
    /// The test carries its own static expected-failure marker.
    #[serde(default)]
    xfail: bool,
  },
}

fn collected() -> Outcome {
  Outcome::Passed
}

struct ReplayItem {
  id: NodeId,
  markers: Vec<Marker>,
}

impl TestItem for ReplayItem {
  fn node_id(&self) -> &NodeId {
    &self.id
  }

  fn add_marker(&mut self, marker: Marker) {
    self.markers.push(marker);
  }
}

pub fn run(args: ReplayArgs) -> anyhow::Result<ExitCode> {
  let sink = RecordingSink::new();
  let result = replay(&args, &sink);
  for warning in sink.take() {
    eprintln!("warning: {warning}");
  }
  result
}

fn replay(args: &ReplayArgs, sink: &RecordingSink) -> anyhow::Result<ExitCode> {
  let config = args.expect.resolve(&args.root);
  let events = File::open(&args.events)
    .with_context(|| format!("open event log {}", args.events.display()))?;

  let regime = args.text_regime;
  let mut coordinator = Coordinator::with_regime(config, regime, sink);
  let mut prepared: HashMap<NodeId, Vec<Marker>> = HashMap::new();
  let mut records = Vec::new();

  for (index, line) in BufReader::new(events).lines().enumerate() {
    let line = line.with_context(|| format!("read event log {}", args.events.display()))?;
    if line.trim().is_empty() {
      continue;
    }
    let event: Event = serde_json::from_str(&line)
      .with_context(|| format!("{}:{}: invalid event", args.events.display(), index + 1))?;

    match event {
      Event::Collect { id, outcome, items } => {
        coordinator.collect_report(&CollectReport {
          node_id: regime.node_id(&id),
          outcome,
          result: items.iter().map(|item| regime.node_id(item)).collect(),
        });
      }
      Event::Items { ids } => {
        let mut items: Vec<ReplayItem> = ids
          .iter()
          .map(|id| ReplayItem {
            id: regime.node_id(id),
            markers: Vec::new(),
          })
          .collect();
        coordinator.prepare_items(&mut items);
        prepared.extend(items.into_iter().map(|item| (item.id, item.markers)));
      }
      Event::Run { id, outcome, xfail } => {
        let node_id = regime.node_id(&id);
        let markers = prepared.get(&node_id).ok_or_else(|| {
          anyhow!(
            "{}:{}: `{id}` ran before it was listed",
            args.events.display(),
            index + 1
          )
        })?;

        let report = if markers.contains(&Marker::Skip) {
          TestReport {
            node_id,
            outcome: Outcome::Skipped,
            expected_failure: false,
          }
        } else {
          TestReport {
            node_id,
            outcome,
            expected_failure: xfail || markers.contains(&Marker::Xfail),
          }
        };
        coordinator.test_report(&report);

        let status = report.status();
        if xfail && status == TestStatus::Xfailed && coordinator.warn_on_python_xfail() {
          coordinator
            .sink()
            .warn(Warning::new("W2", format!("{id} failed under its own xfail marker")));
        }
        records.push(TestRecord { id, status });
      }
    }
  }

  let role = if args.worker {
    ProcessRole::Worker
  } else {
    ProcessRole::Primary
  };
  let summary = coordinator.finish(role)?;

  records.sort_by(|a, b| a.id.cmp(&b.id));
  let report = ReportRef::new(&summary, &records);
  if args.json {
    write_json_report_to_stdout(&report).context("write JSON report")?;
  } else {
    println!("Ran {} test(s)", summary.total);
    println!(
      "Passed: {}, Failed: {}, Expected failures: {}, Unexpected passes: {}, Skipped: {}",
      summary.passed, summary.failed, summary.xfailed, summary.xpassed, summary.skipped
    );
  }
  if let Some(path) = &args.report_out {
    write_json_report(path, &report)?;
  }

  if args.fail_on.should_fail(&summary) {
    Ok(ExitCode::from(1))
  } else {
    Ok(ExitCode::SUCCESS)
  }
}
