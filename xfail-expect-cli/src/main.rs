use anyhow::Context;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;
use xfail_expect::report::write_json_report_to_stdout;
use xfail_expect::report::REPORT_SCHEMA_VERSION;
use xfail_expect::ExpectationStore;
use xfail_expect::TextRegime;
use xfail_expect::DEFAULT_XFAIL_FILE;

mod replay;

#[derive(Parser)]
#[command(author, version, about = "Expected-failure file utilities", long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Print the test ids recorded in an expectation file
  Show(ShowArgs),

  /// Replay a JSON-lines log of test events against the expectation file
  Replay(replay::ReplayArgs),
}

#[derive(Args)]
struct ShowArgs {
  /// Expectation file to read (default: <root>/.xfail-expect)
  #[arg(long, value_name = "FILE")]
  xfail_file: Option<PathBuf>,

  /// Project root holding the default expectation file
  #[arg(long, default_value = ".")]
  root: PathBuf,

  /// Emit JSON instead of one id per line
  #[arg(long)]
  json: bool,

  /// Text regime to read the file in
  #[arg(long, value_enum, default_value_t = TextRegime::native())]
  text_regime: TextRegime,
}

#[derive(Serialize)]
struct ShowReport {
  schema_version: u32,
  format_version: u32,
  writer_text_regime: String,
  identifiers: Vec<String>,
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  let result = match cli.command {
    Commands::Show(args) => show(args),
    Commands::Replay(args) => {
      init_tracing(args.trace);
      replay::run(args)
    }
  };

  match result {
    Ok(code) => code,
    Err(err) => print_error(err),
  }
}

fn show(args: ShowArgs) -> anyhow::Result<ExitCode> {
  let path = args
    .xfail_file
    .unwrap_or_else(|| args.root.join(DEFAULT_XFAIL_FILE));
  let set = ExpectationStore::new(&path)
    .with_regime(args.text_regime)
    .load()
    .with_context(|| format!("load {}", path.display()))?;
  let identifiers: Vec<String> = set.iter().map(|id| id.to_string()).collect();

  if args.json {
    let report = ShowReport {
      schema_version: REPORT_SCHEMA_VERSION,
      format_version: set.format_version(),
      writer_text_regime: set.writer_text_regime().to_string(),
      identifiers,
    };
    write_json_report_to_stdout(&report).context("write JSON output")?;
  } else {
    for id in identifiers {
      println!("{id}");
    }
  }

  Ok(ExitCode::SUCCESS)
}

fn print_error(err: anyhow::Error) -> ExitCode {
  eprintln!("error: {err:#}");
  ExitCode::from(1)
}

fn init_tracing(enable: bool) {
  if !enable {
    return;
  }

  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = fmt()
    .with_env_filter(env_filter)
    .with_writer(std::io::stderr);
  if let Err(err) = builder.try_init() {
    eprintln!("failed to install tracing subscriber: {err}");
  }
}
