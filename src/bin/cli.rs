use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use perft_hunt::HuntError;
use perft_hunt::config::{EngineSpec, HuntConfig};
use perft_hunt::hunt::{HuntStatus, LocateOutcome, diff_divide_text, run_with_observer};
use perft_hunt::logger::init_logging;
use perft_hunt::oracle::process::EngineProcess;
use perft_hunt::oracle::{Oracle, Role};
use tracing::error;

/// Find the shortest move sequence where two perft engines disagree
#[derive(Parser, Debug)]
#[command(name = "perft-hunt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log file (default: stderr)
    #[arg(long = "log", global = true)]
    log: Option<PathBuf>,

    /// Log filter, e.g. `perft_hunt=debug`
    #[arg(long = "log-filter", global = true, default_value = "perft_hunt=info")]
    log_filter: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bisect a batch of positions against a reference engine
    Hunt(HuntArgs),
    /// Compare two saved divide listings
    Diff {
        /// Output of the reference engine
        reference: PathBuf,
        /// Output of the engine under test
        under_test: PathBuf,
    },
}

#[derive(Args, Debug)]
struct HuntArgs {
    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Reference engine executable
    #[arg(short = 'r', long = "reference")]
    reference: Option<String>,

    /// Identification marker printed by the reference engine
    #[arg(long = "reference-banner")]
    reference_banner: Option<String>,

    /// Engine under test executable
    #[arg(short = 't', long = "under-test")]
    under_test: Option<String>,

    /// Identification marker printed by the engine under test
    #[arg(long = "under-test-banner")]
    under_test_banner: Option<String>,

    /// Perft depth applied to every position
    #[arg(short = 'd', long = "depth")]
    depth: Option<u32>,

    /// Batch file, one position per line
    #[arg(short = 'p', long = "positions")]
    positions: Option<PathBuf>,

    /// Extra position (repeatable)
    #[arg(long = "fen")]
    fen: Vec<String>,

    /// Write the report as JSON
    #[arg(long = "json")]
    json: Option<PathBuf>,
}

impl HuntArgs {
    fn into_config(self) -> Result<(HuntConfig, Option<PathBuf>), HuntError> {
        let mut config = match &self.config {
            Some(path) => HuntConfig::load(path)?,
            None => HuntConfig::default(),
        };
        if let Some(program) = self.reference {
            config.reference = EngineSpec::new(program);
        }
        if let Some(banner) = self.reference_banner {
            config.reference.banner = Some(banner);
        }
        if let Some(program) = self.under_test {
            config.under_test = EngineSpec::new(program);
        }
        if let Some(banner) = self.under_test_banner {
            config.under_test.banner = Some(banner);
        }
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if self.positions.is_some() {
            config.positions_file = self.positions;
        }
        config.positions.extend(self.fen);
        config.validate()?;
        Ok((config, self.json))
    }
}

fn start_oracle(role: Role, spec: &EngineSpec, config: &HuntConfig) -> Result<Oracle<EngineProcess>, HuntError> {
    let process = EngineProcess::spawn(&spec.program, &spec.args)?;
    let mut oracle = Oracle::new(role, spec.display_name(), process);
    oracle.handshake(&spec.handshake(), config.timeout.handshake())?;
    Ok(oracle)
}

/// Exit status: 0 when every position resolved, 1 on a disagreement, 2 when
/// the harness itself failed.
fn exit_code(status: HuntStatus) -> ExitCode {
    match status {
        HuntStatus::Passed => ExitCode::SUCCESS,
        HuntStatus::Failed => ExitCode::from(1),
        HuntStatus::Aborted => ExitCode::from(2),
    }
}

fn hunt(args: HuntArgs) -> Result<ExitCode, HuntError> {
    let (config, json_out) = args.into_config()?;
    let positions = config.start_positions()?;
    let settings = config.protocol_settings();

    let mut reference = start_oracle(Role::Reference, &config.reference, &config)?;
    let mut under_test = start_oracle(Role::UnderTest, &config.under_test, &config)?;

    let pb = ProgressBar::new(positions.len() as u64);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
        pb.set_style(style);
    }

    let report = run_with_observer(
        &mut reference,
        &mut under_test,
        &settings,
        &positions,
        config.depth,
        |_, _, outcome| {
            match outcome {
                LocateOutcome::Resolved { .. } => pb.set_message("agree"),
                LocateOutcome::Failed(record) => {
                    pb.println(format!("Incorrect generation for {}", record.pinned));
                    pb.set_message(record.reason.label());
                }
            }
            pb.inc(1);
        },
    );
    pb.finish_and_clear();

    // The report is printed before any cleanup that might fail.
    print!("{report}");
    let mut cleanup_failed = false;

    for oracle in [&mut reference, &mut under_test] {
        if let Err(e) = oracle.shutdown() {
            error!(oracle = %oracle.role(), error = %e, "engine shutdown failed");
            eprintln!("Error: {e}");
            cleanup_failed = true;
        }
    }

    if let Some(path) = json_out {
        let written = report
            .to_json()
            .map_err(HuntError::from)
            .and_then(|json| Ok(fs::write(&path, json)?));
        if let Err(e) = written {
            error!(path = %path.display(), error = %e, "could not write JSON report");
            eprintln!("Error: could not write {}: {e}", path.display());
            cleanup_failed = true;
        }
    }

    if cleanup_failed {
        return Ok(ExitCode::from(2));
    }
    Ok(exit_code(report.status()))
}

fn diff(reference: PathBuf, under_test: PathBuf) -> Result<ExitCode, HuntError> {
    let reference = fs::read_to_string(reference)?;
    let under_test = fs::read_to_string(under_test)?;
    let diff = diff_divide_text(&reference, &under_test);
    print!("{diff}");
    Ok(if diff.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log.as_deref(), &cli.log_filter) {
        eprintln!("Error: could not initialise logging: {e}");
        return ExitCode::from(2);
    }

    let outcome = match cli.command {
        Command::Hunt(args) => hunt(args),
        Command::Diff {
            reference,
            under_test,
        } => diff(reference, under_test),
    };

    outcome.unwrap_or_else(|e| {
        error!(error = %e, "fatal");
        eprintln!("Error: {e}");
        ExitCode::from(2)
    })
}
