//! CLI module for the sanity driver
//!
//! ## Commands
//!
//! - `run` - Run the catalog (default when no command is given)
//! - `list` - Print suites and their enabled cases
//! - `clean` - Remove cached results
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use crate::error::SanityError;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    /// At least one unit failed.
    pub const FAILURE: ExitCode = ExitCode(1);
    /// The run could not be carried out at all.
    pub const FATAL: ExitCode = ExitCode(2);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    /// Create a new CLI error with a message and exit code.
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }
}

impl From<SanityError> for CliError {
    fn from(err: SanityError) -> Self {
        let report = miette::Report::new(err);
        Self::new(format!("{report:?}"), ExitCode::FATAL)
    }
}

impl From<io::Error> for CliError {
    fn from(err: io::Error) -> Self {
        Self::new(format!("failed to write output: {err}"), ExitCode::FATAL)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Sequential driver for gtest sanity suites
#[derive(Parser, Debug)]
#[command(name = "sanity")]
#[command(version = VERSION)]
#[command(about = "Run gtest sanity suites one at a time, caching results on disk", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Checkout root (default: $SRC_DIR, then the current directory)
    #[arg(long = "src-dir", value_name = "DIR", global = true)]
    pub src_dir: Option<PathBuf>,

    /// Catalog variable holding the suite list
    #[arg(long = "marker", value_name = "NAME", global = true)]
    pub marker: Option<String>,

    /// Verbose logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run suites, falling back to case-by-case runs for failing suites
    Run(RunArgs),

    /// List suites and their enabled cases
    List {
        /// Only list these suites
        #[arg(long = "suite", value_name = "NAME")]
        suites: Vec<String>,
    },

    /// Remove cached results
    Clean,
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Only run these suites (repeatable)
    #[arg(long = "suite", value_name = "NAME")]
    pub suites: Vec<String>,

    /// Timeout for a whole-suite run, in seconds
    #[arg(long = "suite-timeout", value_name = "SECS")]
    pub suite_timeout: Option<u64>,

    /// Timeout for a single case, in seconds
    #[arg(long = "case-timeout", value_name = "SECS")]
    pub case_timeout: Option<u64>,

    /// Discard cached results before running
    #[arg(long)]
    pub fresh: bool,
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Initialize structured logging with env-based filter
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .try_init();
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    let mut config = crate::config::RunnerConfig::discover(cli.src_dir.as_deref())?;
    if let Some(marker) = cli.marker {
        config = config.with_catalog_marker(marker);
    }

    match cli.command {
        Some(Command::Run(args)) => commands::run_suites(config, &args),
        Some(Command::List { suites }) => commands::list_suites(&config, &suites, &mut io::stdout()),
        Some(Command::Clean) => commands::clean_cache(&config, &mut io::stdout()),
        None => commands::run_suites(config, &RunArgs::default()),
    }
}

// ============================================================================
// Tests
// ============================================================================
