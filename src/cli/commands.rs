//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.
//! Commands that print take their output sink as a parameter.

use std::io::Write;
use std::time::Duration;

use crate::cache::ResultCache;
use crate::config::RunnerConfig;
use crate::driver::{ConsoleReporter, Driver, RunReporter};
use crate::error::SanityError;
use crate::process::{ProcessRunner, SubprocessRunner};
use crate::suite::{Suite, load_catalog, select_suites};

use super::{CliResult, ExitCode, RunArgs};

/// Run the catalog with real subprocesses, printing progress to stdout.
pub fn run_suites(config: RunnerConfig, args: &RunArgs) -> CliResult<ExitCode> {
    run_suites_with(config, args, SubprocessRunner, ConsoleReporter::stdout())
}

/// Run the catalog and map the outcome to an exit code.
pub fn run_suites_with<R: ProcessRunner, P: RunReporter>(
    mut config: RunnerConfig,
    args: &RunArgs,
    runner: R,
    reporter: P,
) -> CliResult<ExitCode> {
    if let Some(secs) = args.suite_timeout {
        config = config.with_suite_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = args.case_timeout {
        config = config.with_case_timeout(Duration::from_secs(secs));
    }

    let suites = select_suites(load_catalog(&config)?, &args.suites)?;
    let mut driver = Driver::new(&config, runner, reporter)?;
    if args.fresh {
        driver.cache().clear().map_err(SanityError::from)?;
    }

    let summary = driver.run(&suites)?;
    if summary.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::info!(failed = ?summary.failed_units, "run finished with failures");
        Ok(ExitCode::FAILURE)
    }
}

/// Print each suite followed by its cases in run order.
pub fn list_suites<W: Write>(config: &RunnerConfig, selected: &[String], out: &mut W) -> CliResult<ExitCode> {
    let suites = select_suites(load_catalog(config)?, selected)?;
    for name in &suites {
        let suite = Suite::resolve(config, name)?;
        writeln!(out, "{} ({} cases)", suite.name, suite.cases.total())?;
        for (group, case) in suite.cases.run_order() {
            writeln!(out, "  {group}.{case}")?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Remove every cached capture.
pub fn clean_cache<W: Write>(config: &RunnerConfig, out: &mut W) -> CliResult<ExitCode> {
    let cache = ResultCache::open(config.output_root_path()).map_err(SanityError::from)?;
    let removed = cache.clear().map_err(SanityError::from)?;
    writeln!(out, "removed {removed} cached file(s) from {}", cache.root().display())?;
    Ok(ExitCode::SUCCESS)
}
