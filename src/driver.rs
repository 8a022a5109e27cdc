//! The run/cache/escalation loop.
//!
//! Suites are taken from a queue in catalog order and first run whole. A suite whose whole run fails, freshly
//! or from cache, is counted as failed and re-queued in one-by-one mode, where each enabled case runs on its own
//! with its own cache entry. Every case is attempted; a failing case never stops the rest of its suite.
//!
//! ## RunReporter Trait
//!
//! Console output goes through [`RunReporter`], which separates the verdict lines from the loop itself.
//! [`ConsoleReporter`] prints the classic progress format.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use sanity_scan::last_query;

use crate::cache::{CacheCounts, Outcome, ResultCache, UnitId};
use crate::config::RunnerConfig;
use crate::error::{SanityError, SanityResult};
use crate::process::{CaptureFilters, Captured, Invocation, ProcessRunner, RunStatus, capture};
use crate::suite::Suite;

// ============================================================================
// Verdicts and reporting
// ============================================================================

/// Console verdict of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    PassedCached,
    Failed(i32),
    FailedCached,
    TimedOut,
}

impl Verdict {
    pub fn is_failure(self) -> bool {
        !matches!(self, Verdict::Passed | Verdict::PassedCached)
    }

    fn from_status(status: RunStatus) -> Self {
        match status {
            RunStatus::Exited(0) => Verdict::Passed,
            RunStatus::Exited(code) => Verdict::Failed(code),
            RunStatus::TimedOut => Verdict::TimedOut,
        }
    }

    fn from_cache(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => Verdict::PassedCached,
            Outcome::Failure => Verdict::FailedCached,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => f.write_str("OK"),
            Verdict::PassedCached => f.write_str("OK (cached)"),
            Verdict::Failed(code) => write!(f, "FAIL[{code}]"),
            Verdict::FailedCached => f.write_str("FAIL (cached)"),
            Verdict::TimedOut => f.write_str("TIMEOUT"),
        }
    }
}

/// Position of a case within its suite's one-by-one sweep (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Units that failed, in the order they failed
    pub failed_units: Vec<String>,
    /// `.out` markers in the cache after the run
    pub counts: CacheCounts,
    /// Number of processes spawned
    pub executed: usize,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed_units.is_empty()
    }
}

/// Trait for reporting run progress.
///
/// Implement this trait to customize the output format.
pub trait RunReporter {
    /// Called once with the suites about to run
    fn on_catalog(&mut self, _suites: &[String]) {}

    /// Called before a suite's cases are run one by one
    fn on_escalation(&mut self, _suite: &str) {}

    /// Called before a unit's cache lookup
    fn on_unit_start(&mut self, unit: &UnitId, progress: Option<Progress>);

    /// Called with a unit's verdict and, for failures, the last query it logged
    fn on_unit_complete(&mut self, unit: &UnitId, verdict: Verdict, query: Option<&str>);

    /// Called when the queue is empty
    fn on_run_complete(&mut self, summary: &RunSummary);
}

impl<P: RunReporter + ?Sized> RunReporter for &mut P {
    fn on_catalog(&mut self, suites: &[String]) {
        (**self).on_catalog(suites)
    }

    fn on_escalation(&mut self, suite: &str) {
        (**self).on_escalation(suite)
    }

    fn on_unit_start(&mut self, unit: &UnitId, progress: Option<Progress>) {
        (**self).on_unit_start(unit, progress)
    }

    fn on_unit_complete(&mut self, unit: &UnitId, verdict: Verdict, query: Option<&str>) {
        (**self).on_unit_complete(unit, verdict, query)
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        (**self).on_run_complete(summary)
    }
}

/// Line-oriented progress output.
pub struct ConsoleReporter<W: Write = io::Stdout> {
    out: W,
}

impl ConsoleReporter {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // Write errors on the console are ignored.
    fn emit(&mut self, args: fmt::Arguments<'_>) {
        let _ = self.out.write_fmt(args);
        let _ = self.out.flush();
    }
}

impl<W: Write> RunReporter for ConsoleReporter<W> {
    fn on_catalog(&mut self, suites: &[String]) {
        self.emit(format_args!("sanity_tests: {}\n", suites.join(", ")));
    }

    fn on_escalation(&mut self, suite: &str) {
        self.emit(format_args!("Running {suite} test cases one by one:\n"));
    }

    fn on_unit_start(&mut self, unit: &UnitId, progress: Option<Progress>) {
        match (unit, progress) {
            (UnitId::Case { group, name, .. }, Some(p)) => {
                self.emit(format_args!("  {group}.{name} ({} of {})..", p.index, p.total))
            }
            (UnitId::Case { group, name, .. }, None) => self.emit(format_args!("  {group}.{name}..")),
            (UnitId::Suite(suite), _) => self.emit(format_args!("Running {suite}..")),
        }
    }

    fn on_unit_complete(&mut self, unit: &UnitId, verdict: Verdict, query: Option<&str>) {
        self.emit(format_args!("{verdict}\n"));
        if let Some(query) = query {
            self.emit(format_args!("    QUERY[{}]: {query}\n", unit.query_label()));
        }
    }

    fn on_run_complete(&mut self, summary: &RunSummary) {
        self.emit(format_args!("SUCCEEDED TESTS COUNT: {}\n", summary.counts.succeeded));
        self.emit(format_args!("FAILED TESTS COUNT: {}\n", summary.counts.failed));
    }
}

// ============================================================================
// Driver
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    WholeSuite,
    OneByOne,
}

#[derive(Debug)]
struct Scheduled {
    suite: String,
    mode: Mode,
}

/// Sequential driver over a [`ProcessRunner`] and a [`RunReporter`].
pub struct Driver<'a, R, P> {
    config: &'a RunnerConfig,
    cache: ResultCache,
    runner: R,
    reporter: P,
    failed: Vec<String>,
    executed: usize,
}

impl<'a, R: ProcessRunner, P: RunReporter> Driver<'a, R, P> {
    /// Open the cache under the configured output root.
    pub fn new(config: &'a RunnerConfig, runner: R, reporter: P) -> SanityResult<Self> {
        let work_dir = config.work_dir_path();
        if !work_dir.is_dir() {
            return Err(SanityError::WorkDirMissing { path: work_dir });
        }
        let cache = ResultCache::open(config.output_root_path())?;
        Ok(Self {
            config,
            cache,
            runner,
            reporter,
            failed: Vec::new(),
            executed: 0,
        })
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn into_parts(self) -> (R, P) {
        (self.runner, self.reporter)
    }

    /// Run `suites` to completion. Test failures end up in the summary; only fatal errors return `Err`.
    pub fn run(&mut self, suites: &[String]) -> SanityResult<RunSummary> {
        self.reporter.on_catalog(suites);
        let mut queue: VecDeque<Scheduled> = suites
            .iter()
            .map(|suite| Scheduled {
                suite: suite.clone(),
                mode: Mode::WholeSuite,
            })
            .collect();

        while let Some(next) = queue.pop_front() {
            let suite = Suite::resolve(self.config, &next.suite)?;
            match next.mode {
                Mode::WholeSuite => {
                    if self.run_whole(&suite)?.is_failure() {
                        tracing::info!(suite = %suite.name, cases = suite.cases.total(), "escalating to one-by-one");
                        queue.push_back(Scheduled {
                            suite: next.suite,
                            mode: Mode::OneByOne,
                        });
                    }
                }
                Mode::OneByOne => self.run_one_by_one(&suite)?,
            }
        }

        let summary = RunSummary {
            failed_units: std::mem::take(&mut self.failed),
            counts: self.cache.counts()?,
            executed: self.executed,
        };
        self.reporter.on_run_complete(&summary);
        Ok(summary)
    }

    fn run_whole(&mut self, suite: &Suite) -> SanityResult<Verdict> {
        let unit = UnitId::suite(&suite.name);
        let invocation = Invocation::new(&suite.binary).current_dir(self.config.work_dir_path());
        self.run_unit(&unit, None, &invocation, self.config.suite_timeout)
    }

    fn run_one_by_one(&mut self, suite: &Suite) -> SanityResult<()> {
        self.reporter.on_escalation(&suite.name);
        let total = suite.cases.total();
        for (idx, (group, name)) in suite.cases.run_order().into_iter().enumerate() {
            let unit = UnitId::case(&suite.name, group, name);
            let invocation = Invocation::new(&suite.binary)
                .arg(self.config.case_filter(group, name))
                .current_dir(self.config.work_dir_path());
            let progress = Progress { index: idx + 1, total };
            self.run_unit(&unit, Some(progress), &invocation, self.config.case_timeout)?;
        }
        Ok(())
    }

    /// Consult the cache, run on a miss, commit, report. Failures are recorded in `self.failed`.
    fn run_unit(
        &mut self,
        unit: &UnitId,
        progress: Option<Progress>,
        invocation: &Invocation,
        timeout: Duration,
    ) -> SanityResult<Verdict> {
        self.reporter.on_unit_start(unit, progress);

        let (verdict, query) = match self.cache.lookup(unit)? {
            Some(outcome) => {
                let query = match outcome {
                    Outcome::Failure => {
                        let cached = self.cache.cached_output(unit, outcome)?;
                        last_query(&cached, &self.config.query_prefix)
                    }
                    Outcome::Success => None,
                };
                (Verdict::from_cache(outcome), query)
            }
            None => {
                let captured = self.execute(unit, invocation, timeout)?;
                self.cache.commit(unit, captured.status)?;
                let query = captured.queries.and_then(|mut queries| queries.pop());
                (Verdict::from_status(captured.status), query)
            }
        };

        if verdict.is_failure() {
            self.failed.push(unit.file_stem());
        }
        self.reporter.on_unit_complete(unit, verdict, query.as_deref());
        Ok(verdict)
    }

    fn execute(
        &mut self,
        unit: &UnitId,
        invocation: &Invocation,
        timeout: Duration,
    ) -> SanityResult<Captured> {
        let process_error = |source| SanityError::Process {
            unit: unit.to_string(),
            source,
        };
        self.executed += 1;
        let output = self.runner.run(invocation, timeout).map_err(process_error)?;
        let scratch = self.cache.scratch_paths(unit);
        let filters = CaptureFilters {
            noise_rules: &self.config.noise_rules,
            query_prefix: &self.config.query_prefix,
        };
        capture(&output, &scratch.out, &scratch.err, filters).map_err(process_error)
    }
}
