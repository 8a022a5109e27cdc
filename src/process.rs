//! Subprocess execution with a wall-clock timeout, and the capture step that turns raw output into the scratch
//! `.out`/`.err` files.
//!
//! ## ProcessRunner Trait
//!
//! The driver only sees [`ProcessRunner`]. [`SubprocessRunner`] spawns real binaries; tests substitute scripted
//! runners so the run/cache/escalation loop can be exercised without a build tree.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use sanity_scan::{NoiseRule, collapse_noise, extract_queries};
use thiserror::Error;

/// Exit code recorded for a unit that hit its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = -99999;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to keep draining pipes once the child is gone.
const DRAIN_AFTER_EXIT: Duration = Duration::from_secs(2);
const DRAIN_AFTER_KILL: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to spawn `{}`: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for `{}`: {source}", program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write `{}`: {source}", path.display())]
    Capture {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A command line to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

/// How a unit's process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Exited(i32),
    TimedOut,
}

impl RunStatus {
    pub fn success(self) -> bool {
        self == RunStatus::Exited(0)
    }

    /// Numeric status; a timeout reports [`TIMEOUT_EXIT_CODE`].
    pub fn code(self) -> i32 {
        match self {
            RunStatus::Exited(code) => code,
            RunStatus::TimedOut => TIMEOUT_EXIT_CODE,
        }
    }

    fn from_exit(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return RunStatus::Exited(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return RunStatus::Exited(-signal);
            }
        }
        RunStatus::Exited(-1)
    }
}

/// Everything a finished (or killed) process produced.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub status: RunStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Executes invocations. Implementations must return partial output when the timeout fires.
pub trait ProcessRunner {
    fn run(&mut self, invocation: &Invocation, timeout: Duration) -> Result<RawOutput, ProcessError>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &mut R {
    fn run(&mut self, invocation: &Invocation, timeout: Duration) -> Result<RawOutput, ProcessError> {
        (**self).run(invocation, timeout)
    }
}

/// Runs invocations as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SubprocessRunner;

impl ProcessRunner for SubprocessRunner {
    fn run(&mut self, invocation: &Invocation, timeout: Duration) -> Result<RawOutput, ProcessError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        tracing::debug!(program = %invocation.program.display(), args = ?invocation.args, pid = child.id(), "spawned");

        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let wait_error = |source| ProcessError::Wait {
            program: invocation.program.clone(),
            source,
        };
        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(wait_error)? {
                break RunStatus::from_exit(status);
            }
            if started.elapsed() >= timeout {
                tracing::warn!(program = %invocation.program.display(), ?timeout, "timed out, killing");
                let _ = child.kill();
                child.wait().map_err(wait_error)?;
                break RunStatus::TimedOut;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let window = match status {
            RunStatus::TimedOut => DRAIN_AFTER_KILL,
            RunStatus::Exited(_) => DRAIN_AFTER_EXIT,
        };
        let deadline = Instant::now() + window;
        Ok(RawOutput {
            status,
            stdout: stdout_reader.map(|r| r.finish(deadline)).unwrap_or_default(),
            stderr: stderr_reader.map(|r| r.finish(deadline)).unwrap_or_default(),
        })
    }
}

/// A pipe being read on its own thread.
struct PipeReader {
    chunks: Receiver<Vec<u8>>,
    handle: JoinHandle<()>,
}

/// Forward chunks from `source` as they arrive, so a killed process still leaves its partial output behind.
fn spawn_reader<R: Read + Send + 'static>(mut source: R) -> PipeReader {
    let (tx, chunks) = mpsc::channel();
    let handle = thread::spawn(move || {
        let mut chunk = [0u8; 8192];
        loop {
            match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    });
    PipeReader { chunks, handle }
}

impl PipeReader {
    /// Collect output until the pipe closes or `deadline` passes.
    ///
    /// A closed pipe means the reader thread is done and it is joined. A pipe still open at the deadline is held
    /// by a process that outlived the child (typically a daemonized grandchild); its reader stays detached and
    /// exits once that process closes the pipe, since a blocking read cannot be cancelled.
    fn finish(self, deadline: Instant) -> Vec<u8> {
        let mut buffer = Vec::new();
        let closed = loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.chunks.recv_timeout(remaining) {
                Ok(chunk) => buffer.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => {
                    for chunk in self.chunks.try_iter() {
                        buffer.extend_from_slice(&chunk);
                    }
                    break false;
                }
                Err(RecvTimeoutError::Disconnected) => break true,
            }
        };
        if closed {
            let _ = self.handle.join();
        } else {
            tracing::warn!("output pipe still open after the child exited, leaving its reader detached");
        }
        buffer
    }
}

/// Output filters applied when capturing.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFilters<'a> {
    pub noise_rules: &'a [NoiseRule],
    pub query_prefix: &'a str,
}

/// Result of a captured run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    pub status: RunStatus,
    /// Queries logged by the process; only collected when it did not succeed.
    pub queries: Option<Vec<String>>,
}

/// Write sanitized stdout to `out_path` and raw stderr to `err_path`.
///
/// Queries are extracted from the unsanitized stdout of unsuccessful runs.
pub fn capture(
    output: &RawOutput,
    out_path: &Path,
    err_path: &Path,
    filters: CaptureFilters<'_>,
) -> Result<Captured, ProcessError> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let sanitized = filters
        .noise_rules
        .iter()
        .fold(stdout.to_string(), |text, rule| collapse_noise(&text, rule));

    write_file(out_path, sanitized.as_bytes())?;
    write_file(err_path, &output.stderr)?;

    let queries = (!output.status.success()).then(|| extract_queries(&stdout, filters.query_prefix));
    Ok(Captured {
        status: output.status,
        queries,
    })
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ProcessError> {
    fs::write(path, contents).map_err(|source| ProcessError::Capture {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(rules: &[NoiseRule]) -> CaptureFilters<'_> {
        CaptureFilters {
            noise_rules: rules,
            query_prefix: "ParserWrapper::ParserWrapper:",
        }
    }

    #[test]
    fn test_status_codes() {
        assert!(RunStatus::Exited(0).success());
        assert!(!RunStatus::Exited(1).success());
        assert!(!RunStatus::TimedOut.success());
        assert_eq!(RunStatus::Exited(3).code(), 3);
        assert_eq!(RunStatus::TimedOut.code(), TIMEOUT_EXIT_CODE);
    }

    #[test]
    fn test_invocation_builder() {
        let inv = Invocation::new("/bin/Suite").arg("--gtest_filter=G.n").current_dir("/build");
        assert_eq!(inv.args, vec!["--gtest_filter=G.n"]);
        assert_eq!(inv.cwd, Some(PathBuf::from("/build")));
    }

    #[test]
    fn test_capture_sanitizes_stdout_and_keeps_stderr_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("S.out");
        let err = dir.path().join("S.err");
        let output = RawOutput {
            status: RunStatus::Exited(0),
            stdout: b"Thrift error occurred during processing of message.\n  at x\ndone\n".to_vec(),
            stderr: vec![0xff, b'e', b'\n'],
        };
        let rules = [NoiseRule::thrift_transport()];
        let captured = capture(&output, &out, &err, filters(&rules)).unwrap();

        assert_eq!(captured.queries, None);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "Thrift error occurred during processing of message.  .....\ndone\n"
        );
        assert_eq!(fs::read(&err).unwrap(), vec![0xff, b'e', b'\n']);
    }

    #[test]
    fn test_capture_extracts_queries_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let output = RawOutput {
            status: RunStatus::TimedOut,
            stdout: b"ParserWrapper::ParserWrapper: SELECT 1;\nParserWrapper::ParserWrapper: SELECT 2;\n".to_vec(),
            stderr: Vec::new(),
        };
        let captured = capture(
            &output,
            &dir.path().join("a.out"),
            &dir.path().join("a.err"),
            filters(&[]),
        )
        .unwrap();
        assert_eq!(captured.status, RunStatus::TimedOut);
        assert_eq!(
            captured.queries,
            Some(vec!["SELECT 1;".to_string(), "SELECT 2;".to_string()])
        );
    }

    #[cfg(unix)]
    mod subprocess {
        use super::super::*;

        fn sh(script: &str) -> Invocation {
            Invocation::new("/bin/sh").arg("-c").arg(script)
        }

        #[test]
        fn test_exit_code_and_streams() {
            let output = SubprocessRunner
                .run(&sh("echo out; echo err 1>&2; exit 3"), Duration::from_secs(30))
                .unwrap();
            assert_eq!(output.status, RunStatus::Exited(3));
            assert_eq!(output.stdout, b"out\n");
            assert_eq!(output.stderr, b"err\n");
        }

        #[test]
        fn test_success() {
            let output = SubprocessRunner.run(&sh("true"), Duration::from_secs(30)).unwrap();
            assert!(output.status.success());
        }

        #[test]
        fn test_timeout_keeps_partial_output() {
            let started = Instant::now();
            let output = SubprocessRunner
                .run(&sh("echo before; exec sleep 30"), Duration::from_millis(300))
                .unwrap();
            assert_eq!(output.status, RunStatus::TimedOut);
            assert_eq!(output.stdout, b"before\n");
            assert!(started.elapsed() < Duration::from_secs(20));
        }

        #[test]
        fn test_background_holder_of_stdout_does_not_block() {
            let started = Instant::now();
            let output = SubprocessRunner
                .run(&sh("echo parent; sleep 5 & exit 0"), Duration::from_secs(30))
                .unwrap();
            assert_eq!(output.status, RunStatus::Exited(0));
            assert_eq!(output.stdout, b"parent\n");
            assert!(started.elapsed() < Duration::from_secs(5));
        }

        #[test]
        fn test_signal_is_negated() {
            let output = SubprocessRunner.run(&sh("kill -9 $$"), Duration::from_secs(30)).unwrap();
            assert_eq!(output.status, RunStatus::Exited(-9));
        }

        #[test]
        fn test_runs_in_working_directory() {
            let dir = tempfile::tempdir().unwrap();
            let expected = dir.path().canonicalize().unwrap();
            let output = SubprocessRunner
                .run(&sh("pwd -P").current_dir(dir.path()), Duration::from_secs(30))
                .unwrap();
            assert_eq!(String::from_utf8(output.stdout).unwrap().trim(), expected.to_str().unwrap());
        }

        #[test]
        fn test_missing_program_is_spawn_error() {
            let err = SubprocessRunner
                .run(&Invocation::new("/no/such/binary"), Duration::from_secs(1))
                .unwrap_err();
            assert!(matches!(err, ProcessError::Spawn { .. }));
        }
    }
}
