#![forbid(unsafe_code)]
//! Sequential driver for gtest sanity suites.
//!
//! The suites to run are declared in a CMake list. Each suite binary is first run whole; a suite that fails is
//! re-run one case at a time so the failing cases can be told apart. Every unit's captured output is cached on
//! disk, and a cached unit is never run again until its capture is removed.
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`.
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! ## Modules
//!
//! - `config` - Checkout layout, timeouts and output filters
//! - `suite` - Catalog loading and per-suite resolution
//! - `process` - Subprocess execution and output capture
//! - `cache` - Success/failure result cache
//! - `driver` - The run/cache/escalation loop and its reporter
//! - `cli` - Command line

pub mod cache;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod process;
pub mod suite;

pub use cache::{Outcome, ResultCache, UnitId};
pub use config::RunnerConfig;
pub use driver::{ConsoleReporter, Driver, RunReporter, RunSummary, Verdict};
pub use error::{SanityError, SanityResult};
pub use process::{Invocation, ProcessRunner, RawOutput, RunStatus, SubprocessRunner};
