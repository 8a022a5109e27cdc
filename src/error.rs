//! Fatal errors.
//!
//! Everything here means the run cannot produce a trustworthy verdict: a broken checkout, a missing build
//! artifact, or a cache that contradicts itself. Test failures are never errors; they are outcomes recorded by
//! the driver.

use std::io;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use sanity_scan::{CatalogError, DeclarationError};

use crate::cache::CacheError;
use crate::process::ProcessError;

#[derive(Debug, Error, Diagnostic)]
pub enum SanityError {
    #[error("source directory `{}` does not exist", path.display())]
    #[diagnostic(code(sanity::config::src_dir), help("point SRC_DIR or --src-dir at the checkout root"))]
    SourceDirMissing { path: PathBuf },

    #[error("working directory `{}` does not exist", path.display())]
    #[diagnostic(code(sanity::config::work_dir), help("build the test suites before running them"))]
    WorkDirMissing { path: PathBuf },

    #[error("failed to read `{}`", path.display())]
    #[diagnostic(code(sanity::io))]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid catalog in `{}`", path.display())]
    #[diagnostic(code(sanity::catalog))]
    Catalog {
        path: PathBuf,
        #[source]
        #[diagnostic_source]
        source: CatalogError,
    },

    #[error("suite `{suite}` is not declared in the catalog")]
    #[diagnostic(code(sanity::catalog::unknown_suite))]
    UnknownSuite { suite: String },

    #[error("no source file for suite `{suite}` (looked for {candidates})")]
    #[diagnostic(code(sanity::suite::source))]
    SuiteSourceMissing { suite: String, candidates: String },

    #[error("test binary for suite `{suite}` not found at `{}`", path.display())]
    #[diagnostic(code(sanity::suite::binary), help("build the test suites before running them"))]
    SuiteBinaryMissing { suite: String, path: PathBuf },

    #[error("malformed test declaration in `{}`", path.display())]
    #[diagnostic(code(sanity::suite::declaration))]
    Declaration {
        path: PathBuf,
        #[source]
        #[diagnostic_source]
        source: DeclarationError,
    },

    #[error("could not run `{unit}`")]
    #[diagnostic(code(sanity::process))]
    Process {
        unit: String,
        #[source]
        source: ProcessError,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),
}

pub type SanityResult<T> = Result<T, SanityError>;
