//! On-disk result cache.
//!
//! Each executed unit leaves a `<stem>.out`/`<stem>.err` pair in `Success/` or `Failure/` under the output root.
//! The pair's directory is the unit's cached [`Outcome`]. Runs write their capture into the output root first and
//! [`ResultCache::commit`] moves it into place.
//!
//! A unit with an `.out` marker in both directories is inconsistent; [`ResultCache::lookup`] refuses it instead
//! of picking a side.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::process::RunStatus;

const SUCCESS_DIR: &str = "Success";
const FAILURE_DIR: &str = "Failure";
const OUT_EXT: &str = "out";
const ERR_EXT: &str = "err";

#[derive(Debug, Error, Diagnostic)]
pub enum CacheError {
    #[error("cache I/O failed on `{}`: {source}", path.display())]
    #[diagnostic(code(sanity::cache::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("`{unit}` is cached as both passed (`{}`) and failed (`{}`)", success.display(), failure.display())]
    #[diagnostic(
        code(sanity::cache::conflict),
        help("remove the stale marker, or run `sanity clean` / `sanity run --fresh`")
    )]
    Conflict {
        unit: String,
        success: PathBuf,
        failure: PathBuf,
    },
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Terminal outcome of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Something executed and cached on its own: a whole suite or one of its cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitId {
    Suite(String),
    Case { suite: String, group: String, name: String },
}

impl UnitId {
    pub fn suite(name: impl Into<String>) -> Self {
        UnitId::Suite(name.into())
    }

    pub fn case(suite: impl Into<String>, group: impl Into<String>, name: impl Into<String>) -> Self {
        UnitId::Case {
            suite: suite.into(),
            group: group.into(),
            name: name.into(),
        }
    }

    /// File stem of the unit's capture files.
    pub fn file_stem(&self) -> String {
        match self {
            UnitId::Suite(suite) => suite.clone(),
            UnitId::Case { suite, group, name } => format!("{suite}-{group}-{name}"),
        }
    }

    /// Label used when echoing a failing unit's last query.
    pub fn query_label(&self) -> String {
        match self {
            UnitId::Suite(suite) => suite.clone(),
            UnitId::Case { suite, group, name } => format!("{suite}-{group}.{name}"),
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_stem())
    }
}

/// Paths of one unit's capture files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePaths {
    pub out: PathBuf,
    pub err: PathBuf,
}

impl CapturePaths {
    fn in_dir(dir: &Path, unit: &UnitId) -> Self {
        let stem = unit.file_stem();
        Self {
            out: dir.join(format!("{stem}.{OUT_EXT}")),
            err: dir.join(format!("{stem}.{ERR_EXT}")),
        }
    }
}

/// Number of cached `.out` markers per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounts {
    pub succeeded: usize,
    pub failed: usize,
}

/// The success/failure directory pair under an output root.
#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
    success: PathBuf,
    failure: PathBuf,
}

impl ResultCache {
    /// Open the cache under `root`, creating the directories as needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        let cache = Self {
            success: root.join(SUCCESS_DIR),
            failure: root.join(FAILURE_DIR),
            root,
        };
        for dir in [&cache.success, &cache.failure] {
            fs::create_dir_all(dir).map_err(io_error(dir))?;
        }
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn success_dir(&self) -> &Path {
        &self.success
    }

    pub fn failure_dir(&self) -> &Path {
        &self.failure
    }

    /// Where a fresh run of `unit` writes its capture before commit.
    pub fn scratch_paths(&self, unit: &UnitId) -> CapturePaths {
        CapturePaths::in_dir(&self.root, unit)
    }

    /// Where `unit`'s capture lives once cached with `outcome`.
    pub fn cached_paths(&self, unit: &UnitId, outcome: Outcome) -> CapturePaths {
        let dir = match outcome {
            Outcome::Success => &self.success,
            Outcome::Failure => &self.failure,
        };
        CapturePaths::in_dir(dir, unit)
    }

    /// Cached outcome of `unit`, if any.
    pub fn lookup(&self, unit: &UnitId) -> Result<Option<Outcome>, CacheError> {
        let success = self.cached_paths(unit, Outcome::Success).out;
        let failure = self.cached_paths(unit, Outcome::Failure).out;
        match (success.is_file(), failure.is_file()) {
            (true, true) => Err(CacheError::Conflict {
                unit: unit.to_string(),
                success,
                failure,
            }),
            (true, false) => Ok(Some(Outcome::Success)),
            (false, true) => Ok(Some(Outcome::Failure)),
            (false, false) => Ok(None),
        }
    }

    /// Captured stdout of a cached unit.
    pub fn cached_output(&self, unit: &UnitId, outcome: Outcome) -> Result<String, CacheError> {
        let path = self.cached_paths(unit, outcome).out;
        let bytes = fs::read(&path).map_err(io_error(&path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Move `unit`'s scratch capture into the directory matching `status`.
    ///
    /// Unsuccessful runs get `RETURN STATUS: <code>` appended to their stdout first.
    pub fn commit(&self, unit: &UnitId, status: RunStatus) -> Result<Outcome, CacheError> {
        let scratch = self.scratch_paths(unit);
        let outcome = if status.success() {
            Outcome::Success
        } else {
            let mut out = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&scratch.out)
                .map_err(io_error(&scratch.out))?;
            writeln!(out, "RETURN STATUS: {}", status.code()).map_err(io_error(&scratch.out))?;
            Outcome::Failure
        };

        let target = self.cached_paths(unit, outcome);
        move_file(&scratch.out, &target.out)?;
        move_file(&scratch.err, &target.err)?;
        tracing::debug!(%unit, ?outcome, "cached");
        Ok(outcome)
    }

    /// Count `.out` markers in each outcome directory.
    pub fn counts(&self) -> Result<CacheCounts, CacheError> {
        Ok(CacheCounts {
            succeeded: count_files(&self.success, OUT_EXT)?,
            failed: count_files(&self.failure, OUT_EXT)?,
        })
    }

    /// Remove every capture file from the scratch root and both outcome directories.
    ///
    /// Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for dir in [&self.root, &self.success, &self.failure] {
            for path in capture_files(dir)? {
                fs::remove_file(&path).map_err(io_error(&path))?;
                removed += 1;
            }
        }
        tracing::info!(removed, root = %self.root.display(), "cache cleared");
        Ok(removed)
    }
}

fn move_file(from: &Path, to: &Path) -> Result<(), CacheError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // Cross-device moves cannot rename.
    fs::copy(from, to).map_err(io_error(from))?;
    fs::remove_file(from).map_err(io_error(from))
}

fn capture_files(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        let is_capture = path
            .extension()
            .is_some_and(|ext| ext == OUT_EXT || ext == ERR_EXT);
        if is_capture && path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

fn count_files(dir: &Path, ext: &str) -> Result<usize, CacheError> {
    Ok(capture_files(dir)?
        .iter()
        .filter(|path| path.extension().is_some_and(|e| e == ext))
        .count())
}
