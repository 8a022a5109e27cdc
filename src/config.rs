//! Run configuration.
//!
//! Defaults describe the layout of a CMake checkout whose sanity suites are declared in
//! `Tests/CMakeLists.txt` and built into `build/Tests`. Relative paths are resolved against `src_dir`.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sanity_scan::{NoiseRule, ScanRules};

use crate::error::{SanityError, SanityResult};

/// Environment variable naming the checkout root.
pub const SRC_DIR_ENV: &str = "SRC_DIR";

/// Run configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Checkout root
    pub src_dir: PathBuf,
    /// Build configuration file holding the suite list
    pub catalog_file: PathBuf,
    /// Name of the list variable in the catalog
    pub catalog_marker: String,
    /// Directories searched, in order, for `<suite>.<source_extension>`
    pub source_dirs: Vec<PathBuf>,
    pub source_extension: String,
    /// Directory holding one binary per suite
    pub binary_dir: PathBuf,
    /// Working directory of every spawned test binary
    pub work_dir: PathBuf,
    /// Scratch root; cached results live in `Success/` and `Failure/` below it
    pub output_root: PathBuf,
    pub suite_timeout: Duration,
    pub case_timeout: Duration,
    /// Flag selecting one case, passed as `<flag>=<group>.<name>`
    pub case_filter_flag: String,
    pub scan: ScanRules,
    /// Filters applied, in order, to captured stdout
    pub noise_rules: Vec<NoiseRule>,
    /// Log prefix of lines carrying the query being processed
    pub query_prefix: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            src_dir: PathBuf::from("."),
            catalog_file: PathBuf::from("Tests/CMakeLists.txt"),
            catalog_marker: "SANITY_TESTS".to_string(),
            source_dirs: vec![PathBuf::from("Tests"), PathBuf::from("Tests/Shared")],
            source_extension: "cpp".to_string(),
            binary_dir: PathBuf::from("build/Tests"),
            work_dir: PathBuf::from("build"),
            output_root: PathBuf::from("build/Tests/Testing/Temporary"),
            suite_timeout: Duration::from_secs(20 * 60),
            case_timeout: Duration::from_secs(7 * 60),
            case_filter_flag: "--gtest_filter".to_string(),
            scan: ScanRules::default(),
            noise_rules: vec![NoiseRule::thrift_transport()],
            query_prefix: "ParserWrapper::ParserWrapper:".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Create a config with default settings rooted at `src_dir`
    pub fn new(src_dir: impl Into<PathBuf>) -> Self {
        Self {
            src_dir: src_dir.into(),
            ..Self::default()
        }
    }

    /// Resolve the checkout root from an explicit path, then `$SRC_DIR`, then the current directory.
    pub fn discover(explicit: Option<&Path>) -> SanityResult<Self> {
        let candidate = match explicit {
            Some(path) => path.to_path_buf(),
            None => env::var_os(SRC_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        if !candidate.is_dir() {
            return Err(SanityError::SourceDirMissing { path: candidate });
        }
        let src_dir = candidate
            .canonicalize()
            .map_err(|_| SanityError::SourceDirMissing { path: candidate.clone() })?;
        tracing::debug!(src_dir = %src_dir.display(), "resolved source directory");
        Ok(Self::new(src_dir))
    }

    pub fn with_catalog_marker(mut self, marker: impl Into<String>) -> Self {
        self.catalog_marker = marker.into();
        self
    }

    pub fn with_suite_timeout(mut self, timeout: Duration) -> Self {
        self.suite_timeout = timeout;
        self
    }

    pub fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = timeout;
        self
    }

    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    pub fn with_scan_rules(mut self, rules: ScanRules) -> Self {
        self.scan = rules;
        self
    }

    pub fn with_noise_rules(mut self, rules: Vec<NoiseRule>) -> Self {
        self.noise_rules = rules;
        self
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.src_dir.join(&self.catalog_file)
    }

    /// Candidate source paths for `suite`, in search order.
    pub fn source_candidates(&self, suite: &str) -> Vec<PathBuf> {
        let file = format!("{suite}.{}", self.source_extension);
        self.source_dirs.iter().map(|dir| self.src_dir.join(dir).join(&file)).collect()
    }

    pub fn binary_path(&self, suite: &str) -> PathBuf {
        self.src_dir.join(&self.binary_dir).join(suite)
    }

    pub fn work_dir_path(&self) -> PathBuf {
        self.src_dir.join(&self.work_dir)
    }

    pub fn output_root_path(&self) -> PathBuf {
        self.src_dir.join(&self.output_root)
    }

    /// Argument selecting a single case.
    pub fn case_filter(&self, group: &str, name: &str) -> String {
        format!("{}={group}.{name}", self.case_filter_flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let config = RunnerConfig::new("/src");
        assert_eq!(config.catalog_path(), PathBuf::from("/src/Tests/CMakeLists.txt"));
        assert_eq!(config.binary_path("StorageTest"), PathBuf::from("/src/build/Tests/StorageTest"));
        assert_eq!(config.work_dir_path(), PathBuf::from("/src/build"));
        assert_eq!(
            config.output_root_path(),
            PathBuf::from("/src/build/Tests/Testing/Temporary")
        );
    }

    #[test]
    fn test_source_candidates_in_search_order() {
        let config = RunnerConfig::new("/src");
        assert_eq!(
            config.source_candidates("StorageTest"),
            vec![
                PathBuf::from("/src/Tests/StorageTest.cpp"),
                PathBuf::from("/src/Tests/Shared/StorageTest.cpp"),
            ]
        );
    }

    #[test]
    fn test_default_timeouts() {
        let config = RunnerConfig::default();
        assert_eq!(config.case_timeout, Duration::from_secs(420));
        assert_eq!(config.suite_timeout, Duration::from_secs(1200));
        assert!(config.suite_timeout > config.case_timeout);
    }

    #[test]
    fn test_case_filter() {
        let config = RunnerConfig::default();
        assert_eq!(config.case_filter("Select", "Basic"), "--gtest_filter=Select.Basic");
    }

    #[test]
    fn test_builder_overrides() {
        let config = RunnerConfig::new("/src")
            .with_catalog_marker("SMOKE_TESTS")
            .with_case_timeout(Duration::from_secs(5))
            .with_output_root("out");
        assert_eq!(config.catalog_marker, "SMOKE_TESTS");
        assert_eq!(config.case_timeout, Duration::from_secs(5));
        assert_eq!(config.output_root_path(), PathBuf::from("/src/out"));
    }

    #[test]
    fn test_discover_rejects_missing_dir() {
        let err = RunnerConfig::discover(Some(Path::new("/definitely/not/here"))).unwrap_err();
        assert!(matches!(err, SanityError::SourceDirMissing { .. }));
    }

    #[test]
    fn test_discover_canonicalizes_explicit_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunnerConfig::discover(Some(dir.path())).unwrap();
        assert_eq!(config.src_dir, dir.path().canonicalize().unwrap());
    }
}
