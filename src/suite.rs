//! Suites: catalog loading and per-suite resolution of source, binary, and cases.

use std::fs;
use std::path::{Path, PathBuf};

use sanity_scan::{CaseCatalog, extract_cases, parse_catalog};

use crate::config::RunnerConfig;
use crate::error::{SanityError, SanityResult};

/// A compiled test binary and the source it was built from.
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub source: PathBuf,
    pub binary: PathBuf,
    pub cases: CaseCatalog,
}

impl Suite {
    /// Locate `name`'s source and binary and extract its enabled cases.
    pub fn resolve(config: &RunnerConfig, name: &str) -> SanityResult<Self> {
        let candidates = config.source_candidates(name);
        let Some(source) = candidates.iter().find(|path| path.is_file()).cloned() else {
            let candidates = candidates
                .iter()
                .map(|p| format!("`{}`", p.display()))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(SanityError::SuiteSourceMissing {
                suite: name.to_string(),
                candidates,
            });
        };

        let text = read(&source)?;
        let cases = extract_cases(&text, &config.scan).map_err(|source_err| SanityError::Declaration {
            path: source.clone(),
            source: source_err,
        })?;

        let binary = config.binary_path(name);
        if !binary.is_file() {
            return Err(SanityError::SuiteBinaryMissing {
                suite: name.to_string(),
                path: binary,
            });
        }

        Ok(Self {
            name: name.to_string(),
            source,
            binary,
            cases,
        })
    }
}

/// Read the catalog and return the declared suite names in order.
pub fn load_catalog(config: &RunnerConfig) -> SanityResult<Vec<String>> {
    let path = config.catalog_path();
    let text = read(&path)?;
    parse_catalog(&text, &config.catalog_marker).map_err(|source| SanityError::Catalog { path, source })
}

/// Restrict `suites` to `selected`, keeping catalog order.
pub fn select_suites(suites: Vec<String>, selected: &[String]) -> SanityResult<Vec<String>> {
    if selected.is_empty() {
        return Ok(suites);
    }
    if let Some(unknown) = selected.iter().find(|name| !suites.contains(name)) {
        return Err(SanityError::UnknownSuite { suite: unknown.clone() });
    }
    Ok(suites.into_iter().filter(|name| selected.contains(name)).collect())
}

fn read(path: &Path) -> SanityResult<String> {
    fs::read_to_string(path).map_err(|source| SanityError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkout() -> (tempfile::TempDir, RunnerConfig) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("Tests/Shared")).unwrap();
        fs::create_dir_all(dir.path().join("build/Tests")).unwrap();
        let config = RunnerConfig::new(dir.path());
        (dir, config)
    }

    #[test]
    fn test_resolve_falls_back_to_shared_sources() {
        let (dir, config) = checkout();
        fs::write(dir.path().join("Tests/Shared/Util.cpp"), "TEST(Str, Split) {}\n").unwrap();
        fs::write(dir.path().join("build/Tests/Util"), "").unwrap();

        let suite = Suite::resolve(&config, "Util").unwrap();
        assert_eq!(suite.source, dir.path().join("Tests/Shared/Util.cpp"));
        assert_eq!(suite.binary, dir.path().join("build/Tests/Util"));
        assert_eq!(suite.cases.run_order(), vec![("Str", "Split")]);
    }

    #[test]
    fn test_resolve_prefers_primary_source_dir() {
        let (dir, config) = checkout();
        fs::write(dir.path().join("Tests/Dup.cpp"), "TEST(A, primary) {}\n").unwrap();
        fs::write(dir.path().join("Tests/Shared/Dup.cpp"), "TEST(A, shared) {}\n").unwrap();
        fs::write(dir.path().join("build/Tests/Dup"), "").unwrap();

        let suite = Suite::resolve(&config, "Dup").unwrap();
        assert_eq!(suite.cases.run_order(), vec![("A", "primary")]);
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let (_dir, config) = checkout();
        let err = Suite::resolve(&config, "Ghost").unwrap_err();
        assert!(matches!(err, SanityError::SuiteSourceMissing { ref suite, .. } if suite == "Ghost"));
    }

    #[test]
    fn test_missing_binary_is_fatal() {
        let (dir, config) = checkout();
        fs::write(dir.path().join("Tests/NoBin.cpp"), "").unwrap();
        let err = Suite::resolve(&config, "NoBin").unwrap_err();
        assert!(matches!(err, SanityError::SuiteBinaryMissing { .. }));
    }

    #[test]
    fn test_malformed_declaration_is_fatal() {
        let (dir, config) = checkout();
        fs::write(dir.path().join("Tests/Bad.cpp"), "TEST(Split,\n  Across) {}\n").unwrap();
        fs::write(dir.path().join("build/Tests/Bad"), "").unwrap();
        let err = Suite::resolve(&config, "Bad").unwrap_err();
        assert!(matches!(err, SanityError::Declaration { .. }));
    }

    #[test]
    fn test_load_catalog() {
        let (dir, config) = checkout();
        fs::write(dir.path().join("Tests/CMakeLists.txt"), "set(SANITY_TESTS A B)\n").unwrap();
        assert_eq!(load_catalog(&config).unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_load_catalog_without_marker_is_fatal() {
        let (dir, config) = checkout();
        fs::write(dir.path().join("Tests/CMakeLists.txt"), "project(Tests)\n").unwrap();
        assert!(matches!(load_catalog(&config).unwrap_err(), SanityError::Catalog { .. }));
    }

    #[test]
    fn test_select_suites() {
        let all = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        assert_eq!(
            select_suites(all.clone(), &["C".to_string(), "A".to_string()]).unwrap(),
            vec!["A", "C"]
        );
        assert_eq!(select_suites(all.clone(), &[]).unwrap(), all);
        assert!(matches!(
            select_suites(all, &["Z".to_string()]).unwrap_err(),
            SanityError::UnknownSuite { .. }
        ));
    }
}
