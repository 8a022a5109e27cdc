//! Line-oriented scanners used by the `sanity` driver: catalog declarations, gtest case declarations, and the
//! filters applied to captured test output.
//!
//! This crate is intentionally text-only: it never touches the filesystem or spawns processes, so every scanner
//! can be exercised directly from string fixtures.
//!
//! ## Examples
//! ```rust
//! use sanity_scan::{cases, catalog};
//!
//! let suites = catalog::parse_catalog("set(SANITY_TESTS\n  StorageTest\n  ExecuteTest)\n", "SANITY_TESTS").unwrap();
//! assert_eq!(suites, vec!["StorageTest", "ExecuteTest"]);
//!
//! let found = cases::extract_cases("TEST(Select, Basic) {\n}\n", &cases::ScanRules::default()).unwrap();
//! assert_eq!(found.total(), 1);
//! ```

pub mod cases;
pub mod catalog;
pub mod queries;
pub mod sanitize;

pub use cases::{CaseCatalog, CaseGroup, DeclarationError, ScanRules, extract_cases};
pub use catalog::{CatalogError, parse_catalog};
pub use queries::{extract_queries, last_query};
pub use sanitize::{NoiseRule, collapse_noise};
