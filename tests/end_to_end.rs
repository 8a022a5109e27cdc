//! End-to-end run against real executables.
//!
//! The "test binaries" are shell scripts that mimic gtest's exit codes and honour `--gtest_filter`.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;

use sanity::driver::ConsoleReporter;
use sanity::{Driver, RunnerConfig, SubprocessRunner};

fn write_executable(path: &Path, script: &str) {
    fs::write(path, script).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

// A single test so no other thread can fork while the scripts are still open for writing.
#[test]
fn test_catalog_run_with_escalation_and_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("Tests")).unwrap();
    fs::create_dir_all(root.join("build/Tests")).unwrap();
    fs::write(root.join("Tests/CMakeLists.txt"), "set(SANITY_TESTS\n  A\n  B\n)\n").unwrap();
    fs::write(root.join("Tests/A.cpp"), "TEST(Only, one) {}\n").unwrap();
    fs::write(
        root.join("Tests/B.cpp"),
        "TEST(G, t1) {}\nTEST(G, t2) {}\nTEST(G, t3) {}\nTEST(DISABLED_G, t4) {}\n",
    )
    .unwrap();

    write_executable(&root.join("build/Tests/A"), "#!/bin/sh\necho '[  PASSED  ] 1 test.'\nexit 0\n");
    write_executable(
        &root.join("build/Tests/B"),
        "#!/bin/sh\n\
         case \"$1\" in\n\
         --gtest_filter=G.t1) exit 0 ;;\n\
         --gtest_filter=G.t2) echo 'ParserWrapper::ParserWrapper: SELECT 42;'; exit 1 ;;\n\
         --gtest_filter=G.t3) echo started; exec sleep 30 ;;\n\
         esac\n\
         echo 'whole suite failed' 1>&2\n\
         exit 1\n",
    );

    let config = RunnerConfig::new(root).with_case_timeout(Duration::from_millis(500));
    let suites = sanity::suite::load_catalog(&config).unwrap();

    let mut driver = Driver::new(&config, SubprocessRunner, ConsoleReporter::new(Vec::new())).unwrap();
    let summary = driver.run(&suites).unwrap();
    let (_, reporter) = driver.into_parts();
    let transcript = String::from_utf8(reporter.into_inner()).unwrap();

    assert_eq!(
        transcript,
        "sanity_tests: A, B\n\
         Running A..OK\n\
         Running B..FAIL[1]\n\
         Running B test cases one by one:\n  \
         G.t1 (1 of 3)..OK\n  \
         G.t2 (2 of 3)..FAIL[1]\n    \
         QUERY[B-G.t2]: SELECT 42;\n  \
         G.t3 (3 of 3)..TIMEOUT\n\
         SUCCEEDED TESTS COUNT: 2\n\
         FAILED TESTS COUNT: 3\n"
    );
    assert_eq!(summary.failed_units, vec!["B", "B-G-t2", "B-G-t3"]);
    assert_eq!(summary.executed, 5);

    let failure = root.join("build/Tests/Testing/Temporary/Failure");
    assert_eq!(fs::read_to_string(failure.join("B.err")).unwrap(), "whole suite failed\n");
    assert_eq!(
        fs::read_to_string(failure.join("B-G-t3.out")).unwrap(),
        "started\nRETURN STATUS: -99999\n"
    );
}
