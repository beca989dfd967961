//! Integration tests for ferrule
//!
//! These tests run real toolchains (python3, node, g++, javac/java). Each test
//! skips itself when a program it needs is not on PATH.
//! Run with: cargo test -p ferrule --features integration-tests

#![cfg(feature = "integration-tests")]

use std::fs;
use std::path::Path;

use ferrule::{Config, Runner};

mod compilation;
mod config_loading;
mod languages;
mod timeouts;
mod workspace_cleanup;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

/// Default language table with workspaces created under `scratch_root`
pub(crate) fn test_config(scratch_root: &Path) -> Config {
    let mut config = Config::default();
    config.scratch_root = Some(scratch_root.to_path_buf());
    config
}

pub(crate) fn test_runner(scratch_root: &Path) -> Runner {
    Runner::new(test_config(scratch_root))
}

/// Whether every program is on PATH; logs the missing one otherwise
pub(crate) fn tools_available(programs: &[&str]) -> bool {
    let path = std::env::var_os("PATH").unwrap_or_default();
    for program in programs {
        let found = std::env::split_paths(&path).any(|dir| dir.join(program).is_file());
        if !found {
            eprintln!("skipping: {program} not found on PATH");
            return false;
        }
    }
    true
}

/// Number of entries left in the scratch root
pub(crate) fn leftover_workspaces(scratch_root: &Path) -> usize {
    fs::read_dir(scratch_root).map(|dir| dir.count()).unwrap_or(0)
}
