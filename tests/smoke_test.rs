//! Smoke tests for the seebeads CLI.

mod common;

use assert_cmd::Command;
use common::TestEnv;
use predicates::prelude::*;

fn seebeads() -> Command {
    Command::new(env!("CARGO_BIN_EXE_seebeads"))
}

#[test]
fn test_version_flag() {
    seebeads()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("seebeads"));
}

#[test]
fn test_help_flag() {
    seebeads()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("epics"));
}

#[test]
fn test_version_command_outputs_json() {
    let env = TestEnv::new();
    env.seebeads()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\""))
        .stdout(predicate::str::contains("\"commit\""));
}

#[test]
fn test_invalid_command() {
    seebeads()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_beads_dir_fails_with_json_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("nowhere");
    seebeads()
        .args(["-C", missing.to_str().unwrap(), "stats"])
        .env_remove("SEEBEADS_DIR")
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
}

#[test]
fn test_empty_beads_dir_reports_not_found() {
    let env = TestEnv::new();
    env.seebeads()
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no beads data file"));
}
