//! Smoke tests for the sage binary.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("sage")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("stats"))
        .stdout(predicate::str::contains("clear"));
}

#[test]
fn missing_subcommand_fails() {
    Command::cargo_bin("sage").unwrap().assert().failure();
}

#[test]
fn unknown_subcommand_fails() {
    Command::cargo_bin("sage")
        .unwrap()
        .arg("frobnicate")
        .assert()
        .failure();
}

#[test]
fn missing_config_file_fails() {
    Command::cargo_bin("sage")
        .unwrap()
        .args(["--config", "/nonexistent/sage.toml", "stats"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}
