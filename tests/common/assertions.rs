//! Common assertion helpers for test output validation
//!
//! Provides predicates and helpers for validating kart-status command output.

#![allow(dead_code)]

use assert_cmd::prelude::*;
use predicates::prelude::*;
use serde_json::Value;
use std::path::Path;
use std::process::Command;

/// Creates a predicate that checks for the not-in-a-repository error
pub fn not_in_repo() -> impl Predicate<str> {
    predicates::str::contains("Not in a kart repository")
}

pub fn on_branch(branch: &str) -> impl Predicate<str> {
    predicates::str::starts_with(format!("On branch {branch}"))
}

/// Runs `status -o json` in `repo_path` and returns the status object
pub fn status_json(repo_path: &Path) -> anyhow::Result<Value> {
    let output = Command::cargo_bin("kart-status")?
        .args(["status", "-o", "json"])
        .current_dir(repo_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let document: Value = serde_json::from_slice(&output)?;
    Ok(document["kart.status/v1"].clone())
}
