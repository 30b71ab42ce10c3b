//! Repository management and setup utilities
//!
//! Provides functions for creating test repositories and laying out dataset items
//! the way a kart repository stores them.

#![allow(dead_code)]

use kart_status::core::error::{KartStatusError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Test repository setup result containing both the temporary directory
/// and the repository path. The TempDir must be kept alive for the duration
/// of the test to prevent cleanup.
pub struct TestRepo {
    pub temp_dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    /// Get the repository path as a reference
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs git with `args` inside `repo_path`, ignoring its exit status
pub fn git(repo_path: &Path, args: &[&str]) -> Result<()> {
    std::process::Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .map_err(KartStatusError::Io)?;
    Ok(())
}

/// Sets up a fresh repository on branch `main`
///
/// Creates a temporary directory, initializes it as a git repository,
/// and sets up basic git configuration to avoid user prompts.
pub fn setup_test_repo() -> Result<TestRepo> {
    let temp_dir = TempDir::new().map_err(KartStatusError::Io)?;
    let repo_path = temp_dir.path().to_path_buf();

    git(&repo_path, &["init"])?;
    git(&repo_path, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
    git(&repo_path, &["config", "user.name", "Test User"])?;
    git(&repo_path, &["config", "user.email", "test@example.com"])?;

    Ok(TestRepo {
        temp_dir,
        path: repo_path,
    })
}

/// Path of a feature item inside a table dataset
pub fn feature_path(dataset: &str, id: u32) -> String {
    format!("{dataset}/.table-dataset/feature/{id}")
}

/// Writes a feature with a WKT point geometry
pub fn write_feature(repo_path: &Path, dataset: &str, id: u32, geom: &str) -> Result<()> {
    let path = repo_path.join(feature_path(dataset, id));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(KartStatusError::Io)?;
    }
    let content = format!(r#"{{"fid": {id}, "geom": "{geom}"}}"#);
    fs::write(path, content).map_err(KartStatusError::Io)?;
    Ok(())
}

/// Writes the CRS definition of a table dataset to `meta/crs/<identifier>.wkt`
pub fn write_dataset_crs(repo_path: &Path, dataset: &str, identifier: &str, wkt: &str) -> Result<()> {
    let path = repo_path.join(format!("{dataset}/.table-dataset/meta/crs/{identifier}.wkt"));
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(KartStatusError::Io)?;
    }
    fs::write(path, wkt).map_err(KartStatusError::Io)?;
    Ok(())
}

pub fn remove_feature(repo_path: &Path, dataset: &str, id: u32) -> Result<()> {
    fs::remove_file(repo_path.join(feature_path(dataset, id))).map_err(KartStatusError::Io)?;
    Ok(())
}

/// Stages everything and commits
pub fn commit_all(repo_path: &Path, message: &str) -> Result<()> {
    git(repo_path, &["add", "-A"])?;
    git(repo_path, &["commit", "-m", message])?;
    Ok(())
}

pub fn set_config(repo_path: &Path, key: &str, value: &str) -> Result<()> {
    git(repo_path, &["config", key, value])
}
