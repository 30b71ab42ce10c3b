//! Working copies and the diff between a working copy and HEAD.
//!
//! [`WorkingCopy::diff_to_tree`] returns an owned [`RepoDiff`] snapshot, so a single
//! status computation never observes the working copy twice.
//!
//! [`WorkdirWorkingCopy`] treats the repository's working directory as the materialised
//! working copy: every dataset item is a file at its tree path, and the diff is git's
//! tree-to-workdir diff decoded into dataset deltas.

use crate::core::diff::{decode_value, DatasetItemPath, Delta, DeltaKind, RepoDiff};
use crate::core::error::{KartStatusError, Result};
use git2::{Delta as GitDelta, DiffOptions, Oid, Repository};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub trait WorkingCopy {
    /// Human readable location, shown as `workingCopy.path`
    fn location(&self) -> String;

    /// Takes one snapshot of the changes relative to HEAD
    fn diff_to_tree(&self) -> Result<RepoDiff>;
}

pub struct WorkdirWorkingCopy<'r> {
    repo: &'r Repository,
    workdir: PathBuf,
    location: String,
}

impl<'r> WorkdirWorkingCopy<'r> {
    /// `None` for bare repositories
    pub fn open(repo: &'r Repository, location: Option<String>) -> Option<Self> {
        let workdir = repo.workdir()?.to_path_buf();
        let location = location.unwrap_or_else(|| workdir.display().to_string());
        Some(Self {
            repo,
            workdir,
            location,
        })
    }

    fn read_blob(&self, id: Oid) -> Result<Value> {
        let blob = self.repo.find_blob(id)?;
        Ok(decode_value(blob.content()))
    }

    fn read_file(&self, path: &Path) -> Result<Value> {
        let full_path = self.workdir.join(path);
        let bytes = fs::read(&full_path)
            .map_err(|e| KartStatusError::working_copy_read(&full_path, e))?;
        Ok(decode_value(&bytes))
    }
}

impl WorkingCopy for WorkdirWorkingCopy<'_> {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn diff_to_tree(&self) -> Result<RepoDiff> {
        let head_tree = self.repo.head()?.peel_to_tree()?;

        let mut opts = DiffOptions::new();
        opts.include_untracked(true).recurse_untracked_dirs(true);
        let git_diff = self
            .repo
            .diff_tree_to_workdir_with_index(Some(&head_tree), Some(&mut opts))?;

        let mut diff = RepoDiff::new();
        for git_delta in git_diff.deltas() {
            let kind = match git_delta.status() {
                GitDelta::Added | GitDelta::Untracked => DeltaKind::Insert,
                GitDelta::Modified | GitDelta::Typechange => DeltaKind::Update,
                GitDelta::Deleted => DeltaKind::Delete,
                other => {
                    log::debug!("Ignoring working copy delta of type {other:?}");
                    continue;
                }
            };

            let file = match kind {
                DeltaKind::Delete => git_delta.old_file(),
                _ => git_delta.new_file(),
            };
            let path = file.path().ok_or(KartStatusError::InvalidUtf8Path)?;
            let path_str = path.to_str().ok_or(KartStatusError::InvalidUtf8Path)?;

            let Some(item) = DatasetItemPath::parse(path_str) else {
                log::debug!("Ignoring non-dataset path {path_str}");
                continue;
            };

            let delta = match kind {
                DeltaKind::Insert => Delta::insert(self.read_file(path)?),
                DeltaKind::Update => Delta::update(
                    self.read_blob(git_delta.old_file().id())?,
                    self.read_file(path)?,
                ),
                DeltaKind::Delete => Delta::delete(self.read_blob(git_delta.old_file().id())?),
            };
            diff.dataset_mut(item.dataset).add(item.part, item.item, delta);
        }

        Ok(diff)
    }
}
