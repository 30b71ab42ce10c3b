//! Repository access through git.
//!
//! This module provides [`KartRepo`], the [`RepoBackend`] used by the `status` command.
//! It wraps the `git2` library to read HEAD and branch tracking information, merge state
//! and conflicts, the spatial filter stored in repository config, and the working copy.
//!
//! # Public API
//! - [`KartRepo`]: Main interface for repository operations
//!
//! # Key Features
//! - **Branch info**: HEAD commit, current branch, upstream and ahead/behind counts
//! - **Merge state**: MERGE_HEAD, MERGE_MSG and index conflicts decoded to datasets
//! - **Configuration**: spatial filter and working copy settings from git config
//! - **Dataset CRS**: the `meta/crs/*.wkt` definition a dataset has at HEAD

use crate::core::backend::{RepoBackend, UpstreamRef};
use crate::core::config::{load_spatial_filter_config, working_copy_location};
use crate::core::diff::{is_dataset_dir, DatasetItemPath};
use crate::core::error::{KartStatusError, Result};
use crate::core::merge::{CommitRef, ConflictSummary, MergeContext};
use crate::core::report::CommitId;
use crate::core::spatial_filter::SpatialFilterConfig;
use crate::core::working_copy::{WorkdirWorkingCopy, WorkingCopy};
use git2::{BranchType, ErrorCode, ObjectType, Oid, Reference, Repository, RepositoryState, Tree};
use std::path::Path;

pub struct KartRepo {
    repo: Repository,
}

impl KartRepo {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::discover(path)?;
        Ok(KartRepo { repo })
    }

    pub fn get_repository(&self) -> &Repository {
        &self.repo
    }

    /// HEAD, or `None` while it points at a branch with no commits
    fn head(&self) -> Result<Option<Reference<'_>>> {
        match self.repo.head() {
            Ok(head) => Ok(Some(head)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn subtree(&self, tree: &Tree<'_>, path: &str) -> Result<Option<Tree<'_>>> {
        match tree.get_path(Path::new(path)) {
            Ok(entry) if entry.kind() == Some(ObjectType::Tree) => {
                Ok(Some(entry.to_object(&self.repo)?.peel_to_tree()?))
            }
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn commit_ref(&self, oid: Oid, branch: Option<String>) -> Result<CommitRef> {
        let object = self.repo.find_object(oid, None)?;
        let commit = oid.to_string();
        let abbrev_commit = abbreviate(&object, &commit)?;
        Ok(CommitRef {
            commit,
            abbrev_commit,
            branch,
        })
    }

    fn merge_head(&self) -> Result<Oid> {
        let path = self.repo.path().join("MERGE_HEAD");
        let content = std::fs::read_to_string(&path)?;
        let first = content.lines().next().unwrap_or_default().trim();
        Oid::from_str(first).map_err(|_| KartStatusError::missing_commit(first, "MERGE_HEAD"))
    }

    /// MERGE_MSG, or `None` when git did not prepare one
    fn merge_message(&self) -> Result<Option<String>> {
        match self.repo.message() {
            Ok(message) => Ok(Some(message)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn abbreviate(object: &git2::Object<'_>, full: &str) -> Result<String> {
    let short = object.short_id()?;
    Ok(short
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| full.chars().take(7).collect()))
}

/// Branch name from a merge message such as `Merge branch 'feature' into main`
fn merged_branch_name(message: &str) -> Option<String> {
    let first_line = message.lines().next()?;
    let rest = first_line.strip_prefix("Merge branch '")?;
    let (name, _) = rest.split_once('\'')?;
    Some(name.to_string())
}

impl RepoBackend for KartRepo {
    fn head_commit(&self) -> Result<Option<CommitId>> {
        let Some(head) = self.head()? else {
            return Ok(None);
        };
        let commit = head.peel_to_commit()?;
        let id = commit.id().to_string();
        let short_id = abbreviate(commit.as_object(), &id)?;
        Ok(Some(CommitId { id, short_id }))
    }

    fn head_branch(&self) -> Result<Option<String>> {
        let Some(head) = self.head()? else {
            return Ok(None);
        };
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    fn upstream_of(&self, branch: &str) -> Result<Option<UpstreamRef>> {
        let local = self.repo.find_branch(branch, BranchType::Local)?;
        let upstream = match local.upstream() {
            Ok(upstream) => upstream,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let Some(target) = upstream.get().target() else {
            return Ok(None);
        };
        let name = upstream
            .name()?
            .ok_or(KartStatusError::InvalidUtf8Path)?
            .to_string();
        Ok(Some(UpstreamRef {
            name,
            commit: target.to_string(),
        }))
    }

    fn ahead_behind(&self, local: &str, upstream: &str) -> Result<(usize, usize)> {
        let local_oid = Oid::from_str(local)?;
        let upstream_oid = Oid::from_str(upstream)?;
        Ok(self.repo.graph_ahead_behind(local_oid, upstream_oid)?)
    }

    fn is_merging(&self) -> Result<bool> {
        Ok(self.repo.state() == RepositoryState::Merge)
    }

    fn merge_context(&self) -> Result<MergeContext> {
        let ours_oid = self.repo.head()?.peel_to_commit()?.id();
        let theirs_oid = self.merge_head()?;
        let message = self.merge_message()?;

        let ours = self.commit_ref(ours_oid, self.head_branch()?)?;
        let theirs = self.commit_ref(
            theirs_oid,
            message.as_deref().and_then(merged_branch_name),
        )?;
        let ancestor = match self.repo.merge_base(ours_oid, theirs_oid) {
            Ok(oid) => Some(self.commit_ref(oid, None)?),
            Err(e) if e.code() == ErrorCode::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        Ok(MergeContext {
            ancestor,
            ours,
            theirs,
            message,
        })
    }

    fn conflict_summary(&self) -> Result<ConflictSummary> {
        let index = self.repo.index()?;
        let mut summary = ConflictSummary::default();

        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let Some(entry) = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
            else {
                continue;
            };
            let path =
                std::str::from_utf8(&entry.path).map_err(|_| KartStatusError::InvalidUtf8Path)?;
            match DatasetItemPath::parse(path) {
                Some(item) => summary.record(item.dataset, item.part),
                None => log::debug!("Ignoring conflict outside any dataset: {path}"),
            }
        }

        Ok(summary)
    }

    fn spatial_filter_config(&self) -> Result<Option<SpatialFilterConfig>> {
        load_spatial_filter_config(&self.repo.config()?)
    }

    fn dataset_crs(&self, dataset: &str) -> Result<Option<String>> {
        let Some(head) = self.head()? else {
            return Ok(None);
        };
        let root = head.peel_to_tree()?;
        let Some(dataset_tree) = self.subtree(&root, dataset)? else {
            return Ok(None);
        };
        let Some(inner) = dataset_tree.iter().find(|entry| {
            entry.kind() == Some(ObjectType::Tree) && entry.name().is_some_and(is_dataset_dir)
        }) else {
            return Ok(None);
        };
        let inner = inner.to_object(&self.repo)?.peel_to_tree()?;
        let Some(crs_tree) = self.subtree(&inner, "meta/crs")? else {
            return Ok(None);
        };

        for entry in crs_tree.iter() {
            if entry.kind() == Some(ObjectType::Blob)
                && entry.name().is_some_and(|name| name.ends_with(".wkt"))
            {
                let blob = entry.to_object(&self.repo)?.peel_to_blob()?;
                return Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()));
            }
        }
        Ok(None)
    }

    fn working_copy(&self) -> Result<Option<Box<dyn WorkingCopy + '_>>> {
        if self.repo.is_bare() {
            return Ok(None);
        }
        let location = working_copy_location(&self.repo.config()?)?;
        Ok(WorkdirWorkingCopy::open(&self.repo, location)
            .map(|wc| Box::new(wc) as Box<dyn WorkingCopy + '_>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::DeltaKind;
    use std::fs;
    use std::process::Command;
    use tempfile::TempDir;

    const FEATURE_PATH: &str = "roads/.table-dataset/feature/1";

    fn git(dir: &Path, args: &[&str]) {
        Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
    }

    fn setup_test_repo() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path();
        git(path, &["init"]);
        git(path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(path, &["config", "user.name", "Test User"]);
        git(path, &["config", "user.email", "test@example.com"]);
        temp_dir
    }

    fn write_feature(dir: &Path, name: &str) {
        let path = dir.join(FEATURE_PATH);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(
            path,
            format!(r#"{{"id": 1, "geom": "POINT(174.8 -41.3)", "name": "{name}"}}"#),
        )
        .unwrap();
    }

    fn commit_all(dir: &Path, message: &str) {
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-m", message]);
    }

    #[test]
    fn test_empty_repo() -> Result<()> {
        let temp_dir = setup_test_repo();
        let repo = KartRepo::open(temp_dir.path())?;
        assert_eq!(repo.head_commit()?, None);
        assert_eq!(repo.dataset_crs("roads")?, None);
        assert_eq!(repo.head_branch()?, None);
        assert!(!repo.is_merging()?);
        Ok(())
    }

    #[test]
    fn test_open_non_repo_directory() {
        let temp_dir = TempDir::new().unwrap();
        // A temp dir may live inside a repo on some machines; only assert when it doesn't
        if Repository::discover(temp_dir.path()).is_err() {
            assert!(KartRepo::open(temp_dir.path()).is_err());
        }
    }

    #[test]
    fn test_head_commit_and_branch() -> Result<()> {
        let temp_dir = setup_test_repo();
        write_feature(temp_dir.path(), "a");
        commit_all(temp_dir.path(), "Initial");

        let repo = KartRepo::open(temp_dir.path())?;
        let commit = repo.head_commit()?.unwrap();
        assert_eq!(commit.id.len(), 40);
        assert!(commit.id.starts_with(&commit.short_id));
        assert_eq!(repo.head_branch()?.as_deref(), Some("main"));
        assert_eq!(repo.upstream_of("main")?, None);
        Ok(())
    }

    #[test]
    fn test_detached_head_has_no_branch() -> Result<()> {
        let temp_dir = setup_test_repo();
        write_feature(temp_dir.path(), "a");
        commit_all(temp_dir.path(), "Initial");
        git(temp_dir.path(), &["checkout", "--detach"]);

        let repo = KartRepo::open(temp_dir.path())?;
        assert!(repo.head_commit()?.is_some());
        assert_eq!(repo.head_branch()?, None);
        Ok(())
    }

    #[test]
    fn test_upstream_ahead() -> Result<()> {
        let temp_dir = setup_test_repo();
        write_feature(temp_dir.path(), "a");
        commit_all(temp_dir.path(), "Initial");
        git(temp_dir.path(), &["branch", "base"]);
        git(temp_dir.path(), &["branch", "-u", "base"]);
        write_feature(temp_dir.path(), "b");
        commit_all(temp_dir.path(), "Second");

        let repo = KartRepo::open(temp_dir.path())?;
        let head = repo.head_commit()?.unwrap();
        let upstream = repo.upstream_of("main")?.unwrap();
        assert_eq!(upstream.name, "base");
        assert_eq!(repo.ahead_behind(&head.id, &upstream.commit)?, (1, 0));
        Ok(())
    }

    #[test]
    fn test_working_copy_diff() -> Result<()> {
        let temp_dir = setup_test_repo();
        write_feature(temp_dir.path(), "a");
        fs::write(temp_dir.path().join("README"), "not a dataset").unwrap();
        commit_all(temp_dir.path(), "Initial");
        write_feature(temp_dir.path(), "b");
        fs::write(temp_dir.path().join("README"), "still not a dataset").unwrap();

        let repo = KartRepo::open(temp_dir.path())?;
        let wc = repo.working_copy()?.unwrap();
        let diff = wc.diff_to_tree()?;

        let roads = diff.dataset("roads").unwrap();
        let delta = &roads.part("feature").unwrap()["1"];
        assert_eq!(delta.kind, DeltaKind::Update);
        assert_eq!(delta.old.as_ref().unwrap()["name"], "a");
        assert_eq!(delta.new.as_ref().unwrap()["name"], "b");
        assert_eq!(diff.datasets().count(), 1);
        Ok(())
    }

    #[test]
    fn test_orphan_branch_has_no_commit() -> Result<()> {
        let temp_dir = setup_test_repo();
        write_feature(temp_dir.path(), "a");
        commit_all(temp_dir.path(), "Initial");
        git(temp_dir.path(), &["checkout", "--orphan", "fresh"]);

        let repo = KartRepo::open(temp_dir.path())?;
        assert_eq!(repo.head_commit()?, None);
        assert_eq!(repo.head_branch()?, None);
        assert_eq!(repo.dataset_crs("roads")?, None);
        Ok(())
    }

    #[test]
    fn test_dataset_crs() -> Result<()> {
        let temp_dir = setup_test_repo();
        let crs_path = temp_dir.path().join("roads/.table-dataset/meta/crs/EPSG:2193.wkt");
        fs::create_dir_all(crs_path.parent().unwrap()).unwrap();
        fs::write(&crs_path, r#"PROJCS["NZGD2000 / New Zealand Transverse Mercator 2000"]"#).unwrap();
        write_feature(temp_dir.path(), "a");
        commit_all(temp_dir.path(), "Initial");

        let repo = KartRepo::open(temp_dir.path())?;
        assert_eq!(
            repo.dataset_crs("roads")?.as_deref(),
            Some(r#"PROJCS["NZGD2000 / New Zealand Transverse Mercator 2000"]"#)
        );
        assert_eq!(repo.dataset_crs("rivers")?, None);
        Ok(())
    }

    #[test]
    fn test_working_copy_location_override() -> Result<()> {
        let temp_dir = setup_test_repo();
        git(
            temp_dir.path(),
            &["config", "kart.workingcopy.location", "kart.gpkg"],
        );

        let repo = KartRepo::open(temp_dir.path())?;
        assert_eq!(repo.working_copy()?.unwrap().location(), "kart.gpkg");
        Ok(())
    }

    #[test]
    fn test_merge_with_conflicts() -> Result<()> {
        let temp_dir = setup_test_repo();
        let path = temp_dir.path();
        write_feature(path, "a");
        commit_all(path, "Initial");
        git(path, &["checkout", "-b", "other"]);
        write_feature(path, "theirs");
        commit_all(path, "Theirs");
        git(path, &["checkout", "main"]);
        write_feature(path, "ours");
        commit_all(path, "Ours");
        git(path, &["merge", "other"]);

        let repo = KartRepo::open(path)?;
        assert!(repo.is_merging()?);

        let merge = repo.merge_context()?;
        assert_eq!(merge.ours.branch.as_deref(), Some("main"));
        assert_eq!(merge.theirs.branch.as_deref(), Some("other"));
        assert!(merge.ancestor.is_some());

        let conflicts = repo.conflict_summary()?;
        assert_eq!(conflicts.total(), 1);
        assert_eq!(
            serde_json::to_value(&conflicts)?,
            serde_json::json!({"roads": {"feature": 1}})
        );
        Ok(())
    }

    #[test]
    fn test_merged_branch_name() {
        assert_eq!(
            merged_branch_name("Merge branch 'other'\n\n# Conflicts:"),
            Some("other".to_string())
        );
        assert_eq!(
            merged_branch_name("Merge branch 'feature/x' into main"),
            Some("feature/x".to_string())
        );
        assert_eq!(merged_branch_name("Merge commit 'abc123'"), None);
    }
}
