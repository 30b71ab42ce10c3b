//! The repository operations status reporting depends on.
//!
//! [`RepoBackend`] is implemented by [`crate::core::repo::KartRepo`] on top of git, and
//! by in-memory fakes in tests. Errors from any method are fatal for the status command
//! and propagate unchanged.

use crate::core::error::Result;
use crate::core::merge::{ConflictSummary, MergeContext};
use crate::core::report::CommitId;
use crate::core::spatial_filter::SpatialFilterConfig;
use crate::core::working_copy::WorkingCopy;

/// The branch a local branch tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamRef {
    /// Display name, e.g. `origin/main`
    pub name: String,
    pub commit: String,
}

pub trait RepoBackend {
    /// `None` when the repository has no commits yet
    fn head_commit(&self) -> Result<Option<CommitId>>;

    /// `None` when HEAD is detached or unborn
    fn head_branch(&self) -> Result<Option<String>>;

    /// `None` when `branch` tracks nothing
    fn upstream_of(&self, branch: &str) -> Result<Option<UpstreamRef>>;

    /// Number of commits `(ahead, behind)` of `local` relative to `upstream`
    fn ahead_behind(&self, local: &str, upstream: &str) -> Result<(usize, usize)>;

    fn is_merging(&self) -> Result<bool>;

    fn merge_context(&self) -> Result<MergeContext>;

    /// Outstanding conflicts summarised to dataset and part
    fn conflict_summary(&self) -> Result<ConflictSummary>;

    fn spatial_filter_config(&self) -> Result<Option<SpatialFilterConfig>>;

    /// CRS definition stored in `dataset` at HEAD, if it has one
    fn dataset_crs(&self, dataset: &str) -> Result<Option<String>>;

    fn working_copy(&self) -> Result<Option<Box<dyn WorkingCopy + '_>>>;
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory [`RepoBackend`] for unit tests.

    use super::*;
    use crate::core::diff::RepoDiff;
    use crate::core::error::KartStatusError;
    use std::cell::Cell;
    use std::collections::BTreeMap;

    pub struct FakeWorkingCopy<'a> {
        location: String,
        diff: RepoDiff,
        snapshots: &'a Cell<usize>,
    }

    impl WorkingCopy for FakeWorkingCopy<'_> {
        fn location(&self) -> String {
            self.location.clone()
        }

        fn diff_to_tree(&self) -> Result<RepoDiff> {
            self.snapshots.set(self.snapshots.get() + 1);
            Ok(self.diff.clone())
        }
    }

    #[derive(Default)]
    pub struct FakeRepo {
        pub commit: Option<CommitId>,
        pub branch: Option<String>,
        pub upstream: Option<(UpstreamRef, (usize, usize))>,
        pub merge: Option<(MergeContext, ConflictSummary)>,
        pub spatial_filter: Option<SpatialFilterConfig>,
        pub dataset_crs: BTreeMap<String, String>,
        /// `None` means no working copy
        pub working_copy: Option<(String, RepoDiff)>,
        pub snapshots: Cell<usize>,
        pub working_copy_requests: Cell<usize>,
    }

    impl FakeRepo {
        pub fn with_commit() -> Self {
            FakeRepo {
                commit: Some(CommitId {
                    id: "a".repeat(40),
                    short_id: "aaaaaaa".to_string(),
                }),
                branch: Some("main".to_string()),
                working_copy: Some(("/tmp/wc".to_string(), RepoDiff::new())),
                ..Default::default()
            }
        }
    }

    impl RepoBackend for FakeRepo {
        fn head_commit(&self) -> Result<Option<CommitId>> {
            Ok(self.commit.clone())
        }

        fn head_branch(&self) -> Result<Option<String>> {
            Ok(self.branch.clone())
        }

        fn upstream_of(&self, _branch: &str) -> Result<Option<UpstreamRef>> {
            Ok(self.upstream.as_ref().map(|(upstream, _)| upstream.clone()))
        }

        fn ahead_behind(&self, _local: &str, _upstream: &str) -> Result<(usize, usize)> {
            Ok(self.upstream.as_ref().map(|(_, counts)| *counts).unwrap_or_default())
        }

        fn is_merging(&self) -> Result<bool> {
            Ok(self.merge.is_some())
        }

        fn merge_context(&self) -> Result<MergeContext> {
            let (merge, _) = self
                .merge
                .as_ref()
                .ok_or_else(|| KartStatusError::missing_commit("", "MERGE_HEAD"))?;
            Ok(merge.clone())
        }

        fn conflict_summary(&self) -> Result<ConflictSummary> {
            Ok(self
                .merge
                .as_ref()
                .map(|(_, conflicts)| conflicts.clone())
                .unwrap_or_default())
        }

        fn spatial_filter_config(&self) -> Result<Option<SpatialFilterConfig>> {
            Ok(self.spatial_filter.clone())
        }

        fn dataset_crs(&self, dataset: &str) -> Result<Option<String>> {
            Ok(self.dataset_crs.get(dataset).cloned())
        }

        fn working_copy(&self) -> Result<Option<Box<dyn WorkingCopy + '_>>> {
            self.working_copy_requests
                .set(self.working_copy_requests.get() + 1);
            Ok(self.working_copy.as_ref().map(|(location, diff)| {
                Box::new(FakeWorkingCopy {
                    location: location.clone(),
                    diff: diff.clone(),
                    snapshots: &self.snapshots,
                }) as Box<dyn WorkingCopy + '_>
            }))
        }
    }
}
