//! Commit, branch and upstream information for the status header.

use crate::core::backend::RepoBackend;
use crate::core::error::Result;
use crate::core::report::{CommitId, UpstreamStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchInfo {
    pub commit: Option<CommitId>,
    pub branch: Option<String>,
    pub upstream: Option<UpstreamStatus>,
}

impl BranchInfo {
    pub fn resolve(repo: &dyn RepoBackend) -> Result<BranchInfo> {
        let Some(commit) = repo.head_commit()? else {
            log::debug!("HEAD is unborn, repository has no commits");
            return Ok(BranchInfo::default());
        };

        let Some(branch) = repo.head_branch()? else {
            log::debug!("HEAD is detached at {}", commit.short_id);
            return Ok(BranchInfo {
                commit: Some(commit),
                ..Default::default()
            });
        };

        let upstream = match repo.upstream_of(&branch)? {
            Some(upstream) => {
                let (ahead, behind) = repo.ahead_behind(&commit.id, &upstream.commit)?;
                log::debug!("{branch} is {ahead} ahead, {behind} behind {}", upstream.name);
                Some(UpstreamStatus {
                    branch: upstream.name,
                    ahead,
                    behind,
                })
            }
            None => None,
        };

        Ok(BranchInfo {
            commit: Some(commit),
            branch: Some(branch),
            upstream,
        })
    }
}
