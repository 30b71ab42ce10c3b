//! The status report: one immutable value per `status` invocation.
//!
//! Sections that are mutually exclusive are expressed as sum types so that both
//! renderers have to handle every variant: a repository is either merging (merge
//! context and conflicts) or not (working copy status), never both.

use crate::core::diff_status::DiffStatusCounts;
use crate::core::merge::{ConflictSummary, MergeContext};
use crate::core::spatial_filter::SpatialFilterConfig;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitId {
    pub id: String,
    pub short_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamStatus {
    pub branch: String,
    pub ahead: usize,
    pub behind: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkingCopyStatus {
    pub path: String,
    /// `None` when the working copy is clean
    pub changes: Option<DiffStatusCounts>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportState {
    Normal {
        /// `None` for an empty repository or one without a working copy
        working_copy: Option<WorkingCopyStatus>,
    },
    Merging {
        merge: MergeContext,
        conflicts: ConflictSummary,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub commit: Option<CommitId>,
    pub branch: Option<String>,
    pub upstream: Option<UpstreamStatus>,
    pub spatial_filter: Option<SpatialFilterConfig>,
    pub state: ReportState,
}

impl StatusReport {
    pub fn is_empty_repo(&self) -> bool {
        self.commit.is_none()
    }

    pub fn is_merging(&self) -> bool {
        matches!(self.state, ReportState::Merging { .. })
    }
}
