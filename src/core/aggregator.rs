//! Builds a [`StatusReport`] from a repository.

use crate::core::backend::RepoBackend;
use crate::core::branch::BranchInfo;
use crate::core::crs::ProjReprojector;
use crate::core::diff_status::classify;
use crate::core::error::Result;
use crate::core::report::{ReportState, StatusReport, WorkingCopyStatus};
use crate::core::spatial_filter::{RepoFilterResolver, SpatialFilter, SpatialFilterConfig};

pub struct StatusAggregator;

impl StatusAggregator {
    pub fn aggregate(repo: &dyn RepoBackend) -> Result<StatusReport> {
        let branch_info = BranchInfo::resolve(repo)?;
        let spatial_filter = repo.spatial_filter_config()?;

        let has_commit = branch_info.commit.is_some();
        let state = if repo.is_merging()? {
            log::debug!("Repository is mid-merge, skipping working copy");
            ReportState::Merging {
                merge: repo.merge_context()?,
                conflicts: repo.conflict_summary()?,
            }
        } else {
            ReportState::Normal {
                working_copy: working_copy_status(repo, has_commit, spatial_filter.as_ref())?,
            }
        };

        Ok(StatusReport {
            commit: branch_info.commit,
            branch: branch_info.branch,
            upstream: branch_info.upstream,
            spatial_filter,
            state,
        })
    }
}

/// `None` when HEAD has no commit to compare against, including orphan branches
fn working_copy_status(
    repo: &dyn RepoBackend,
    has_commit: bool,
    filter_config: Option<&SpatialFilterConfig>,
) -> Result<Option<WorkingCopyStatus>> {
    if !has_commit {
        return Ok(None);
    }
    let Some(working_copy) = repo.working_copy()? else {
        log::debug!("Repository has no working copy");
        return Ok(None);
    };

    let diff = working_copy.diff_to_tree()?;
    let changes = if diff.is_empty() {
        None
    } else {
        let filter = resolve_filter(filter_config);
        let mut resolver = RepoFilterResolver::new(&filter, &ProjReprojector);
        if !filter.is_match_all() {
            for (ds_path, _) in diff.datasets() {
                if let Some(crs) = repo.dataset_crs(ds_path)? {
                    resolver = resolver.with_dataset_crs(ds_path, crs);
                }
            }
        }
        Some(classify(&diff, &filter, &resolver))
    };

    Ok(Some(WorkingCopyStatus {
        path: working_copy.location(),
        changes,
    }))
}

/// A filter that cannot be interpreted restricts nothing
fn resolve_filter(config: Option<&SpatialFilterConfig>) -> SpatialFilter {
    let Some(config) = config else {
        return SpatialFilter::MatchAll;
    };
    config.resolve().unwrap_or_else(|diagnostic| {
        log::warn!("{diagnostic}");
        SpatialFilter::MatchAll
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backend::fake::FakeRepo;
    use crate::core::diff::{Delta, RepoDiff};
    use crate::core::diff_status::ChangeType;
    use crate::core::merge::{CommitRef, ConflictSummary, MergeContext};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn commit(c: &str) -> CommitRef {
        CommitRef {
            commit: c.repeat(40),
            abbrev_commit: c.repeat(7),
            branch: None,
        }
    }

    fn roads_update(old_geom: &str) -> RepoDiff {
        let mut diff = RepoDiff::new();
        diff.dataset_mut("roads").add(
            "feature",
            "1",
            Delta::update(
                json!({"id": 1, "geom": old_geom}),
                json!({"id": 1, "geom": "POINT(174.8 -41.3)"}),
            ),
        );
        diff
    }

    fn wellington() -> SpatialFilterConfig {
        SpatialFilterConfig {
            reference: None,
            geometry: "POLYGON((174.5 -41.5,175.0 -41.5,175.0 -41.0,174.5 -41.0,174.5 -41.5))"
                .to_string(),
            crs: "EPSG:4326".to_string(),
        }
    }

    #[test]
    fn test_empty_repo() -> Result<()> {
        let repo = FakeRepo::default();
        let report = StatusAggregator::aggregate(&repo)?;
        assert!(report.is_empty_repo());
        assert_eq!(report.state, ReportState::Normal { working_copy: None });
        assert_eq!(repo.snapshots.get(), 0);
        Ok(())
    }

    #[test]
    fn test_unborn_head_skips_working_copy() -> Result<()> {
        let repo = FakeRepo {
            commit: None,
            branch: None,
            ..FakeRepo::with_commit()
        };
        let report = StatusAggregator::aggregate(&repo)?;
        assert!(report.is_empty_repo());
        assert_eq!(report.state, ReportState::Normal { working_copy: None });
        assert_eq!(repo.snapshots.get(), 0);
        Ok(())
    }

    #[test]
    fn test_no_working_copy() -> Result<()> {
        let repo = FakeRepo {
            working_copy: None,
            ..FakeRepo::with_commit()
        };
        let report = StatusAggregator::aggregate(&repo)?;
        assert_eq!(report.state, ReportState::Normal { working_copy: None });
        Ok(())
    }

    #[test]
    fn test_clean_working_copy() -> Result<()> {
        let repo = FakeRepo::with_commit();
        let report = StatusAggregator::aggregate(&repo)?;
        assert_eq!(
            report.state,
            ReportState::Normal {
                working_copy: Some(WorkingCopyStatus {
                    path: "/tmp/wc".to_string(),
                    changes: None,
                })
            }
        );
        assert_eq!(repo.snapshots.get(), 1);
        Ok(())
    }

    #[test]
    fn test_dirty_working_copy_takes_one_snapshot() -> Result<()> {
        let repo = FakeRepo {
            working_copy: Some(("/tmp/wc".to_string(), roads_update("POINT(174.7 -41.2)"))),
            ..FakeRepo::with_commit()
        };
        let report = StatusAggregator::aggregate(&repo)?;
        let ReportState::Normal {
            working_copy: Some(wc),
        } = report.state
        else {
            panic!("expected a working copy status");
        };
        let counts = wc.changes.unwrap();
        assert_eq!(
            counts.get("roads", "feature").unwrap().get(ChangeType::Updates),
            Some(1)
        );
        assert_eq!(repo.snapshots.get(), 1);
        Ok(())
    }

    #[test]
    fn test_spatial_filter_reclassifies_updates() -> Result<()> {
        let repo = FakeRepo {
            spatial_filter: Some(wellington()),
            working_copy: Some(("/tmp/wc".to_string(), roads_update("POINT(170 -45)"))),
            ..FakeRepo::with_commit()
        };
        let report = StatusAggregator::aggregate(&repo)?;
        assert_eq!(report.spatial_filter, Some(wellington()));

        let ReportState::Normal {
            working_copy: Some(wc),
        } = report.state
        else {
            panic!("expected a working copy status");
        };
        let feature = wc.changes.unwrap();
        let feature = feature.get("roads", "feature").unwrap();
        assert_eq!(feature.get(ChangeType::Updates), None);
        assert_eq!(feature.get(ChangeType::PrimaryKeyConflicts), Some(1));
        Ok(())
    }

    #[test]
    fn test_spatial_filter_follows_dataset_crs() -> Result<()> {
        let nztm = SpatialFilterConfig {
            reference: None,
            geometry: "POLYGON((1725000 5404500,1768500 5404500,1768500 5459500,1725000 5459500,1725000 5404500))"
                .to_string(),
            crs: "EPSG:2193".to_string(),
        };
        let repo = FakeRepo {
            spatial_filter: Some(nztm),
            dataset_crs: BTreeMap::from([("roads".to_string(), "EPSG:4326".to_string())]),
            working_copy: Some(("/tmp/wc".to_string(), roads_update("POINT(174.7 -41.2)"))),
            ..FakeRepo::with_commit()
        };
        let report = StatusAggregator::aggregate(&repo)?;

        let ReportState::Normal {
            working_copy: Some(wc),
        } = report.state
        else {
            panic!("expected a working copy status");
        };
        let feature = wc.changes.unwrap();
        let feature = feature.get("roads", "feature").unwrap();
        assert_eq!(feature.get(ChangeType::Updates), Some(1));
        assert_eq!(feature.get(ChangeType::PrimaryKeyConflicts), None);
        Ok(())
    }

    #[test]
    fn test_malformed_spatial_filter_matches_all() -> Result<()> {
        let filter = SpatialFilterConfig {
            geometry: "not a geometry".to_string(),
            ..wellington()
        };
        let repo = FakeRepo {
            spatial_filter: Some(filter.clone()),
            working_copy: Some(("/tmp/wc".to_string(), roads_update("POINT(170 -45)"))),
            ..FakeRepo::with_commit()
        };
        let report = StatusAggregator::aggregate(&repo)?;
        assert_eq!(report.spatial_filter, Some(filter));

        let ReportState::Normal {
            working_copy: Some(wc),
        } = report.state
        else {
            panic!("expected a working copy status");
        };
        let feature = wc.changes.unwrap();
        assert_eq!(
            feature.get("roads", "feature").unwrap().get(ChangeType::Updates),
            Some(1)
        );
        Ok(())
    }

    #[test]
    fn test_merging_skips_working_copy() -> Result<()> {
        let mut conflicts = ConflictSummary::default();
        conflicts.record("roads", "feature");
        let merge = MergeContext {
            ancestor: None,
            ours: commit("a"),
            theirs: commit("b"),
            message: None,
        };
        let repo = FakeRepo {
            merge: Some((merge.clone(), conflicts.clone())),
            working_copy: Some(("/tmp/wc".to_string(), roads_update("POINT(0 0)"))),
            ..FakeRepo::with_commit()
        };

        let report = StatusAggregator::aggregate(&repo)?;
        assert!(report.is_merging());
        assert_eq!(report.state, ReportState::Merging { merge, conflicts });
        assert_eq!(repo.working_copy_requests.get(), 0);
        assert_eq!(repo.snapshots.get(), 0);
        Ok(())
    }
}
