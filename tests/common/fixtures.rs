//! Predefined repository scenarios
//!
//! Provides functions for creating repositories in specific states so that
//! status scenarios are tested consistently.

#![allow(dead_code)]

use super::repository::*;
use kart_status::core::error::Result;

pub const INSIDE_WELLINGTON: &str = "POINT(174.8 -41.3)";
pub const OUTSIDE_WELLINGTON: &str = "POINT(170 -45)";
pub const WELLINGTON: &str =
    "POLYGON((174.5 -41.5,175 -41.5,175 -41,174.5 -41,174.5 -41.5))";
/// Roughly the same region as [`WELLINGTON`], in NZTM (EPSG:2193) metres
pub const WELLINGTON_NZTM: &str = "POLYGON((1725000 5404500,1768500 5404500,1768500 5459500,1725000 5459500,1725000 5404500))";
pub const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433],AUTHORITY["EPSG","4326"]]"#;

/// Scenario: one `roads` dataset with features 1 to `count`, all inside Wellington
pub fn create_roads_repo(count: u32) -> Result<TestRepo> {
    let repo = setup_test_repo()?;
    for id in 1..=count {
        write_feature(&repo.path, "roads", id, INSIDE_WELLINGTON)?;
    }
    commit_all(&repo.path, "Import roads")?;
    Ok(repo)
}

/// Scenario: `main` and `other` both edit feature 1, merge left conflicted
pub fn create_conflicted_merge_repo() -> Result<TestRepo> {
    let repo = create_roads_repo(2)?;
    git(&repo.path, &["checkout", "-b", "other"])?;
    write_feature(&repo.path, "roads", 1, "POINT(174.9 -41.3)")?;
    commit_all(&repo.path, "Move feature 1 east")?;

    git(&repo.path, &["checkout", "main"])?;
    write_feature(&repo.path, "roads", 1, "POINT(174.7 -41.3)")?;
    commit_all(&repo.path, "Move feature 1 west")?;

    git(&repo.path, &["merge", "other"])?;
    Ok(repo)
}
