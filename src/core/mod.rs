//! Core functionality for the kart-status tool.
//!
//! This module provides the building blocks for computing a repository status report:
//! repository access, working copy diffs, spatial filtering, classification and
//! rendering.

pub mod aggregator;
pub mod backend;
pub mod branch;
pub mod config;
pub mod crs;
pub mod diff;
pub mod diff_status;
pub mod error;
pub mod geometry;
pub mod merge;
pub mod output;
pub mod render;
pub mod report;
pub mod repo;
pub mod spatial_filter;
pub mod templates;
pub mod working_copy;

// === Error handling ===
// Core error types and result type used throughout the application
pub use error::{CrsError, GeometryError, KartStatusError, Result};

// === Repository access ===
// The backend seam and its git implementation
pub use backend::{RepoBackend, UpstreamRef};
pub use repo::KartRepo;
pub use working_copy::{WorkdirWorkingCopy, WorkingCopy};

// === Status computation ===
// Branch info, diff classification and report aggregation
pub use aggregator::StatusAggregator;
pub use branch::BranchInfo;
pub use diff::{DatasetDiff, DatasetPart, Delta, DeltaKind, RepoDiff};
pub use diff_status::{classify, ChangeCounts, ChangeType, DiffStatusClassifier, DiffStatusCounts};
pub use merge::{CommitRef, ConflictSummary, MergeContext};
pub use report::{CommitId, ReportState, StatusReport, UpstreamStatus, WorkingCopyStatus};

// === Spatial filtering ===
// Stored filter configuration, geometry and CRS handling
pub use crs::{Crs, ProjReprojector, Reprojector};
pub use geometry::{Envelope, Geometry};
pub use spatial_filter::{
    FilterDiagnostic, RepoFilterResolver, SpatialFilter, SpatialFilterConfig,
    SpatialFilterResolver,
};

// === Rendering ===
// Text and JSON output plus the template system behind the text wording
pub use render::{render_document, render_json, render_text};
pub use templates::{
    render_template, render_template_plain, strip_ansi_codes, TemplateContext, Templates, TEMPLATES,
};

// === Output formatting ===
pub use output::{print_error, print_warning};
