//! kart-status - a status report for kart repositories.
//!
//! Summarises a repository's state: the current commit and branch, how the branch
//! relates to its upstream, any active spatial filter, an in-progress merge with its
//! conflicts, or otherwise the uncommitted changes in the working copy, counted per
//! dataset and dataset part.
//!
//! # Public API
//! The main public interface is re-exported from the [`core`] module, which provides:
//! - Repository access through the [`RepoBackend`] trait and its git implementation
//! - Report aggregation via [`StatusAggregator`]
//! - Text and JSON rendering
//! - Error handling and result types

pub mod commands;
pub mod core;

// Re-export the core public API for external users
pub use core::{
    // Rendering
    render_document,
    render_json,
    render_text,

    // Error handling
    KartStatusError,
    Result,

    // Repository access
    KartRepo,
    RepoBackend,
    WorkingCopy,

    // Status computation
    ReportState,
    StatusAggregator,
    StatusReport,
};
