//! Domain-specific error types and error handling utilities.
//!
//! This module defines [`KartStatusError`] which covers every failure that can abort a
//! status computation. Backend failures (git object lookups, working copy access) are
//! fatal for the invocation and propagate unchanged to the caller.
//!
//! Problems with the *stored configuration* of a spatial filter are not
//! part of this enum: [`GeometryError`] and [`CrsError`] are produced by the geometry
//! subsystem and are downgraded to diagnostics before rendering.
//!
//! # Public API
//! - [`KartStatusError`]: Main error enum
//! - [`GeometryError`]: Failures parsing or encoding a geometry
//! - [`CrsError`]: Failures parsing or using a coordinate reference system
//! - [`Result<T>`]: Type alias for `std::result::Result<T, KartStatusError>`

use std::path::PathBuf;
use thiserror::Error;

/// Domain-specific error types for kart-status
#[derive(Error, Debug)]
pub enum KartStatusError {
    // Repository errors
    #[error("Not in a kart repository")]
    NotInRepo,

    #[error("Repository error: {0}")]
    Git(#[from] git2::Error),

    #[error("Invalid UTF-8 path in repository")]
    InvalidUtf8Path,

    #[error("Commit {commit} referenced by {context} does not exist")]
    MissingCommit { commit: String, context: String },

    // Working copy errors
    #[error("Working copy at '{path}' could not be read: {source}")]
    WorkingCopyRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // JSON serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results using KartStatusError
pub type Result<T> = std::result::Result<T, KartStatusError>;

impl KartStatusError {
    /// Create a missing commit error
    pub fn missing_commit(commit: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingCommit {
            commit: commit.into(),
            context: context.into(),
        }
    }

    /// Create a working copy read error
    pub fn working_copy_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WorkingCopyRead {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while parsing or encoding a geometry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Invalid geometry in {context}: {message}")]
    Invalid { context: String, message: String },

    #[error("Empty geometry in {context}")]
    Empty { context: String },

    #[error("Unsupported geometry type {type_code} in {context}")]
    UnsupportedType { context: String, type_code: u32 },
}

impl GeometryError {
    pub fn invalid(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn empty(context: impl Into<String>) -> Self {
        Self::Empty {
            context: context.into(),
        }
    }

    pub fn unsupported_type(context: impl Into<String>, type_code: u32) -> Self {
        Self::UnsupportedType {
            context: context.into(),
            type_code,
        }
    }
}

/// Errors raised while parsing a CRS or reprojecting coordinates
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CrsError {
    #[error("Invalid CRS in {context}: {definition}")]
    Invalid { context: String, definition: String },

    #[error("Cannot transform from {from} to {to}")]
    Unsupported { from: String, to: String },

    #[error("Coordinate ({x}, {y}) is outside the valid area of {crs}")]
    OutOfBounds { crs: String, x: f64, y: f64 },
}

impl CrsError {
    pub fn invalid(context: impl Into<String>, definition: impl Into<String>) -> Self {
        Self::Invalid {
            context: context.into(),
            definition: definition.into(),
        }
    }

    pub fn unsupported(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Unsupported {
            from: from.into(),
            to: to.into(),
        }
    }
}
