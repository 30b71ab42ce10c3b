//! Consolidated test utilities for kart-status
//!
//! This module provides unified testing utilities for integration tests,
//! focused on real repository scenarios built with the git CLI.

pub mod assertions;
pub mod fixtures;
pub mod repository;
