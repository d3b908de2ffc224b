//! Stratum Core: domain models, error taxonomy and the repository and
//! collaborator traits the rest of the workspace is written against.

pub mod collaborator;
pub mod error;
pub mod models;
pub mod repository;

/// Upper bound on hierarchy depth used by every upward or downward walk.
/// A walk that goes deeper is treated as corruption.
pub const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 64;
