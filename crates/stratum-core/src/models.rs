//! Domain models for Stratum.
//!
//! These are the core types shared across all crates.

pub mod certificate;
pub mod certificate_authority;
pub mod material;
