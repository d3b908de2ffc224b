//! Stratum Database: SurrealDB connection management, schema migrations
//! and repository implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Explicit transaction scopes ([`SurrealTransaction`])
//! - Implementations of the `stratum-core` repository traits
//!   ([`repository::SurrealPkiStore`] and friends)

mod connection;
mod error;
mod schema;
mod transaction;

pub mod repository;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
pub use transaction::{BindValue, SurrealTransaction};
