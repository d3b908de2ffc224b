//! SurrealDB repository implementations.

mod certificate;
mod certificate_authority;
mod material;
mod store;

use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

pub use certificate::SurrealCertificateRepository;
pub use certificate_authority::SurrealCertificateAuthorityRepository;
pub use material::SurrealMaterialRepository;
pub use store::SurrealPkiStore;

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_uuid(value: &str, what: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::InvalidRecord(format!("invalid {what} UUID: {e}")))
}
