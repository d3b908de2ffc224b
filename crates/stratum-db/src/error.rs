//! Database-specific error types and conversions.

use stratum_core::error::StratumError;

/// Message thrown by the in-transaction path-length guard.
pub(crate) const CHILD_BUDGET_EXHAUSTED: &str = "intermediate child budget exhausted";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected a write.
    #[error("Unique index `{index}` violated: {detail}")]
    UniqueViolation { index: String, detail: String },

    /// The path-length guard staged with a CA insert found the parent's
    /// intermediate budget already used by a committed sibling.
    #[error("Intermediate child budget exhausted: {0}")]
    ChildBudgetExhausted(String),

    /// Concurrent transactions touched the same records.
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),
}

impl DbError {
    /// Classify a raw SurrealDB error message produced by a failed
    /// statement.
    pub(crate) fn from_statement_error(message: String) -> Self {
        if message.contains(CHILD_BUDGET_EXHAUSTED) {
            DbError::ChildBudgetExhausted(message)
        } else if message.contains("already contains") {
            let index = message
                .split('`')
                .nth(1)
                .unwrap_or("unknown")
                .to_string();
            DbError::UniqueViolation {
                index,
                detail: message,
            }
        } else if message.contains("conflict") || message.contains("can be retried") {
            DbError::TransactionConflict(message)
        } else {
            DbError::Transaction(message)
        }
    }
}

/// Entity owning a unique index, for error reporting.
fn index_entity(index: &str) -> &'static str {
    match index {
        "idx_ca_tenant_dn" => "certificate_authority",
        "idx_serial_registry_serial" => "serial_number",
        "idx_ca_cert_material_version" | "idx_ca_key_pair_version" => "ca_material",
        "idx_cert_material_certificate" => "certificate_material",
        _ => "record",
    }
}

impl From<DbError> for StratumError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => StratumError::NotFound { entity, id },
            DbError::UniqueViolation { index, detail } => StratumError::Conflict {
                entity: index_entity(&index).into(),
                detail,
            },
            DbError::TransactionConflict(message) | DbError::ChildBudgetExhausted(message) => {
                StratumError::Storage {
                    message,
                    retryable: true,
                }
            }
            other => StratumError::storage(other.to_string()),
        }
    }
}
