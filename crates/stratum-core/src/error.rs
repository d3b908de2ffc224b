//! Error types for the Stratum CA hierarchy engine.

use thiserror::Error;
use uuid::Uuid;

/// The structural rule a rejected write would have broken.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintViolation {
    #[error("parent CA {0} does not exist in this tenant")]
    ParentMissing(Uuid),

    #[error("parent CA {0} is not active")]
    ParentNotActive(Uuid),

    #[error("root CA must not reference a parent")]
    RootWithParent,

    #[error("intermediate CA must reference a parent")]
    IntermediateWithoutParent,

    /// An ancestor's `max_path_length` does not allow another
    /// intermediate at this depth, or the parent's budget is used up.
    #[error("path length exceeded: CA {ca_id} allows at most {max_path_length} intermediate CA(s)")]
    PathLengthExceeded { ca_id: Uuid, max_path_length: u32 },

    /// The new CA would sit below the configured hierarchy depth ceiling.
    #[error("hierarchy depth exceeded: at most {max_depth} CA levels allowed")]
    DepthExceeded { max_depth: usize },

    #[error("validity window is outside the issuing CA's validity")]
    ValidityOutsideIssuer,

    #[error("malformed input: {0}")]
    MalformedInput(String),
}

#[derive(Debug, Error)]
pub enum StratumError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict on {entity}: {detail}")]
    Conflict { entity: String, detail: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ConstraintViolation),

    #[error("Invalid state for {entity} {id}: {reason}")]
    InvalidState {
        entity: String,
        id: String,
        reason: String,
    },

    /// The stored hierarchy contains a cycle or exceeds the depth ceiling.
    /// Indicates a data-integrity problem; never auto-healed.
    #[error("Corrupt CA hierarchy at {id}: {reason}")]
    CorruptHierarchy { id: Uuid, reason: String },

    /// The store rejected or aborted the operation. Nothing was written;
    /// `retryable` operations may be re-run as a whole.
    #[error("Storage error: {message}")]
    Storage { message: String, retryable: bool },

    #[error("Cryptography error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StratumError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn invalid_state(entity: &str, id: Uuid, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            entity: entity.into(),
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage { retryable: true, .. })
    }

    /// Returns the violated rule if this is a validation failure.
    pub fn violation(&self) -> Option<&ConstraintViolation> {
        match self {
            Self::Validation(rule) => Some(rule),
            _ => None,
        }
    }
}

pub type StratumResult<T> = Result<T, StratumError>;
