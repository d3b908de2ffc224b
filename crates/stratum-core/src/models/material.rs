//! Cryptographic material attached to CAs and certificates.
//!
//! Material rows are append-only and versioned per owner: rotating a CA
//! adds a new version instead of replacing the old one, and readers use the
//! highest version. Private keys are only ever persisted as ciphertext
//! produced by a [`KeyEncryptor`](crate::collaborator::KeyEncryptor).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConstraintViolation;

/// PEM certificate and chain for a CA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaCertificateMaterial {
    pub id: Uuid,
    pub ca_id: Uuid,
    pub version: u32,
    pub certificate_pem: String,
    /// Full chain as issued by the signing delegate.
    pub certificate_chain_pem: String,
    pub created_at: DateTime<Utc>,
}

/// A CA key pair as stored: the private key is ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCaKeyPair {
    pub id: Uuid,
    pub ca_id: Uuid,
    pub version: u32,
    pub public_key: Vec<u8>,
    pub encrypted_private_key: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// A CA key pair after decryption.
#[derive(Clone, Serialize, Deserialize)]
pub struct CaKeyPair {
    pub ca_id: Uuid,
    pub version: u32,
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for CaKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaKeyPair")
            .field("ca_id", &self.ca_id)
            .field("version", &self.version)
            .field("public_key", &self.public_key.len())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// PEM certificate and chain for an end-entity certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateMaterial {
    pub id: Uuid,
    pub certificate_id: Uuid,
    pub ca_id: Uuid,
    pub certificate_pem: String,
    pub certificate_chain_pem: String,
    pub created_at: DateTime<Utc>,
}

/// Output of the signing delegate for a CA, handed to activation or
/// rotation.
#[derive(Clone, Serialize, Deserialize)]
pub struct IssuedCaMaterial {
    pub certificate_pem: String,
    pub certificate_chain_pem: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key: Vec<u8>,
    /// Plaintext private key; encrypted before it reaches the store.
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for IssuedCaMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCaMaterial")
            .field("serial_number", &self.serial_number)
            .field("not_before", &self.not_before)
            .field("not_after", &self.not_after)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

impl IssuedCaMaterial {
    pub fn validate(&self) -> Result<(), ConstraintViolation> {
        validate_issued(
            &self.certificate_pem,
            &self.serial_number,
            self.not_before,
            self.not_after,
        )?;
        if self.private_key.is_empty() || self.public_key.is_empty() {
            return Err(ConstraintViolation::MalformedInput(
                "key pair must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Stored CA material after encryption, ready to be staged in a
/// transaction.
#[derive(Debug, Clone)]
pub struct SealedCaMaterial {
    pub certificate_pem: String,
    pub certificate_chain_pem: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub public_key: Vec<u8>,
    pub encrypted_private_key: Vec<u8>,
}

pub(crate) fn validate_issued(
    certificate_pem: &str,
    serial_number: &str,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Result<(), ConstraintViolation> {
    if certificate_pem.trim().is_empty() {
        return Err(ConstraintViolation::MalformedInput(
            "certificate PEM must not be empty".into(),
        ));
    }
    if serial_number.trim().is_empty() {
        return Err(ConstraintViolation::MalformedInput(
            "serial number must not be empty".into(),
        ));
    }
    if not_before >= not_after {
        return Err(ConstraintViolation::MalformedInput(
            "not_before must be earlier than not_after".into(),
        ));
    }
    Ok(())
}
