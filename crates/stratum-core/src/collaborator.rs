//! Contracts for the external services Stratum relies on.
//!
//! Neither collaborator is implemented by the core: key encryption is an
//! envelope service wrapped around every private-key write and read, and
//! signing happens in the caller before a CA or certificate is activated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StratumResult;
use crate::models::certificate_authority::DistinguishedName;
use crate::models::material::CaKeyPair;

/// Envelope encryption for private key bytes.
///
/// Any error must abort the enclosing operation before it commits.
pub trait KeyEncryptor: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> impl Future<Output = StratumResult<Vec<u8>>> + Send;
    fn decrypt(&self, ciphertext: &[u8]) -> impl Future<Output = StratumResult<Vec<u8>>> + Send;
}

/// What the caller asks its signing delegate to produce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningRequest {
    /// The CA or certificate being issued.
    pub subject_id: Uuid,
    pub subject: DistinguishedName,
    /// Basic-constraints path length; only meaningful when `is_ca`.
    pub max_path_length: Option<u32>,
    pub is_ca: bool,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// A signed certificate returned by the delegate.
#[derive(Clone, Serialize, Deserialize)]
pub struct SignedCertificate {
    pub certificate_pem: String,
    /// The issued certificate followed by its issuers.
    pub certificate_chain_pem: String,
    pub serial_number: String,
    pub public_key: Vec<u8>,
    pub private_key: Vec<u8>,
}

impl std::fmt::Debug for SignedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedCertificate")
            .field("serial_number", &self.serial_number)
            .field("private_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Produces signed certificates. `issuer` is `None` for self-signed roots.
pub trait SigningDelegate: Send + Sync {
    fn sign(
        &self,
        request: SigningRequest,
        issuer: Option<CaKeyPair>,
    ) -> impl Future<Output = StratumResult<SignedCertificate>> + Send;
}
