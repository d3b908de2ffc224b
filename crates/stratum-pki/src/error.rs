use stratum_core::error::StratumError;
use thiserror::Error;

/// Failures of the built-in key encryptor.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: {0}")]
    Decrypt(String),
}

impl From<CryptoError> for StratumError {
    fn from(err: CryptoError) -> Self {
        StratumError::Crypto(err.to_string())
    }
}
