//! AES-256-GCM envelope encryption for CA private keys.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use stratum_core::collaborator::KeyEncryptor;
use stratum_core::error::StratumResult;

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;

/// [`KeyEncryptor`] backed by a single 256-bit key held in memory.
///
/// Ciphertext layout is `nonce || ciphertext || tag`.
#[derive(Clone)]
pub struct AesGcmKeyEncryptor {
    key: [u8; 32],
}

impl std::fmt::Debug for AesGcmKeyEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmKeyEncryptor")
            .field("key", &"<redacted>")
            .finish()
    }
}

impl AesGcmKeyEncryptor {
    pub fn new(key: [u8; 32]) -> Self {
        Self { key }
    }

    /// Build from a base64-encoded 32-byte key.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("base64 decode: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            CryptoError::InvalidKey(format!("expected 32 bytes, got {}", b.len()))
        })?;
        Ok(Self::new(key))
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encrypt(format!("AES-GCM encrypt: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);
        Ok(combined)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if sealed.len() <= NONCE_LEN {
            return Err(CryptoError::Decrypt("ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| CryptoError::Decrypt(format!("AES-GCM decrypt: {e}")))
    }
}

impl KeyEncryptor for AesGcmKeyEncryptor {
    async fn encrypt(&self, plaintext: &[u8]) -> StratumResult<Vec<u8>> {
        Ok(self.seal(plaintext)?)
    }

    async fn decrypt(&self, ciphertext: &[u8]) -> StratumResult<Vec<u8>> {
        Ok(self.open(ciphertext)?)
    }
}
