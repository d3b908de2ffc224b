//! Process configuration read from `STRATUM_*` environment variables.

use std::env;

use stratum_db::DbConfig;
use stratum_pki::{AesGcmKeyEncryptor, CryptoError, PkiConfig};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("STRATUM_KEY_ENCRYPTION_KEY is not set")]
    MissingEncryptionKey,

    #[error("STRATUM_KEY_ENCRYPTION_KEY is invalid: {0}")]
    InvalidEncryptionKey(#[from] CryptoError),

    #[error("{name} must be a positive integer, got `{value}`")]
    InvalidNumber { name: &'static str, value: String },
}

#[derive(Debug)]
pub struct ServerConfig {
    pub db: DbConfig,
    pub pki: PkiConfig,
    pub encryptor: AesGcmKeyEncryptor,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = DbConfig::default();
        let db = DbConfig {
            url: lookup("STRATUM_DB_URL").unwrap_or(defaults.url),
            namespace: lookup("STRATUM_DB_NAMESPACE").unwrap_or(defaults.namespace),
            database: lookup("STRATUM_DB_DATABASE").unwrap_or(defaults.database),
            username: lookup("STRATUM_DB_USER").unwrap_or(defaults.username),
            password: lookup("STRATUM_DB_PASSWORD").unwrap_or(defaults.password),
        };

        let mut pki = PkiConfig::default();
        if let Some(value) = lookup("STRATUM_MAX_HIERARCHY_DEPTH") {
            pki.max_hierarchy_depth = match value.trim().parse::<usize>() {
                Ok(depth) if depth > 0 => depth,
                _ => {
                    return Err(ConfigError::InvalidNumber {
                        name: "STRATUM_MAX_HIERARCHY_DEPTH",
                        value,
                    });
                }
            };
        }

        let key =
            lookup("STRATUM_KEY_ENCRYPTION_KEY").ok_or(ConfigError::MissingEncryptionKey)?;
        let encryptor = AesGcmKeyEncryptor::from_base64(&key)?;

        Ok(Self { db, pki, encryptor })
    }
}
