//! Stratum PKI: constraint validation, two-phase issuance and chain
//! building over a tenant-scoped CA hierarchy.
//!
//! The components here never sign anything. Callers obtain certificates
//! from their own [`SigningDelegate`](stratum_core::collaborator::SigningDelegate)
//! and hand the result to the [`IssuanceOrchestrator`] for activation.

pub mod chain;
pub mod config;
pub mod encryption;
pub mod error;
pub mod orchestrator;
pub mod validator;

pub use chain::ChainBuilder;
pub use config::PkiConfig;
pub use encryption::AesGcmKeyEncryptor;
pub use error::CryptoError;
pub use orchestrator::IssuanceOrchestrator;
pub use validator::ConstraintValidator;
