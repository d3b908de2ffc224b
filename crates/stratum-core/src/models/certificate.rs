//! End-entity certificate domain model.
//!
//! Certificates follow the same two-phase lifecycle as CAs: reserved as
//! [`IssuanceStatus::PendingCertificate`] under an active CA, then
//! activated once the signing delegate has produced the certificate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::certificate_authority::IssuanceStatus;
use super::material::validate_issued;
use crate::error::ConstraintViolation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// The CA that issued this certificate.
    pub ca_id: Uuid,
    pub status: IssuanceStatus,
    pub common_name: String,
    pub serial_number: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Certificate {
    pub fn is_active(&self) -> bool {
        self.status == IssuanceStatus::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCertificate {
    pub tenant_id: Uuid,
    pub ca_id: Uuid,
    pub common_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCertificate {
    pub status: Option<IssuanceStatus>,
    pub serial_number: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct CertificateFilter {
    pub ca_id: Option<Uuid>,
    pub status: Option<IssuanceStatus>,
}

/// Output of the signing delegate for an end-entity certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub certificate_pem: String,
    pub certificate_chain_pem: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl IssuedCertificate {
    pub fn validate(&self) -> Result<(), ConstraintViolation> {
        validate_issued(
            &self.certificate_pem,
            &self.serial_number,
            self.not_before,
            self.not_after,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn inverted_validity_rejected() {
        let now = Utc::now();
        let issued = IssuedCertificate {
            certificate_pem: "-----BEGIN CERTIFICATE-----".into(),
            certificate_chain_pem: String::new(),
            serial_number: "01".into(),
            not_before: now,
            not_after: now - Duration::days(1),
        };
        assert!(matches!(
            issued.validate(),
            Err(ConstraintViolation::MalformedInput(_))
        ));
    }

    #[test]
    fn empty_serial_rejected() {
        let now = Utc::now();
        let issued = IssuedCertificate {
            certificate_pem: "pem".into(),
            certificate_chain_pem: String::new(),
            serial_number: " ".into(),
            not_before: now,
            not_after: now + Duration::days(1),
        };
        assert!(issued.validate().is_err());
    }
}
