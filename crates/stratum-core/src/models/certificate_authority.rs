//! Certificate Authority domain model.
//!
//! CAs form a per-tenant forest: root CAs have no parent, intermediate CAs
//! point at the CA that signed them. A CA is created in
//! [`IssuanceStatus::PendingCertificate`] and becomes
//! [`IssuanceStatus::Active`] once its key and certificate material have
//! been attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConstraintViolation;

/// Position of a CA in its hierarchy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaType {
    /// Self-signed, no parent.
    Root,
    /// Signed by a parent CA.
    Intermediate,
}

impl CaType {
    pub fn as_str(self) -> &'static str {
        match self {
            CaType::Root => "Root",
            CaType::Intermediate => "Intermediate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Root" => Some(CaType::Root),
            "Intermediate" => Some(CaType::Intermediate),
            _ => None,
        }
    }
}

/// Two-phase issuance status shared by CAs and end-entity certificates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IssuanceStatus {
    /// Metadata reserved, no cryptographic material yet.
    PendingCertificate,
    /// Key and certificate material attached.
    Active,
}

impl IssuanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssuanceStatus::PendingCertificate => "PendingCertificate",
            IssuanceStatus::Active => "Active",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PendingCertificate" => Some(IssuanceStatus::PendingCertificate),
            "Active" => Some(IssuanceStatus::Active),
            _ => None,
        }
    }
}

/// Subject naming attributes of a CA.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistinguishedName {
    pub organization: String,
    pub organizational_unit: String,
    /// Two-letter ISO 3166 code, or empty.
    pub country: String,
    pub province: String,
    pub locality: String,
    pub common_name: String,
}

impl DistinguishedName {
    /// Renders the `dn` string stored alongside the components,
    /// e.g. `C=US,ST=CA,L=SF,O=Acme,OU=PKI,CN=Acme Root`.
    ///
    /// Empty components are omitted.
    pub fn to_dn_string(&self) -> String {
        [
            ("C", &self.country),
            ("ST", &self.province),
            ("L", &self.locality),
            ("O", &self.organization),
            ("OU", &self.organizational_unit),
            ("CN", &self.common_name),
        ]
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| format!("{key}={}", value.trim()))
        .collect::<Vec<_>>()
        .join(",")
    }

    /// Checks the components that X.509 constrains.
    pub fn validate(&self) -> Result<(), ConstraintViolation> {
        if self.common_name.trim().is_empty() {
            return Err(ConstraintViolation::MalformedInput(
                "common name must not be empty".into(),
            ));
        }
        let country = self.country.trim();
        if !country.is_empty()
            && !(country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic()))
        {
            return Err(ConstraintViolation::MalformedInput(format!(
                "country must be a two-letter code, got `{country}`"
            )));
        }
        Ok(())
    }
}

/// A Certificate Authority within a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateAuthority {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// The CA that signed this one. `None` for roots.
    pub parent_ca_id: Option<Uuid>,
    pub ca_type: CaType,
    pub status: IssuanceStatus,
    pub subject: DistinguishedName,
    /// Rendered form of `subject`; unique per tenant.
    pub dn: String,
    /// X.509 basic-constraints path length. `None` means unconstrained.
    pub max_path_length: Option<u32>,
    /// Set on activation.
    pub serial_number: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CertificateAuthority {
    /// A freshly reserved CA: pending, without serial or validity.
    pub fn new_pending(input: CreateCertificateAuthority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            parent_ca_id: input.parent_ca_id,
            ca_type: input.ca_type,
            status: IssuanceStatus::PendingCertificate,
            dn: input.subject.to_dn_string(),
            subject: input.subject,
            max_path_length: input.max_path_length,
            serial_number: None,
            not_before: None,
            not_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == IssuanceStatus::Active
    }
}

/// Fields required to reserve a new CA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCertificateAuthority {
    pub tenant_id: Uuid,
    pub parent_ca_id: Option<Uuid>,
    pub ca_type: CaType,
    pub subject: DistinguishedName,
    pub max_path_length: Option<u32>,
}

/// Fields that change over a CA's lifecycle. Naming, type and parent link
/// are immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCertificateAuthority {
    pub status: Option<IssuanceStatus>,
    pub serial_number: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
}

/// Optional filters for listing CAs within a tenant.
#[derive(Debug, Clone, Default)]
pub struct CaFilter {
    pub parent_ca_id: Option<Uuid>,
    pub ca_type: Option<CaType>,
    pub status: Option<IssuanceStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> DistinguishedName {
        DistinguishedName {
            organization: "Acme".into(),
            organizational_unit: "PKI".into(),
            country: "US".into(),
            province: "California".into(),
            locality: "San Francisco".into(),
            common_name: "Acme Root CA".into(),
        }
    }

    #[test]
    fn dn_string_orders_components() {
        assert_eq!(
            acme().to_dn_string(),
            "C=US,ST=California,L=San Francisco,O=Acme,OU=PKI,CN=Acme Root CA"
        );
    }

    #[test]
    fn dn_string_skips_empty_components() {
        let dn = DistinguishedName {
            common_name: "Lone CA".into(),
            organization: "Acme".into(),
            ..Default::default()
        };
        assert_eq!(dn.to_dn_string(), "O=Acme,CN=Lone CA");
    }

    #[test]
    fn empty_common_name_rejected() {
        let dn = DistinguishedName {
            common_name: "  ".into(),
            ..acme()
        };
        assert!(matches!(
            dn.validate(),
            Err(ConstraintViolation::MalformedInput(_))
        ));
    }

    #[test]
    fn bad_country_rejected() {
        let dn = DistinguishedName {
            country: "USA".into(),
            ..acme()
        };
        assert!(dn.validate().is_err());
        assert!(acme().validate().is_ok());
    }

    #[test]
    fn status_strings_roundtrip() {
        for status in [IssuanceStatus::PendingCertificate, IssuanceStatus::Active] {
            assert_eq!(IssuanceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CaType::parse("Leaf"), None);
    }
}
