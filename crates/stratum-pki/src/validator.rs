//! Structural checks run before a CA or certificate is written.
//!
//! The validator only reads. Callers that need the result to still hold at
//! commit time (the orchestrator) serialise validate+insert themselves.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use stratum_core::error::{ConstraintViolation, StratumError, StratumResult};
use stratum_core::models::certificate::CreateCertificate;
use stratum_core::models::certificate_authority::{
    CaType, CertificateAuthority, CreateCertificateAuthority,
};
use stratum_core::repository::{CertificateAuthorityRepository, Repository};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PkiConfig;

/// Validates hierarchy writes against a CA registry.
#[derive(Debug, Clone)]
pub struct ConstraintValidator {
    max_depth: usize,
}

impl ConstraintValidator {
    pub fn new(config: &PkiConfig) -> Self {
        Self {
            max_depth: config.max_hierarchy_depth,
        }
    }

    /// Check that `input` may be inserted as a new pending CA.
    ///
    /// On success returns the prospective parent (if any) followed by its
    /// ancestors, closest first.
    pub async fn validate_new_ca<R: CertificateAuthorityRepository>(
        &self,
        registry: &R,
        input: &CreateCertificateAuthority,
    ) -> StratumResult<Vec<CertificateAuthority>> {
        input.subject.validate()?;
        check_shape(input.ca_type, input.parent_ca_id)?;

        let ancestors = match input.parent_ca_id {
            Some(parent_id) => {
                let parent = match registry.get_by_id(input.tenant_id, parent_id).await {
                    Ok(parent) => parent,
                    Err(StratumError::NotFound { .. }) => {
                        return Err(ConstraintViolation::ParentMissing(parent_id).into());
                    }
                    Err(e) => return Err(e),
                };
                if !parent.is_active() {
                    return Err(ConstraintViolation::ParentNotActive(parent_id).into());
                }

                let ancestors = self.ancestors(registry, parent).await?;
                // The new CA counts toward the ceiling too.
                if ancestors.len() >= self.max_depth {
                    return Err(ConstraintViolation::DepthExceeded {
                        max_depth: self.max_depth,
                    }
                    .into());
                }
                let existing = registry
                    .count_intermediate_children(input.tenant_id, parent_id)
                    .await?;
                check_path_length(&ancestors, existing)?;
                ancestors
            }
            None => Vec::new(),
        };

        let dn = input.subject.to_dn_string();
        if registry.get_by_dn(input.tenant_id, &dn).await?.is_some() {
            return Err(StratumError::Conflict {
                entity: "certificate_authority".into(),
                detail: format!("distinguished name `{dn}` already exists in tenant"),
            });
        }

        Ok(ancestors)
    }

    /// Check that a certificate may be reserved under `input.ca_id`.
    /// Returns the issuing CA.
    pub async fn validate_new_certificate<R: CertificateAuthorityRepository>(
        &self,
        registry: &R,
        input: &CreateCertificate,
    ) -> StratumResult<CertificateAuthority> {
        if input.common_name.trim().is_empty() {
            return Err(ConstraintViolation::MalformedInput(
                "common name must not be empty".into(),
            )
            .into());
        }

        let ca = registry.get_by_id(input.tenant_id, input.ca_id).await?;
        if !ca.is_active() {
            return Err(StratumError::invalid_state(
                "certificate_authority",
                ca.id,
                "issuing CA is not active",
            ));
        }
        Ok(ca)
    }

    /// Walk from `start` up to its root. `start` is the first element.
    ///
    /// A repeated id, a dangling parent reference or a walk longer than the
    /// configured ceiling is reported as [`StratumError::CorruptHierarchy`].
    pub async fn ancestors<R: CertificateAuthorityRepository>(
        &self,
        registry: &R,
        start: CertificateAuthority,
    ) -> StratumResult<Vec<CertificateAuthority>> {
        let tenant_id = start.tenant_id;
        let mut visited = HashSet::from([start.id]);
        let mut next = start.parent_ca_id;
        let mut chain = vec![start];

        while let Some(id) = next {
            if chain.len() >= self.max_depth {
                warn!(
                    %tenant_id,
                    ca_id = %id,
                    max_depth = self.max_depth,
                    "Hierarchy exceeds depth ceiling"
                );
                return Err(StratumError::CorruptHierarchy {
                    id,
                    reason: format!("more than {} ancestors", self.max_depth),
                });
            }
            if !visited.insert(id) {
                warn!(%tenant_id, ca_id = %id, "Cycle detected in CA hierarchy");
                return Err(StratumError::CorruptHierarchy {
                    id,
                    reason: "CA appears twice on its own ancestor path".into(),
                });
            }

            let ca = match registry.get_by_id(tenant_id, id).await {
                Ok(ca) => ca,
                Err(StratumError::NotFound { .. }) => {
                    warn!(%tenant_id, ca_id = %id, "Dangling parent reference");
                    return Err(StratumError::CorruptHierarchy {
                        id,
                        reason: "parent CA does not exist".into(),
                    });
                }
                Err(e) => return Err(e),
            };
            debug!(%tenant_id, ca_id = %ca.id, depth = chain.len(), "Visited ancestor");
            next = ca.parent_ca_id;
            chain.push(ca);
        }

        Ok(chain)
    }
}

/// Roots stand alone; intermediates hang below a parent.
pub fn check_shape(
    ca_type: CaType,
    parent_ca_id: Option<Uuid>,
) -> Result<(), ConstraintViolation> {
    match (ca_type, parent_ca_id) {
        (CaType::Root, Some(_)) => Err(ConstraintViolation::RootWithParent),
        (CaType::Intermediate, None) => Err(ConstraintViolation::IntermediateWithoutParent),
        _ => Ok(()),
    }
}

/// Path-length budget for a new intermediate.
///
/// `ancestors[0]` is the prospective parent (distance 1). Every ancestor
/// with `max_path_length = k` at distance `d` requires `d <= k`, and the
/// parent additionally admits at most `k` intermediate children.
pub fn check_path_length(
    ancestors: &[CertificateAuthority],
    existing_intermediate_children: u64,
) -> Result<(), ConstraintViolation> {
    for (index, ancestor) in ancestors.iter().enumerate() {
        let Some(max_path_length) = ancestor.max_path_length else {
            continue;
        };
        let distance = index as u64 + 1;
        let exhausted = distance > u64::from(max_path_length)
            || (index == 0 && existing_intermediate_children >= u64::from(max_path_length));
        if exhausted {
            return Err(ConstraintViolation::PathLengthExceeded {
                ca_id: ancestor.id,
                max_path_length,
            });
        }
    }
    Ok(())
}

/// An issued validity window must sit inside its issuer's.
///
/// Issuers that carry no validity yet impose nothing.
pub fn check_validity_nesting(
    issuer: &CertificateAuthority,
    not_before: DateTime<Utc>,
    not_after: DateTime<Utc>,
) -> Result<(), ConstraintViolation> {
    if issuer.not_before.is_some_and(|nb| not_before < nb)
        || issuer.not_after.is_some_and(|na| not_after > na)
    {
        return Err(ConstraintViolation::ValidityOutsideIssuer);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use stratum_core::models::certificate_authority::{DistinguishedName, IssuanceStatus};

    use super::*;

    fn ca(max_path_length: Option<u32>) -> CertificateAuthority {
        let mut ca = CertificateAuthority::new_pending(CreateCertificateAuthority {
            tenant_id: Uuid::new_v4(),
            parent_ca_id: None,
            ca_type: CaType::Root,
            subject: DistinguishedName {
                common_name: "CA".into(),
                ..Default::default()
            },
            max_path_length,
        });
        ca.status = IssuanceStatus::Active;
        ca
    }

    #[test]
    fn shape_rules() {
        assert_eq!(
            check_shape(CaType::Root, Some(Uuid::new_v4())),
            Err(ConstraintViolation::RootWithParent)
        );
        assert_eq!(
            check_shape(CaType::Intermediate, None),
            Err(ConstraintViolation::IntermediateWithoutParent)
        );
        assert!(check_shape(CaType::Root, None).is_ok());
        assert!(check_shape(CaType::Intermediate, Some(Uuid::new_v4())).is_ok());
    }

    #[test]
    fn zero_path_length_forbids_intermediates() {
        let parent = ca(Some(0));
        assert_eq!(
            check_path_length(std::slice::from_ref(&parent), 0),
            Err(ConstraintViolation::PathLengthExceeded {
                ca_id: parent.id,
                max_path_length: 0
            })
        );
    }

    #[test]
    fn parent_budget_is_consumed_by_children() {
        let parent = ca(Some(1));
        assert!(check_path_length(std::slice::from_ref(&parent), 0).is_ok());
        assert!(check_path_length(std::slice::from_ref(&parent), 1).is_err());
    }

    #[test]
    fn unconstrained_parent_allows_any_number() {
        let parent = ca(None);
        assert!(check_path_length(std::slice::from_ref(&parent), 1000).is_ok());
    }

    #[test]
    fn grandparent_limit_applies_by_distance() {
        // root(k=1) -> parent(unconstrained) -> new: distance 2 > 1.
        let parent = ca(None);
        let root = ca(Some(1));
        let err = check_path_length(&[parent, root.clone()], 0).unwrap_err();
        assert_eq!(
            err,
            ConstraintViolation::PathLengthExceeded {
                ca_id: root.id,
                max_path_length: 1
            }
        );

        // Children of the parent do not count against the grandparent.
        let root = ca(Some(2));
        assert!(check_path_length(&[ca(None), root], 5).is_ok());
    }

    #[test]
    fn validity_must_nest() {
        let now = Utc::now();
        let mut issuer = ca(None);
        issuer.not_before = Some(now);
        issuer.not_after = Some(now + Duration::days(10));

        assert!(check_validity_nesting(&issuer, now, now + Duration::days(5)).is_ok());
        assert_eq!(
            check_validity_nesting(&issuer, now, now + Duration::days(11)),
            Err(ConstraintViolation::ValidityOutsideIssuer)
        );
        assert_eq!(
            check_validity_nesting(&issuer, now - Duration::days(1), now + Duration::days(1)),
            Err(ConstraintViolation::ValidityOutsideIssuer)
        );
    }

    #[test]
    fn issuer_without_validity_imposes_nothing() {
        let now = Utc::now();
        assert!(check_validity_nesting(&ca(None), now, now + Duration::days(9999)).is_ok());
    }
}
