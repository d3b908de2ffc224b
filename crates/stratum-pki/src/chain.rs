//! Certificate chain assembly.
//!
//! Chains are leaf-first: the requested CA (or certificate) comes first and
//! the root last. Pending CAs have no certificate and are skipped.

use std::collections::HashSet;

use stratum_core::error::{StratumError, StratumResult};
use stratum_core::repository::{MaterialRepository, PkiStore, Repository};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::PkiConfig;

/// Walks a CA's ancestry and collects the current PEM of each CA.
pub struct ChainBuilder<S: PkiStore> {
    store: S,
    max_depth: usize,
}

impl<S: PkiStore> ChainBuilder<S> {
    pub fn new(store: S, config: &PkiConfig) -> Self {
        Self {
            store,
            max_depth: config.max_hierarchy_depth,
        }
    }

    /// PEM certificates from `ca_id` up to its root.
    pub async fn build_chain(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> StratumResult<Vec<String>> {
        let authorities = self.store.authorities();
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(ca_id);

        while let Some(id) = next {
            if visited.len() >= self.max_depth {
                warn!(
                    %tenant_id,
                    ca_id = %id,
                    max_depth = self.max_depth,
                    "Chain exceeds depth ceiling"
                );
                return Err(StratumError::CorruptHierarchy {
                    id,
                    reason: format!("chain longer than {}", self.max_depth),
                });
            }
            if !visited.insert(id) {
                warn!(%tenant_id, ca_id = %id, "Cycle detected while building chain");
                return Err(StratumError::CorruptHierarchy {
                    id,
                    reason: "CA appears twice in its own chain".into(),
                });
            }

            let ca = match authorities.get_by_id(tenant_id, id).await {
                Ok(ca) => ca,
                Err(StratumError::NotFound { .. }) if id != ca_id => {
                    warn!(%tenant_id, ca_id = %id, "Dangling parent reference");
                    return Err(StratumError::CorruptHierarchy {
                        id,
                        reason: "parent CA does not exist".into(),
                    });
                }
                Err(e) => return Err(e),
            };

            if ca.is_active() {
                match self
                    .store
                    .materials()
                    .current_ca_certificate(tenant_id, ca.id)
                    .await?
                {
                    Some(material) => chain.push(material.certificate_pem),
                    None => {
                        warn!(%tenant_id, ca_id = %ca.id, "Active CA has no certificate material");
                    }
                }
            } else {
                debug!(%tenant_id, ca_id = %ca.id, "Skipping pending CA");
            }

            next = ca.parent_ca_id;
        }

        Ok(chain)
    }

    /// An end-entity certificate's PEM followed by its issuer's chain.
    pub async fn build_certificate_chain(
        &self,
        tenant_id: Uuid,
        certificate_id: Uuid,
    ) -> StratumResult<Vec<String>> {
        let certificate = self
            .store
            .certificates()
            .get_by_id(tenant_id, certificate_id)
            .await?;

        let mut chain = Vec::new();
        if let Some(material) = self
            .store
            .materials()
            .certificate_material(tenant_id, certificate_id)
            .await?
        {
            chain.push(material.certificate_pem);
        }
        chain.extend(self.build_chain(tenant_id, certificate.ca_id).await?);
        Ok(chain)
    }
}
