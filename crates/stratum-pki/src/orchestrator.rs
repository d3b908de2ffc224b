//! Two-phase issuance: reserve a CA or certificate as pending, then
//! activate it with material produced by the caller's signing delegate.
//!
//! Every write is a single store transaction. A failure at any step,
//! including encryption, leaves the store exactly as it was.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stratum_core::collaborator::KeyEncryptor;
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::certificate::{
    Certificate, CreateCertificate, IssuedCertificate, UpdateCertificate,
};
use stratum_core::models::certificate_authority::{
    CaType, CertificateAuthority, CreateCertificateAuthority, IssuanceStatus,
    UpdateCertificateAuthority,
};
use stratum_core::models::material::{CaKeyPair, IssuedCaMaterial, SealedCaMaterial};
use stratum_core::repository::{
    CertificateAuthorityRepository, CertificateRepository, MaterialRepository, PkiStore,
    Repository,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::PkiConfig;
use crate::validator::{ConstraintValidator, check_validity_nesting};

type ParentLock = Arc<tokio::sync::Mutex<()>>;

/// Coordinates validation, encryption and the store for every lifecycle
/// write.
///
/// Generic over the store and the key encryptor so that the PKI layer has
/// no dependency on the database crate.
pub struct IssuanceOrchestrator<S: PkiStore, E: KeyEncryptor> {
    store: S,
    encryptor: E,
    validator: ConstraintValidator,
    parent_locks: Mutex<HashMap<Uuid, ParentLock>>,
}

impl<S: PkiStore, E: KeyEncryptor> IssuanceOrchestrator<S, E> {
    pub fn new(store: S, encryptor: E, config: &PkiConfig) -> Self {
        Self {
            store,
            encryptor,
            validator: ConstraintValidator::new(config),
            parent_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn parent_lock(&self, parent_id: Uuid) -> ParentLock {
        let mut locks = self
            .parent_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(parent_id).or_default().clone()
    }

    /// Drop the caller's handle and forget the lock once nobody else holds
    /// or waits on it.
    fn release_parent_lock(&self, parent_id: Uuid, lock: ParentLock) {
        let mut locks = self
            .parent_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(lock);
        if locks
            .get(&parent_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            locks.remove(&parent_id);
        }
    }

    // -------------------------------------------------------------------
    // Certificate authorities
    // -------------------------------------------------------------------

    /// Reserve a new CA in `PendingCertificate` state.
    ///
    /// Creations under the same parent are serialised in-process. The
    /// insert transaction also writes the parent row and re-counts the
    /// parent's intermediate children, so writers in other processes either
    /// conflict at commit or trip the budget guard. Either outcome is
    /// retried once from validation, which then reports the rule the losing
    /// writer would break.
    pub async fn create_ca(
        &self,
        input: CreateCertificateAuthority,
    ) -> StratumResult<CertificateAuthority> {
        let Some(parent_id) = input.parent_ca_id else {
            return self.create_ca_with_retry(&input).await;
        };

        let lock = self.parent_lock(parent_id);
        let result = {
            let _guard = lock.lock().await;
            self.create_ca_with_retry(&input).await
        };
        self.release_parent_lock(parent_id, lock);
        result
    }

    async fn create_ca_with_retry(
        &self,
        input: &CreateCertificateAuthority,
    ) -> StratumResult<CertificateAuthority> {
        match self.try_create_ca(input).await {
            Err(err) if err.is_retryable() => {
                warn!(
                    tenant_id = %input.tenant_id,
                    parent_ca_id = ?input.parent_ca_id,
                    error = %err,
                    "Concurrent write creating CA, retrying once"
                );
                self.try_create_ca(input).await
            }
            other => other,
        }
    }

    async fn try_create_ca(
        &self,
        input: &CreateCertificateAuthority,
    ) -> StratumResult<CertificateAuthority> {
        let authorities = self.store.authorities();
        let ancestors = self.validator.validate_new_ca(authorities, input).await?;

        let ca = CertificateAuthority::new_pending(input.clone());
        let mut tx = self.store.begin();
        if let Some(parent) = ancestors.first() {
            authorities.stage_lock(&mut tx, ca.tenant_id, parent.id);
            if let Some(max_path_length) = parent.max_path_length {
                authorities.stage_child_budget(&mut tx, ca.tenant_id, parent.id, max_path_length);
            }
        }
        authorities.stage_insert(&mut tx, &ca);
        self.store.commit(tx).await?;

        info!(
            tenant_id = %ca.tenant_id,
            ca_id = %ca.id,
            ca_type = ca.ca_type.as_str(),
            dn = %ca.dn,
            "CA created"
        );
        authorities.get_by_id(ca.tenant_id, ca.id).await
    }

    /// Attach the first certificate and key pair to a pending CA and mark
    /// it active.
    pub async fn activate_ca(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
        material: IssuedCaMaterial,
    ) -> StratumResult<CertificateAuthority> {
        material.validate()?;

        let ca = self.store.authorities().get_by_id(tenant_id, ca_id).await?;
        if ca.is_active() {
            return Err(StratumError::invalid_state(
                "certificate_authority",
                ca_id,
                "CA is already active",
            ));
        }

        let ca = self.write_ca_material(ca, material).await?;
        info!(
            %tenant_id,
            %ca_id,
            serial_number = ?ca.serial_number,
            "CA activated"
        );
        Ok(ca)
    }

    /// Append a new material version to an active CA. The chain builder
    /// and `issuer_key_pair` pick up the new version immediately.
    pub async fn rotate_ca_material(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
        material: IssuedCaMaterial,
    ) -> StratumResult<CertificateAuthority> {
        material.validate()?;

        let ca = self.store.authorities().get_by_id(tenant_id, ca_id).await?;
        if !ca.is_active() {
            return Err(StratumError::invalid_state(
                "certificate_authority",
                ca_id,
                "only active CAs can be rotated",
            ));
        }

        let ca = self.write_ca_material(ca, material).await?;
        info!(
            %tenant_id,
            %ca_id,
            serial_number = ?ca.serial_number,
            "CA material rotated"
        );
        Ok(ca)
    }

    async fn write_ca_material(
        &self,
        ca: CertificateAuthority,
        material: IssuedCaMaterial,
    ) -> StratumResult<CertificateAuthority> {
        let tenant_id = ca.tenant_id;

        // 1. Issuer must be active and enclose the new validity window.
        if ca.ca_type == CaType::Intermediate {
            let parent_id = ca.parent_ca_id.ok_or_else(|| StratumError::CorruptHierarchy {
                id: ca.id,
                reason: "intermediate CA without parent".into(),
            })?;
            let parent = self
                .store
                .authorities()
                .get_by_id(tenant_id, parent_id)
                .await?;
            if !parent.is_active() {
                return Err(StratumError::invalid_state(
                    "certificate_authority",
                    parent_id,
                    "issuing CA is not active",
                ));
            }
            check_validity_nesting(&parent, material.not_before, material.not_after)?;
        }

        // 2. Serial numbers are unique across every CA and certificate.
        self.ensure_serial_free(&material.serial_number).await?;

        // 3. Only ciphertext reaches the store.
        let encrypted_private_key = self.encryptor.encrypt(&material.private_key).await?;
        let version = self
            .store
            .materials()
            .latest_ca_version(tenant_id, ca.id)
            .await?
            + 1;
        let sealed = SealedCaMaterial {
            certificate_pem: material.certificate_pem,
            certificate_chain_pem: material.certificate_chain_pem,
            serial_number: material.serial_number,
            not_before: material.not_before,
            not_after: material.not_after,
            public_key: material.public_key,
            encrypted_private_key,
        };

        // 4. Material, serial registration and CA state in one transaction.
        let mut tx = self.store.begin();
        self.store
            .materials()
            .stage_ca_material(&mut tx, tenant_id, ca.id, version, &sealed);
        self.store.authorities().stage_update(
            &mut tx,
            tenant_id,
            ca.id,
            &UpdateCertificateAuthority {
                status: Some(IssuanceStatus::Active),
                serial_number: Some(sealed.serial_number.clone()),
                not_before: Some(sealed.not_before),
                not_after: Some(sealed.not_after),
            },
        );
        self.store.commit(tx).await?;

        self.store.authorities().get_by_id(tenant_id, ca.id).await
    }

    /// Current key pair of an active CA with the private key decrypted,
    /// ready to hand to a signing delegate.
    pub async fn issuer_key_pair(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> StratumResult<CaKeyPair> {
        let ca = self.store.authorities().get_by_id(tenant_id, ca_id).await?;
        if !ca.is_active() {
            return Err(StratumError::invalid_state(
                "certificate_authority",
                ca_id,
                "CA has no key material yet",
            ));
        }

        let stored = self
            .store
            .materials()
            .current_ca_key_pair(tenant_id, ca_id)
            .await?
            .ok_or_else(|| StratumError::not_found("ca_key_pair", ca_id))?;
        let private_key = self.encryptor.decrypt(&stored.encrypted_private_key).await?;

        Ok(CaKeyPair {
            ca_id,
            version: stored.version,
            public_key: stored.public_key,
            private_key,
        })
    }

    /// Delete a CA together with its descendants, their material and the
    /// certificates issued beneath them.
    pub async fn delete_ca(&self, tenant_id: Uuid, ca_id: Uuid) -> StratumResult<()> {
        self.store.authorities().delete(tenant_id, ca_id).await?;
        info!(%tenant_id, %ca_id, "CA deleted");
        Ok(())
    }

    // -------------------------------------------------------------------
    // End-entity certificates
    // -------------------------------------------------------------------

    /// Reserve a certificate under an active CA.
    pub async fn create_certificate(
        &self,
        input: CreateCertificate,
    ) -> StratumResult<Certificate> {
        self.validator
            .validate_new_certificate(self.store.authorities(), &input)
            .await?;

        let certificate = self.store.certificates().create(input).await?;
        info!(
            tenant_id = %certificate.tenant_id,
            certificate_id = %certificate.id,
            ca_id = %certificate.ca_id,
            "Certificate reserved"
        );
        Ok(certificate)
    }

    /// Attach issued material to a pending certificate and mark it active.
    pub async fn activate_certificate(
        &self,
        tenant_id: Uuid,
        certificate_id: Uuid,
        issued: IssuedCertificate,
    ) -> StratumResult<Certificate> {
        issued.validate()?;

        let certificate = self
            .store
            .certificates()
            .get_by_id(tenant_id, certificate_id)
            .await?;
        if certificate.is_active() {
            return Err(StratumError::invalid_state(
                "certificate",
                certificate_id,
                "certificate is already active",
            ));
        }

        let ca = self
            .store
            .authorities()
            .get_by_id(tenant_id, certificate.ca_id)
            .await?;
        if !ca.is_active() {
            return Err(StratumError::invalid_state(
                "certificate_authority",
                ca.id,
                "issuing CA is not active",
            ));
        }
        check_validity_nesting(&ca, issued.not_before, issued.not_after)?;
        self.ensure_serial_free(&issued.serial_number).await?;

        let mut tx = self.store.begin();
        self.store
            .materials()
            .stage_certificate_material(&mut tx, tenant_id, &certificate, &issued);
        self.store.certificates().stage_update(
            &mut tx,
            tenant_id,
            certificate_id,
            &UpdateCertificate {
                status: Some(IssuanceStatus::Active),
                serial_number: Some(issued.serial_number.clone()),
                not_before: Some(issued.not_before),
                not_after: Some(issued.not_after),
            },
        );
        self.store.commit(tx).await?;

        info!(
            %tenant_id,
            %certificate_id,
            ca_id = %ca.id,
            serial_number = %issued.serial_number,
            "Certificate issued"
        );
        self.store
            .certificates()
            .get_by_id(tenant_id, certificate_id)
            .await
    }

    async fn ensure_serial_free(&self, serial_number: &str) -> StratumResult<()> {
        if self.store.materials().serial_in_use(serial_number).await? {
            return Err(StratumError::Conflict {
                entity: "serial_number".into(),
                detail: format!("serial number `{serial_number}` is already issued"),
            });
        }
        Ok(())
    }
}
