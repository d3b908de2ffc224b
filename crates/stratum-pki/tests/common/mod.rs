//! Shared fixtures: in-memory store, orchestrator, chain builder and a
//! fake signing delegate that mints predictable PEM strings.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{Duration, Utc};
use stratum_core::collaborator::{
    KeyEncryptor, SignedCertificate, SigningDelegate, SigningRequest,
};
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::certificate::{Certificate, CreateCertificate, IssuedCertificate};
use stratum_core::models::certificate_authority::{
    CaType, CertificateAuthority, CreateCertificateAuthority, DistinguishedName,
};
use stratum_core::models::material::{CaKeyPair, IssuedCaMaterial};
use stratum_core::repository::{PkiStore, Repository};
use stratum_db::SurrealTransaction;
use stratum_db::repository::{
    SurrealCertificateAuthorityRepository, SurrealCertificateRepository, SurrealMaterialRepository,
    SurrealPkiStore,
};
use stratum_pki::{AesGcmKeyEncryptor, ChainBuilder, IssuanceOrchestrator, PkiConfig};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

pub type Store = SurrealPkiStore<Db>;

pub const ENCRYPTION_KEY: [u8; 32] = [42u8; 32];

/// Signs by formatting the subject and a counter-based serial.
pub struct FakeSigner {
    next_serial: AtomicU64,
}

impl FakeSigner {
    pub fn new() -> Self {
        Self {
            next_serial: AtomicU64::new(1),
        }
    }
}

pub fn pem(common_name: &str, serial: &str) -> String {
    format!("-----BEGIN CERTIFICATE-----\n{common_name}/{serial}\n-----END CERTIFICATE-----")
}

impl SigningDelegate for FakeSigner {
    async fn sign(
        &self,
        request: SigningRequest,
        issuer: Option<CaKeyPair>,
    ) -> StratumResult<SignedCertificate> {
        let serial = format!("{:06X}", self.next_serial.fetch_add(1, Ordering::SeqCst));
        let certificate_pem = pem(&request.subject.common_name, &serial);
        let issuer_note = match issuer {
            Some(key) => format!("issued-by-{}-v{}", key.ca_id, key.version),
            None => "self-signed".to_string(),
        };
        Ok(SignedCertificate {
            certificate_chain_pem: format!("{certificate_pem}\n{issuer_note}"),
            certificate_pem,
            public_key: format!("public-{serial}").into_bytes(),
            private_key: format!("private-{serial}").into_bytes(),
            serial_number: serial,
        })
    }
}

/// Refuses every key operation.
pub struct FailingEncryptor;

impl KeyEncryptor for FailingEncryptor {
    async fn encrypt(&self, _plaintext: &[u8]) -> StratumResult<Vec<u8>> {
        Err(StratumError::Crypto("key service unavailable".into()))
    }

    async fn decrypt(&self, _ciphertext: &[u8]) -> StratumResult<Vec<u8>> {
        Err(StratumError::Crypto("key service unavailable".into()))
    }
}

/// Delegates to a real store but aborts the next `conflicts` commits with
/// a retryable storage error, as a concurrent writer would cause.
#[derive(Clone)]
pub struct ConflictingStore {
    inner: Store,
    conflicts: Arc<AtomicUsize>,
    pub commits: Arc<AtomicUsize>,
}

impl ConflictingStore {
    pub fn new(inner: Store, conflicts: usize) -> Self {
        Self {
            inner,
            conflicts: Arc::new(AtomicUsize::new(conflicts)),
            commits: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PkiStore for ConflictingStore {
    type Tx = SurrealTransaction;
    type Authorities = SurrealCertificateAuthorityRepository<Db>;
    type Materials = SurrealMaterialRepository<Db>;
    type Certificates = SurrealCertificateRepository<Db>;

    fn authorities(&self) -> &Self::Authorities {
        self.inner.authorities()
    }

    fn materials(&self) -> &Self::Materials {
        self.inner.materials()
    }

    fn certificates(&self) -> &Self::Certificates {
        self.inner.certificates()
    }

    fn begin(&self) -> SurrealTransaction {
        self.inner.begin()
    }

    async fn commit(&self, tx: SurrealTransaction) -> StratumResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StratumError::Storage {
                message: "write conflict, can be retried".into(),
                retryable: true,
            });
        }
        self.inner.commit(tx).await
    }
}

pub struct Harness {
    pub db: Surreal<Db>,
    pub store: Store,
    pub orchestrator: IssuanceOrchestrator<Store, AesGcmKeyEncryptor>,
    pub chains: ChainBuilder<Store>,
    pub signer: FakeSigner,
    pub tenant_id: Uuid,
}

pub async fn setup() -> Harness {
    setup_with(PkiConfig::default()).await
}

pub async fn setup_with(config: PkiConfig) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    stratum_db::run_migrations(&db).await.unwrap();

    let store = SurrealPkiStore::with_max_hierarchy_depth(db.clone(), config.max_hierarchy_depth);
    Harness {
        orchestrator: IssuanceOrchestrator::new(
            store.clone(),
            AesGcmKeyEncryptor::new(ENCRYPTION_KEY),
            &config,
        ),
        chains: ChainBuilder::new(store.clone(), &config),
        signer: FakeSigner::new(),
        tenant_id: Uuid::new_v4(),
        store,
        db,
    }
}

pub fn subject(common_name: &str) -> DistinguishedName {
    DistinguishedName {
        organization: "Acme".into(),
        organizational_unit: "PKI".into(),
        country: "US".into(),
        common_name: common_name.into(),
        ..Default::default()
    }
}

impl Harness {
    pub fn root_input(&self, common_name: &str) -> CreateCertificateAuthority {
        CreateCertificateAuthority {
            tenant_id: self.tenant_id,
            parent_ca_id: None,
            ca_type: CaType::Root,
            subject: subject(common_name),
            max_path_length: None,
        }
    }

    pub fn intermediate_input(
        &self,
        parent: Uuid,
        common_name: &str,
        max_path_length: Option<u32>,
    ) -> CreateCertificateAuthority {
        CreateCertificateAuthority {
            tenant_id: self.tenant_id,
            parent_ca_id: Some(parent),
            ca_type: CaType::Intermediate,
            subject: subject(common_name),
            max_path_length,
        }
    }

    /// Sign material for `ca` the way a caller would: fetch the issuer key
    /// (if any), then ask the delegate.
    pub async fn sign_ca(&self, ca: &CertificateAuthority) -> IssuedCaMaterial {
        let (issuer, not_before, not_after) = match ca.parent_ca_id {
            Some(parent_id) => {
                let parent = self
                    .store
                    .authorities()
                    .get_by_id(self.tenant_id, parent_id)
                    .await
                    .unwrap();
                let key = self
                    .orchestrator
                    .issuer_key_pair(self.tenant_id, parent_id)
                    .await
                    .unwrap();
                // Nest strictly inside the issuer's window.
                (
                    Some(key),
                    parent.not_before.unwrap() + Duration::hours(1),
                    parent.not_after.unwrap() - Duration::hours(1),
                )
            }
            None => (
                None,
                Utc::now() - Duration::days(1),
                Utc::now() + Duration::days(3650),
            ),
        };

        let signed = self
            .signer
            .sign(
                SigningRequest {
                    subject_id: ca.id,
                    subject: ca.subject.clone(),
                    max_path_length: ca.max_path_length,
                    is_ca: true,
                    not_before,
                    not_after,
                },
                issuer,
            )
            .await
            .unwrap();

        IssuedCaMaterial {
            certificate_pem: signed.certificate_pem,
            certificate_chain_pem: signed.certificate_chain_pem,
            serial_number: signed.serial_number,
            not_before,
            not_after,
            public_key: signed.public_key,
            private_key: signed.private_key,
        }
    }

    /// Create and activate a CA in one step.
    pub async fn active_ca(&self, input: CreateCertificateAuthority) -> CertificateAuthority {
        let ca = self.orchestrator.create_ca(input).await.unwrap();
        let material = self.sign_ca(&ca).await;
        self.orchestrator
            .activate_ca(self.tenant_id, ca.id, material)
            .await
            .unwrap()
    }

    pub async fn issued_certificate(&self, certificate: &Certificate) -> IssuedCertificate {
        let issuer = self
            .orchestrator
            .issuer_key_pair(self.tenant_id, certificate.ca_id)
            .await
            .unwrap();
        let not_before = Utc::now();
        let not_after = not_before + Duration::days(90);
        let signed = self
            .signer
            .sign(
                SigningRequest {
                    subject_id: certificate.id,
                    subject: subject(&certificate.common_name),
                    max_path_length: None,
                    is_ca: false,
                    not_before,
                    not_after,
                },
                Some(issuer),
            )
            .await
            .unwrap();

        IssuedCertificate {
            certificate_pem: signed.certificate_pem,
            certificate_chain_pem: signed.certificate_chain_pem,
            serial_number: signed.serial_number,
            not_before,
            not_after,
        }
    }

    pub async fn active_certificate(&self, ca_id: Uuid, common_name: &str) -> Certificate {
        let certificate = self
            .orchestrator
            .create_certificate(CreateCertificate {
                tenant_id: self.tenant_id,
                ca_id,
                common_name: common_name.into(),
            })
            .await
            .unwrap();
        let issued = self.issued_certificate(&certificate).await;
        self.orchestrator
            .activate_certificate(self.tenant_id, certificate.id, issued)
            .await
            .unwrap()
    }
}
