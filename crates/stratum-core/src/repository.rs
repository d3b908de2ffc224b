//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async and tenant-scoped: every lookup
//! takes a `tenant_id` and an id that does not resolve inside that tenant
//! is reported as `NotFound`.
//!
//! Multi-step writes are expressed through an explicit transaction scope.
//! Repositories *stage* statements into a `Tx` value owned by the caller,
//! and nothing reaches the store until [`PkiStore::commit`] sends the whole
//! scope as one atomic unit. Dropping a `Tx` without committing discards it.

use uuid::Uuid;

use crate::error::StratumResult;
use crate::models::{
    certificate::{
        Certificate, CertificateFilter, CreateCertificate, IssuedCertificate, UpdateCertificate,
    },
    certificate_authority::{
        CaFilter, CertificateAuthority, CreateCertificateAuthority, UpdateCertificateAuthority,
    },
    material::{CaCertificateMaterial, CertificateMaterial, EncryptedCaKeyPair, SealedCaMaterial},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Generic capability
// ---------------------------------------------------------------------------

/// CRUD capability shared by tenant-scoped entity stores.
pub trait Repository: Send + Sync {
    type Entity: Send;
    type Create: Send;
    type Update: Send;
    type Filter: Send;

    fn create(
        &self,
        input: Self::Create,
    ) -> impl Future<Output = StratumResult<Self::Entity>> + Send;
    fn get_by_id(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = StratumResult<Self::Entity>> + Send;
    fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: Self::Update,
    ) -> impl Future<Output = StratumResult<Self::Entity>> + Send;
    fn delete(&self, tenant_id: Uuid, id: Uuid) -> impl Future<Output = StratumResult<()>> + Send;
    fn list(
        &self,
        tenant_id: Uuid,
        filter: Self::Filter,
        pagination: Pagination,
    ) -> impl Future<Output = StratumResult<PaginatedResult<Self::Entity>>> + Send;
}

// ---------------------------------------------------------------------------
// CA Registry
// ---------------------------------------------------------------------------

pub trait CertificateAuthorityRepository:
    Repository<
        Entity = CertificateAuthority,
        Create = CreateCertificateAuthority,
        Update = UpdateCertificateAuthority,
        Filter = CaFilter,
    >
{
    type Tx: Send;

    /// Look up a CA by its rendered distinguished name.
    fn get_by_dn(
        &self,
        tenant_id: Uuid,
        dn: &str,
    ) -> impl Future<Output = StratumResult<Option<CertificateAuthority>>> + Send;

    /// Direct children of a CA.
    fn list_children(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
    ) -> impl Future<Output = StratumResult<Vec<CertificateAuthority>>> + Send;

    /// Number of intermediate CAs whose parent is `parent_id`.
    fn count_intermediate_children(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
    ) -> impl Future<Output = StratumResult<u64>> + Send;

    /// Stage the insert of a fully-formed (pending) CA record.
    fn stage_insert(&self, tx: &mut Self::Tx, ca: &CertificateAuthority);

    /// Stage a write to a CA row without changing its data. Concurrent
    /// transactions that also touch the row conflict at commit.
    fn stage_lock(&self, tx: &mut Self::Tx, tenant_id: Uuid, id: Uuid);

    /// Stage a guard that aborts the transaction with a retryable storage
    /// error when `parent_id` already has `max_path_length` intermediate
    /// children at commit time.
    fn stage_child_budget(
        &self,
        tx: &mut Self::Tx,
        tenant_id: Uuid,
        parent_id: Uuid,
        max_path_length: u32,
    );

    fn stage_update(
        &self,
        tx: &mut Self::Tx,
        tenant_id: Uuid,
        id: Uuid,
        input: &UpdateCertificateAuthority,
    );
}

// ---------------------------------------------------------------------------
// Material Store
// ---------------------------------------------------------------------------

pub trait MaterialRepository: Send + Sync {
    type Tx: Send;

    /// Whether a serial number is registered to any CA or certificate.
    fn serial_in_use(
        &self,
        serial_number: &str,
    ) -> impl Future<Output = StratumResult<bool>> + Send;

    /// Highest material version stored for a CA (0 when none).
    fn latest_ca_version(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> impl Future<Output = StratumResult<u32>> + Send;

    /// Current (highest-version) certificate material of a CA.
    fn current_ca_certificate(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> impl Future<Output = StratumResult<Option<CaCertificateMaterial>>> + Send;

    /// All certificate material versions of a CA, newest first.
    fn ca_certificate_history(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> impl Future<Output = StratumResult<Vec<CaCertificateMaterial>>> + Send;

    /// Current key pair of a CA, private key still encrypted.
    fn current_ca_key_pair(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> impl Future<Output = StratumResult<Option<EncryptedCaKeyPair>>> + Send;

    fn certificate_material(
        &self,
        tenant_id: Uuid,
        certificate_id: Uuid,
    ) -> impl Future<Output = StratumResult<Option<CertificateMaterial>>> + Send;

    /// Stage key pair, certificate material and serial registration for
    /// one CA material version.
    fn stage_ca_material(
        &self,
        tx: &mut Self::Tx,
        tenant_id: Uuid,
        ca_id: Uuid,
        version: u32,
        material: &SealedCaMaterial,
    );

    /// Stage certificate material and serial registration for an
    /// end-entity certificate.
    fn stage_certificate_material(
        &self,
        tx: &mut Self::Tx,
        tenant_id: Uuid,
        certificate: &Certificate,
        issued: &IssuedCertificate,
    );
}

// ---------------------------------------------------------------------------
// End-entity certificates
// ---------------------------------------------------------------------------

pub trait CertificateRepository:
    Repository<
        Entity = Certificate,
        Create = CreateCertificate,
        Update = UpdateCertificate,
        Filter = CertificateFilter,
    >
{
    type Tx: Send;

    fn stage_update(
        &self,
        tx: &mut Self::Tx,
        tenant_id: Uuid,
        id: Uuid,
        input: &UpdateCertificate,
    );
}

// ---------------------------------------------------------------------------
// Store handle
// ---------------------------------------------------------------------------

/// Explicit handle over one transactional store, passed into every
/// component constructor.
pub trait PkiStore: Send + Sync {
    type Tx: Send;
    type Authorities: CertificateAuthorityRepository<Tx = Self::Tx>;
    type Materials: MaterialRepository<Tx = Self::Tx>;
    type Certificates: CertificateRepository<Tx = Self::Tx>;

    fn authorities(&self) -> &Self::Authorities;
    fn materials(&self) -> &Self::Materials;
    fn certificates(&self) -> &Self::Certificates;

    /// Open an empty transaction scope.
    fn begin(&self) -> Self::Tx;

    /// Apply every staged statement atomically, or none of them.
    fn commit(&self, tx: Self::Tx) -> impl Future<Output = StratumResult<()>> + Send;
}
