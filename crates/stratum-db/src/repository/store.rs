use stratum_core::DEFAULT_MAX_HIERARCHY_DEPTH;
use stratum_core::error::StratumResult;
use stratum_core::repository::PkiStore;
use surrealdb::{Connection, Surreal};

use super::{
    SurrealCertificateAuthorityRepository, SurrealCertificateRepository, SurrealMaterialRepository,
};
use crate::transaction::SurrealTransaction;

/// One SurrealDB client viewed through the three PKI repositories.
#[derive(Clone)]
pub struct SurrealPkiStore<C: Connection> {
    db: Surreal<C>,
    authorities: SurrealCertificateAuthorityRepository<C>,
    materials: SurrealMaterialRepository<C>,
    certificates: SurrealCertificateRepository<C>,
}

impl<C: Connection> SurrealPkiStore<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_max_hierarchy_depth(db, DEFAULT_MAX_HIERARCHY_DEPTH)
    }

    /// A store whose hierarchy walks stop at `max_depth` levels. Pass the
    /// same ceiling the PKI components are configured with.
    pub fn with_max_hierarchy_depth(db: Surreal<C>, max_depth: usize) -> Self {
        Self {
            authorities: SurrealCertificateAuthorityRepository::with_max_depth(
                db.clone(),
                max_depth,
            ),
            materials: SurrealMaterialRepository::new(db.clone()),
            certificates: SurrealCertificateRepository::new(db.clone()),
            db,
        }
    }
}

impl<C: Connection> PkiStore for SurrealPkiStore<C> {
    type Tx = SurrealTransaction;
    type Authorities = SurrealCertificateAuthorityRepository<C>;
    type Materials = SurrealMaterialRepository<C>;
    type Certificates = SurrealCertificateRepository<C>;

    fn authorities(&self) -> &Self::Authorities {
        &self.authorities
    }

    fn materials(&self) -> &Self::Materials {
        &self.materials
    }

    fn certificates(&self) -> &Self::Certificates {
        &self.certificates
    }

    fn begin(&self) -> SurrealTransaction {
        SurrealTransaction::new()
    }

    async fn commit(&self, tx: SurrealTransaction) -> StratumResult<()> {
        tx.commit(&self.db).await.map_err(Into::into)
    }
}
