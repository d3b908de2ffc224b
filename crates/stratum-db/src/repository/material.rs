//! SurrealDB implementation of [`MaterialRepository`].
//!
//! CA material is append-only: every activation or rotation writes a new
//! `(ca_id, version)` pair into `ca_key_pair` and `ca_certificate_material`
//! and registers the serial in `serial_registry`. Readers take the highest
//! version. Key bytes are stored base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use stratum_core::error::StratumResult;
use stratum_core::models::certificate::{Certificate, IssuedCertificate};
use stratum_core::models::material::{
    CaCertificateMaterial, CertificateMaterial, EncryptedCaKeyPair, SealedCaMaterial,
};
use stratum_core::repository::MaterialRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, parse_uuid};
use crate::error::DbError;
use crate::transaction::SurrealTransaction;

#[derive(Debug, SurrealValue)]
struct CaCertificateRow {
    record_id: String,
    tenant_id: String,
    ca_id: String,
    version: u32,
    certificate_pem: String,
    certificate_chain_pem: String,
    created_at: DateTime<Utc>,
}

impl CaCertificateRow {
    fn try_into_material(self) -> Result<CaCertificateMaterial, DbError> {
        Ok(CaCertificateMaterial {
            id: parse_uuid(&self.record_id, "CA material")?,
            ca_id: parse_uuid(&self.ca_id, "CA")?,
            version: self.version,
            certificate_pem: self.certificate_pem,
            certificate_chain_pem: self.certificate_chain_pem,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct KeyPairRow {
    record_id: String,
    tenant_id: String,
    ca_id: String,
    version: u32,
    public_key: String,
    encrypted_private_key: String,
    created_at: DateTime<Utc>,
}

impl KeyPairRow {
    fn try_into_key_pair(self) -> Result<EncryptedCaKeyPair, DbError> {
        let public_key = STANDARD
            .decode(&self.public_key)
            .map_err(|e| DbError::InvalidRecord(format!("public key: {e}")))?;
        let encrypted_private_key = STANDARD
            .decode(&self.encrypted_private_key)
            .map_err(|e| DbError::InvalidRecord(format!("encrypted private key: {e}")))?;
        Ok(EncryptedCaKeyPair {
            id: parse_uuid(&self.record_id, "key pair")?,
            ca_id: parse_uuid(&self.ca_id, "CA")?,
            version: self.version,
            public_key,
            encrypted_private_key,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct CertificateMaterialRow {
    record_id: String,
    tenant_id: String,
    certificate_id: String,
    ca_id: String,
    certificate_pem: String,
    certificate_chain_pem: String,
    created_at: DateTime<Utc>,
}

impl CertificateMaterialRow {
    fn try_into_material(self) -> Result<CertificateMaterial, DbError> {
        Ok(CertificateMaterial {
            id: parse_uuid(&self.record_id, "certificate material")?,
            certificate_id: parse_uuid(&self.certificate_id, "certificate")?,
            ca_id: parse_uuid(&self.ca_id, "CA")?,
            certificate_pem: self.certificate_pem,
            certificate_chain_pem: self.certificate_chain_pem,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct VersionRow {
    version: u32,
}

/// SurrealDB implementation of the material store.
#[derive(Clone)]
pub struct SurrealMaterialRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMaterialRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn ca_certificates(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
        limit: Option<u64>,
    ) -> StratumResult<Vec<CaCertificateMaterial>> {
        let limit_clause = if limit.is_some() { " LIMIT $limit" } else { "" };
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM ca_certificate_material \
             WHERE tenant_id = $tenant_id AND ca_id = $ca_id \
             ORDER BY version DESC{limit_clause}"
        );

        let mut builder = self
            .db
            .query(query)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("ca_id", ca_id.to_string()));
        if let Some(limit) = limit {
            builder = builder.bind(("limit", limit));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let rows: Vec<CaCertificateRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(CaCertificateRow::try_into_material)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }
}

/// Stage the serial registration that makes a serial number unique across
/// every CA and certificate.
fn stage_serial(
    tx: &mut SurrealTransaction,
    tenant_id: Uuid,
    serial_number: &str,
    owner_kind: &str,
    owner_id: Uuid,
    ca_id: Uuid,
) {
    let serial = tx.param(serial_number);
    let kind = tx.param(owner_kind);
    let owner = tx.param(owner_id.to_string());
    let ca = tx.param(ca_id.to_string());
    let tenant = tx.param(tenant_id.to_string());
    tx.push(format!(
        "CREATE serial_registry SET serial_number = {serial}, \
         owner_kind = {kind}, owner_id = {owner}, ca_id = {ca}, \
         tenant_id = {tenant}"
    ));
}

impl<C: Connection> MaterialRepository for SurrealMaterialRepository<C> {
    type Tx = SurrealTransaction;

    async fn serial_in_use(&self, serial_number: &str) -> StratumResult<bool> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM serial_registry \
                 WHERE serial_number = $serial GROUP ALL",
            )
            .bind(("serial", serial_number.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }

    async fn latest_ca_version(&self, tenant_id: Uuid, ca_id: Uuid) -> StratumResult<u32> {
        let mut result = self
            .db
            .query(
                "SELECT version FROM ca_key_pair \
                 WHERE tenant_id = $tenant_id AND ca_id = $ca_id \
                 ORDER BY version DESC LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("ca_id", ca_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<VersionRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.version).unwrap_or(0))
    }

    async fn current_ca_certificate(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> StratumResult<Option<CaCertificateMaterial>> {
        Ok(self
            .ca_certificates(tenant_id, ca_id, Some(1))
            .await?
            .into_iter()
            .next())
    }

    async fn ca_certificate_history(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> StratumResult<Vec<CaCertificateMaterial>> {
        self.ca_certificates(tenant_id, ca_id, None).await
    }

    async fn current_ca_key_pair(
        &self,
        tenant_id: Uuid,
        ca_id: Uuid,
    ) -> StratumResult<Option<EncryptedCaKeyPair>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM ca_key_pair \
                 WHERE tenant_id = $tenant_id AND ca_id = $ca_id \
                 ORDER BY version DESC LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("ca_id", ca_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<KeyPairRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(KeyPairRow::try_into_key_pair)
            .transpose()
            .map_err(Into::into)
    }

    async fn certificate_material(
        &self,
        tenant_id: Uuid,
        certificate_id: Uuid,
    ) -> StratumResult<Option<CertificateMaterial>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM certificate_material \
                 WHERE tenant_id = $tenant_id AND certificate_id = $certificate_id \
                 LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("certificate_id", certificate_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateMaterialRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(CertificateMaterialRow::try_into_material)
            .transpose()
            .map_err(Into::into)
    }

    fn stage_ca_material(
        &self,
        tx: &mut SurrealTransaction,
        tenant_id: Uuid,
        ca_id: Uuid,
        version: u32,
        material: &SealedCaMaterial,
    ) {
        let key_id = tx.param(Uuid::new_v4().to_string());
        let tenant = tx.param(tenant_id.to_string());
        let ca = tx.param(ca_id.to_string());
        let version_param = tx.param(version);
        let public_key = tx.param(STANDARD.encode(&material.public_key));
        let private_key = tx.param(STANDARD.encode(&material.encrypted_private_key));
        tx.push(format!(
            "CREATE type::record('ca_key_pair', {key_id}) SET \
             tenant_id = {tenant}, ca_id = {ca}, version = {version_param}, \
             public_key = {public_key}, encrypted_private_key = {private_key}"
        ));

        let material_id = tx.param(Uuid::new_v4().to_string());
        let certificate_pem = tx.param(material.certificate_pem.clone());
        let chain_pem = tx.param(material.certificate_chain_pem.clone());
        tx.push(format!(
            "CREATE type::record('ca_certificate_material', {material_id}) SET \
             tenant_id = {tenant}, ca_id = {ca}, version = {version_param}, \
             certificate_pem = {certificate_pem}, \
             certificate_chain_pem = {chain_pem}"
        ));

        stage_serial(
            tx,
            tenant_id,
            &material.serial_number,
            "CertificateAuthority",
            ca_id,
            ca_id,
        );
    }

    fn stage_certificate_material(
        &self,
        tx: &mut SurrealTransaction,
        tenant_id: Uuid,
        certificate: &Certificate,
        issued: &IssuedCertificate,
    ) {
        let id = tx.param(Uuid::new_v4().to_string());
        let tenant = tx.param(tenant_id.to_string());
        let cert = tx.param(certificate.id.to_string());
        let ca = tx.param(certificate.ca_id.to_string());
        let certificate_pem = tx.param(issued.certificate_pem.clone());
        let chain_pem = tx.param(issued.certificate_chain_pem.clone());
        tx.push(format!(
            "CREATE type::record('certificate_material', {id}) SET \
             tenant_id = {tenant}, certificate_id = {cert}, ca_id = {ca}, \
             certificate_pem = {certificate_pem}, \
             certificate_chain_pem = {chain_pem}"
        ));

        stage_serial(
            tx,
            tenant_id,
            &issued.serial_number,
            "Certificate",
            certificate.id,
            certificate.ca_id,
        );
    }
}
