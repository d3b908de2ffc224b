//! SurrealDB implementation of [`CertificateRepository`].

use chrono::{DateTime, Utc};
use stratum_core::error::StratumResult;
use stratum_core::models::certificate::{
    Certificate, CertificateFilter, CreateCertificate, UpdateCertificate,
};
use stratum_core::models::certificate_authority::IssuanceStatus;
use stratum_core::repository::{CertificateRepository, PaginatedResult, Pagination, Repository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;
use uuid::Uuid;

use super::{CountRow, parse_uuid};
use crate::error::DbError;
use crate::transaction::SurrealTransaction;

#[derive(Debug, SurrealValue)]
struct CertificateRow {
    record_id: String,
    tenant_id: String,
    ca_id: String,
    status: String,
    common_name: String,
    serial_number: Option<String>,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CertificateRow {
    fn try_into_certificate(self) -> Result<Certificate, DbError> {
        let status = IssuanceStatus::parse(&self.status).ok_or_else(|| {
            DbError::InvalidRecord(format!("unknown certificate status: {}", self.status))
        })?;
        Ok(Certificate {
            id: parse_uuid(&self.record_id, "certificate")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            ca_id: parse_uuid(&self.ca_id, "CA")?,
            status,
            common_name: self.common_name,
            serial_number: self.serial_number,
            not_before: self.not_before,
            not_after: self.not_after,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct SurrealCertificateRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCertificateRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> Repository for SurrealCertificateRepository<C> {
    type Entity = Certificate;
    type Create = CreateCertificate;
    type Update = UpdateCertificate;
    type Filter = CertificateFilter;

    async fn create(&self, input: CreateCertificate) -> StratumResult<Certificate> {
        let id = Uuid::new_v4();

        self.db
            .query(
                "CREATE type::record('certificate', $id) SET \
                 tenant_id = $tenant_id, ca_id = $ca_id, \
                 status = 'PendingCertificate', common_name = $common_name",
            )
            .bind(("id", id.to_string()))
            .bind(("tenant_id", input.tenant_id.to_string()))
            .bind(("ca_id", input.ca_id.to_string()))
            .bind(("common_name", input.common_name))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        self.get_by_id(input.tenant_id, id).await
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> StratumResult<Certificate> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('certificate', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CertificateRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "certificate".into(),
            id: id_str,
        })?;

        Ok(row.try_into_certificate()?)
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateCertificate,
    ) -> StratumResult<Certificate> {
        self.get_by_id(tenant_id, id).await?;

        let mut tx = SurrealTransaction::new();
        self.stage_update(&mut tx, tenant_id, id, &input);
        tx.commit(&self.db).await?;

        self.get_by_id(tenant_id, id).await
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> StratumResult<()> {
        self.get_by_id(tenant_id, id).await?;

        let mut tx = SurrealTransaction::new();
        let cert = tx.param(id.to_string());
        let tenant = tx.param(tenant_id.to_string());
        tx.push(format!(
            "DELETE certificate_material WHERE certificate_id = {cert}"
        ));
        tx.push(format!(
            "DELETE serial_registry WHERE owner_kind = 'Certificate' AND owner_id = {cert}"
        ));
        tx.push(format!(
            "DELETE type::record('certificate', {cert}) WHERE tenant_id = {tenant}"
        ));
        tx.commit(&self.db).await?;

        info!(%tenant_id, certificate_id = %id, "Deleted certificate");
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: CertificateFilter,
        pagination: Pagination,
    ) -> StratumResult<PaginatedResult<Certificate>> {
        let mut conditions = vec!["tenant_id = $tenant_id"];
        if filter.ca_id.is_some() {
            conditions.push("ca_id = $ca_id");
        }
        if filter.status.is_some() {
            conditions.push("status = $status");
        }
        let where_clause = conditions.join(" AND ");

        let query = format!(
            "SELECT count() AS total FROM certificate \
             WHERE {where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM certificate \
             WHERE {where_clause} \
             ORDER BY created_at ASC \
             LIMIT $limit START $offset;"
        );

        let mut builder = self
            .db
            .query(query)
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(ca_id) = filter.ca_id {
            builder = builder.bind(("ca_id", ca_id.to_string()));
        }
        if let Some(status) = filter.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<CertificateRow> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(CertificateRow::try_into_certificate)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

impl<C: Connection> CertificateRepository for SurrealCertificateRepository<C> {
    type Tx = SurrealTransaction;

    fn stage_update(
        &self,
        tx: &mut SurrealTransaction,
        tenant_id: Uuid,
        id: Uuid,
        input: &UpdateCertificate,
    ) {
        let mut sets = Vec::new();
        if let Some(status) = input.status {
            sets.push(format!("status = {}", tx.param(status.as_str())));
        }
        if let Some(serial) = &input.serial_number {
            sets.push(format!("serial_number = {}", tx.param(serial.clone())));
        }
        if let Some(not_before) = input.not_before {
            sets.push(format!("not_before = {}", tx.param(not_before)));
        }
        if let Some(not_after) = input.not_after {
            sets.push(format!("not_after = {}", tx.param(not_after)));
        }
        sets.push("updated_at = time::now()".to_string());

        let id = tx.param(id.to_string());
        let tenant = tx.param(tenant_id.to_string());
        tx.push(format!(
            "UPDATE type::record('certificate', {id}) SET {} WHERE tenant_id = {tenant}",
            sets.join(", ")
        ));
    }
}
