//! SurrealDB implementation of [`CertificateAuthorityRepository`].
//!
//! Deleting a CA removes its whole subtree in one transaction: descendant
//! CAs, every material row and serial registration they own, and every
//! end-entity certificate issued beneath them.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};
use stratum_core::DEFAULT_MAX_HIERARCHY_DEPTH;
use stratum_core::error::{StratumError, StratumResult};
use stratum_core::models::certificate_authority::{
    CaFilter, CaType, CertificateAuthority, CreateCertificateAuthority, DistinguishedName,
    IssuanceStatus, UpdateCertificateAuthority,
};
use stratum_core::repository::{
    CertificateAuthorityRepository, PaginatedResult, Pagination, Repository,
};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{info, warn};
use uuid::Uuid;

use super::{CountRow, parse_uuid};
use crate::error::{CHILD_BUDGET_EXHAUSTED, DbError};
use crate::transaction::SurrealTransaction;

const TABLE: &str = "certificate_authority";

/// DB-side row struct; always selected with `meta::id(id) AS record_id`.
#[derive(Debug, SurrealValue)]
struct CaRow {
    record_id: String,
    tenant_id: String,
    parent_ca_id: Option<String>,
    ca_type: String,
    status: String,
    organization: String,
    organizational_unit: String,
    country: String,
    province: String,
    locality: String,
    common_name: String,
    dn: String,
    max_path_length: Option<u32>,
    serial_number: Option<String>,
    not_before: Option<DateTime<Utc>>,
    not_after: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl CaRow {
    fn try_into_ca(self) -> Result<CertificateAuthority, DbError> {
        let ca_type = CaType::parse(&self.ca_type)
            .ok_or_else(|| DbError::InvalidRecord(format!("unknown CA type: {}", self.ca_type)))?;
        let status = IssuanceStatus::parse(&self.status)
            .ok_or_else(|| DbError::InvalidRecord(format!("unknown CA status: {}", self.status)))?;
        Ok(CertificateAuthority {
            id: parse_uuid(&self.record_id, "CA")?,
            tenant_id: parse_uuid(&self.tenant_id, "tenant")?,
            parent_ca_id: self
                .parent_ca_id
                .as_deref()
                .map(|p| parse_uuid(p, "parent CA"))
                .transpose()?,
            ca_type,
            status,
            subject: DistinguishedName {
                organization: self.organization,
                organizational_unit: self.organizational_unit,
                country: self.country,
                province: self.province,
                locality: self.locality,
                common_name: self.common_name,
            },
            dn: self.dn,
            max_path_length: self.max_path_length,
            serial_number: self.serial_number,
            not_before: self.not_before,
            not_after: self.not_after,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// SurrealDB implementation of the CA registry.
#[derive(Clone)]
pub struct SurrealCertificateAuthorityRepository<C: Connection> {
    db: Surreal<C>,
    max_depth: usize,
}

impl<C: Connection> SurrealCertificateAuthorityRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self::with_max_depth(db, DEFAULT_MAX_HIERARCHY_DEPTH)
    }

    /// A registry whose subtree walks stop at `max_depth` levels.
    pub fn with_max_depth(db: Surreal<C>, max_depth: usize) -> Self {
        Self { db, max_depth }
    }

    /// Collect `root_id` and every CA below it, breadth first.
    async fn collect_subtree(&self, tenant_id: Uuid, root_id: Uuid) -> StratumResult<Vec<Uuid>> {
        let mut ordered = vec![root_id];
        let mut seen = HashSet::from([root_id]);
        let mut queue = VecDeque::from([(root_id, 0usize)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                warn!(
                    %tenant_id,
                    ca_id = %current,
                    max_depth = self.max_depth,
                    "Subtree exceeds depth ceiling"
                );
                return Err(StratumError::CorruptHierarchy {
                    id: current,
                    reason: format!("subtree deeper than {}", self.max_depth),
                });
            }
            for child in self.list_children(tenant_id, current).await? {
                if !seen.insert(child.id) {
                    warn!(%tenant_id, ca_id = %child.id, "CA reached twice during subtree walk");
                    return Err(StratumError::CorruptHierarchy {
                        id: child.id,
                        reason: "CA reachable through more than one path".into(),
                    });
                }
                ordered.push(child.id);
                queue.push_back((child.id, depth + 1));
            }
        }

        Ok(ordered)
    }
}

/// Stage removal of one CA together with everything it owns.
fn stage_cascade(tx: &mut SurrealTransaction, tenant_id: &str, ca_id: Uuid) {
    let ca = tx.param(ca_id.to_string());
    let tenant = tx.param(tenant_id);
    tx.push(format!("DELETE certificate_material WHERE ca_id = {ca}"));
    tx.push(format!("DELETE certificate WHERE ca_id = {ca}"));
    tx.push(format!("DELETE ca_certificate_material WHERE ca_id = {ca}"));
    tx.push(format!("DELETE ca_key_pair WHERE ca_id = {ca}"));
    tx.push(format!("DELETE serial_registry WHERE ca_id = {ca}"));
    tx.push(format!(
        "DELETE type::record('{TABLE}', {ca}) WHERE tenant_id = {tenant}"
    ));
}

impl<C: Connection> Repository for SurrealCertificateAuthorityRepository<C> {
    type Entity = CertificateAuthority;
    type Create = CreateCertificateAuthority;
    type Update = UpdateCertificateAuthority;
    type Filter = CaFilter;

    async fn create(&self, input: CreateCertificateAuthority) -> StratumResult<CertificateAuthority> {
        let ca = CertificateAuthority::new_pending(input);

        let mut tx = SurrealTransaction::new();
        self.stage_insert(&mut tx, &ca);
        tx.commit(&self.db).await?;

        self.get_by_id(ca.tenant_id, ca.id).await
    }

    async fn get_by_id(&self, tenant_id: Uuid, id: Uuid) -> StratumResult<CertificateAuthority> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('certificate_authority', $id) \
                 WHERE tenant_id = $tenant_id",
            )
            .bind(("id", id_str.clone()))
            .bind(("tenant_id", tenant_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CaRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: TABLE.into(),
            id: id_str,
        })?;

        Ok(row.try_into_ca()?)
    }

    async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        input: UpdateCertificateAuthority,
    ) -> StratumResult<CertificateAuthority> {
        // UPDATE on a missing record is a silent no-op.
        self.get_by_id(tenant_id, id).await?;

        let mut tx = SurrealTransaction::new();
        self.stage_update(&mut tx, tenant_id, id, &input);
        tx.commit(&self.db).await?;

        self.get_by_id(tenant_id, id).await
    }

    async fn delete(&self, tenant_id: Uuid, id: Uuid) -> StratumResult<()> {
        self.get_by_id(tenant_id, id).await?;

        let subtree = self.collect_subtree(tenant_id, id).await?;
        let tenant_str = tenant_id.to_string();

        let mut tx = SurrealTransaction::new();
        // Leaves first.
        for ca_id in subtree.iter().rev() {
            stage_cascade(&mut tx, &tenant_str, *ca_id);
        }
        tx.commit(&self.db).await?;

        info!(%tenant_id, ca_id = %id, removed = subtree.len(), "Deleted CA subtree");
        Ok(())
    }

    async fn list(
        &self,
        tenant_id: Uuid,
        filter: CaFilter,
        pagination: Pagination,
    ) -> StratumResult<PaginatedResult<CertificateAuthority>> {
        let mut conditions = vec!["tenant_id = $tenant_id"];
        if filter.parent_ca_id.is_some() {
            conditions.push("parent_ca_id = $parent_ca_id");
        }
        if filter.ca_type.is_some() {
            conditions.push("ca_type = $ca_type");
        }
        if filter.status.is_some() {
            conditions.push("status = $status");
        }
        let where_clause = conditions.join(" AND ");

        let query = format!(
            "SELECT count() AS total FROM certificate_authority \
             WHERE {where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM certificate_authority \
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
        if let Some(parent) = filter.parent_ca_id {
            builder = builder.bind(("parent_ca_id", parent.to_string()));
        }
        if let Some(ca_type) = filter.ca_type {
            builder = builder.bind(("ca_type", ca_type.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            builder = builder.bind(("status", status.as_str().to_string()));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);
        let rows: Vec<CaRow> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(CaRow::try_into_ca)
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

impl<C: Connection> CertificateAuthorityRepository for SurrealCertificateAuthorityRepository<C> {
    type Tx = SurrealTransaction;

    async fn get_by_dn(
        &self,
        tenant_id: Uuid,
        dn: &str,
    ) -> StratumResult<Option<CertificateAuthority>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM certificate_authority \
                 WHERE tenant_id = $tenant_id AND dn = $dn LIMIT 1",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("dn", dn.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CaRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(CaRow::try_into_ca)
            .transpose()
            .map_err(Into::into)
    }

    async fn list_children(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
    ) -> StratumResult<Vec<CertificateAuthority>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM certificate_authority \
                 WHERE tenant_id = $tenant_id AND parent_ca_id = $parent_id \
                 ORDER BY created_at ASC",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("parent_id", parent_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CaRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(CaRow::try_into_ca)
            .collect::<Result<Vec<_>, DbError>>()
            .map_err(Into::into)
    }

    async fn count_intermediate_children(
        &self,
        tenant_id: Uuid,
        parent_id: Uuid,
    ) -> StratumResult<u64> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM certificate_authority \
                 WHERE tenant_id = $tenant_id AND parent_ca_id = $parent_id \
                 AND ca_type = 'Intermediate' GROUP ALL",
            )
            .bind(("tenant_id", tenant_id.to_string()))
            .bind(("parent_id", parent_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0))
    }

    fn stage_insert(&self, tx: &mut SurrealTransaction, ca: &CertificateAuthority) {
        let id = tx.param(ca.id.to_string());
        let tenant = tx.param(ca.tenant_id.to_string());
        let parent = tx.param(ca.parent_ca_id.map(|p| p.to_string()));
        let ca_type = tx.param(ca.ca_type.as_str());
        let status = tx.param(ca.status.as_str());
        let organization = tx.param(ca.subject.organization.clone());
        let unit = tx.param(ca.subject.organizational_unit.clone());
        let country = tx.param(ca.subject.country.clone());
        let province = tx.param(ca.subject.province.clone());
        let locality = tx.param(ca.subject.locality.clone());
        let common_name = tx.param(ca.subject.common_name.clone());
        let dn = tx.param(ca.dn.clone());
        let max_path_length = tx.param(ca.max_path_length);
        let serial = tx.param(ca.serial_number.clone());
        let not_before = tx.param(ca.not_before);
        let not_after = tx.param(ca.not_after);

        tx.push(format!(
            "CREATE type::record('{TABLE}', {id}) SET \
             tenant_id = {tenant}, parent_ca_id = {parent}, \
             ca_type = {ca_type}, status = {status}, \
             organization = {organization}, organizational_unit = {unit}, \
             country = {country}, province = {province}, \
             locality = {locality}, common_name = {common_name}, \
             dn = {dn}, max_path_length = {max_path_length}, \
             serial_number = {serial}, \
             not_before = {not_before}, not_after = {not_after}"
        ));
    }

    fn stage_lock(&self, tx: &mut SurrealTransaction, tenant_id: Uuid, id: Uuid) {
        let id = tx.param(id.to_string());
        let tenant = tx.param(tenant_id.to_string());
        tx.push(format!(
            "UPDATE type::record('{TABLE}', {id}) SET updated_at = time::now() \
             WHERE tenant_id = {tenant}"
        ));
    }

    fn stage_child_budget(
        &self,
        tx: &mut SurrealTransaction,
        tenant_id: Uuid,
        parent_id: Uuid,
        max_path_length: u32,
    ) {
        let tenant = tx.param(tenant_id.to_string());
        let parent = tx.param(parent_id.to_string());
        let limit = tx.param(max_path_length);
        tx.push(format!(
            "LET $intermediate_children = (SELECT count() AS total FROM {TABLE} \
             WHERE tenant_id = {tenant} AND parent_ca_id = {parent} \
             AND ca_type = 'Intermediate' GROUP ALL)[0].total ?? 0"
        ));
        tx.push(format!(
            "IF $intermediate_children >= {limit} {{ THROW '{CHILD_BUDGET_EXHAUSTED}' }}"
        ));
    }

    fn stage_update(
        &self,
        tx: &mut SurrealTransaction,
        tenant_id: Uuid,
        id: Uuid,
        input: &UpdateCertificateAuthority,
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
            "UPDATE type::record('{TABLE}', {id}) SET {} WHERE tenant_id = {tenant}",
            sets.join(", ")
        ));
    }
}
