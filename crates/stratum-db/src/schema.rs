//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. Key bytes are stored base64-encoded.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "ca_hierarchy",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Certificate Authorities (tenant scope, self-referential hierarchy)
-- =======================================================================
DEFINE TABLE certificate_authority SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE certificate_authority TYPE string;
DEFINE FIELD parent_ca_id ON TABLE certificate_authority \
    TYPE option<string>;
DEFINE FIELD ca_type ON TABLE certificate_authority TYPE string \
    ASSERT $value IN ['Root', 'Intermediate'];
DEFINE FIELD status ON TABLE certificate_authority TYPE string \
    ASSERT $value IN ['PendingCertificate', 'Active'];
DEFINE FIELD organization ON TABLE certificate_authority TYPE string;
DEFINE FIELD organizational_unit ON TABLE certificate_authority \
    TYPE string;
DEFINE FIELD country ON TABLE certificate_authority TYPE string;
DEFINE FIELD province ON TABLE certificate_authority TYPE string;
DEFINE FIELD locality ON TABLE certificate_authority TYPE string;
DEFINE FIELD common_name ON TABLE certificate_authority TYPE string;
DEFINE FIELD dn ON TABLE certificate_authority TYPE string;
DEFINE FIELD max_path_length ON TABLE certificate_authority \
    TYPE option<int>;
DEFINE FIELD serial_number ON TABLE certificate_authority \
    TYPE option<string>;
DEFINE FIELD not_before ON TABLE certificate_authority \
    TYPE option<datetime>;
DEFINE FIELD not_after ON TABLE certificate_authority \
    TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE certificate_authority TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE certificate_authority TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_ca_tenant_dn ON TABLE certificate_authority \
    COLUMNS tenant_id, dn UNIQUE;
DEFINE INDEX idx_ca_tenant_parent ON TABLE certificate_authority \
    COLUMNS tenant_id, parent_ca_id;

-- =======================================================================
-- CA certificate material (append-only, versioned per CA)
-- =======================================================================
DEFINE TABLE ca_certificate_material SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE ca_certificate_material TYPE string;
DEFINE FIELD ca_id ON TABLE ca_certificate_material TYPE string;
DEFINE FIELD version ON TABLE ca_certificate_material TYPE int \
    ASSERT $value >= 1;
DEFINE FIELD certificate_pem ON TABLE ca_certificate_material \
    TYPE string;
DEFINE FIELD certificate_chain_pem ON TABLE ca_certificate_material \
    TYPE string;
DEFINE FIELD created_at ON TABLE ca_certificate_material TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_ca_cert_material_version ON TABLE \
    ca_certificate_material COLUMNS ca_id, version UNIQUE;

-- =======================================================================
-- CA key pairs (append-only, private key stored as ciphertext)
-- =======================================================================
DEFINE TABLE ca_key_pair SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE ca_key_pair TYPE string;
DEFINE FIELD ca_id ON TABLE ca_key_pair TYPE string;
DEFINE FIELD version ON TABLE ca_key_pair TYPE int ASSERT $value >= 1;
DEFINE FIELD public_key ON TABLE ca_key_pair TYPE string;
DEFINE FIELD encrypted_private_key ON TABLE ca_key_pair TYPE string;
DEFINE FIELD created_at ON TABLE ca_key_pair TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_ca_key_pair_version ON TABLE ca_key_pair \
    COLUMNS ca_id, version UNIQUE;

-- =======================================================================
-- End-entity certificates (tenant scope)
-- =======================================================================
DEFINE TABLE certificate SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE certificate TYPE string;
DEFINE FIELD ca_id ON TABLE certificate TYPE string;
DEFINE FIELD status ON TABLE certificate TYPE string \
    ASSERT $value IN ['PendingCertificate', 'Active'];
DEFINE FIELD common_name ON TABLE certificate TYPE string;
DEFINE FIELD serial_number ON TABLE certificate TYPE option<string>;
DEFINE FIELD not_before ON TABLE certificate TYPE option<datetime>;
DEFINE FIELD not_after ON TABLE certificate TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE certificate TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE certificate TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_cert_tenant_ca ON TABLE certificate \
    COLUMNS tenant_id, ca_id;

-- =======================================================================
-- End-entity certificate material (one per certificate)
-- =======================================================================
DEFINE TABLE certificate_material SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE certificate_material TYPE string;
DEFINE FIELD certificate_id ON TABLE certificate_material TYPE string;
DEFINE FIELD ca_id ON TABLE certificate_material TYPE string;
DEFINE FIELD certificate_pem ON TABLE certificate_material TYPE string;
DEFINE FIELD certificate_chain_pem ON TABLE certificate_material \
    TYPE string;
DEFINE FIELD created_at ON TABLE certificate_material TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_cert_material_certificate ON TABLE \
    certificate_material COLUMNS certificate_id UNIQUE;

-- =======================================================================
-- Serial registry (single namespace for CA and certificate serials)
-- =======================================================================
DEFINE TABLE serial_registry SCHEMAFULL;
DEFINE FIELD serial_number ON TABLE serial_registry TYPE string;
DEFINE FIELD owner_kind ON TABLE serial_registry TYPE string \
    ASSERT $value IN ['CertificateAuthority', 'Certificate'];
DEFINE FIELD owner_id ON TABLE serial_registry TYPE string;
DEFINE FIELD ca_id ON TABLE serial_registry TYPE string;
DEFINE FIELD tenant_id ON TABLE serial_registry TYPE string;
DEFINE FIELD created_at ON TABLE serial_registry TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_serial_registry_serial ON TABLE serial_registry \
    COLUMNS serial_number UNIQUE;
DEFINE INDEX idx_serial_registry_ca ON TABLE serial_registry \
    COLUMNS ca_id;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );

        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

        info!(version = migration.version, "Migration applied");
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }

    #[test]
    fn schema_declares_every_table() {
        for table in [
            "certificate_authority",
            "ca_certificate_material",
            "ca_key_pair",
            "certificate",
            "certificate_material",
            "serial_registry",
        ] {
            assert!(
                SCHEMA_V1.contains(&format!("DEFINE TABLE {table} SCHEMAFULL")),
                "missing table {table}"
            );
        }
    }
}
