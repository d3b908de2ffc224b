//! Integration tests for the CA registry using in-memory SurrealDB.

use chrono::{Duration, Utc};
use stratum_core::error::StratumError;
use stratum_core::models::certificate_authority::{
    CaFilter, CaType, CreateCertificateAuthority, DistinguishedName, IssuanceStatus,
    UpdateCertificateAuthority,
};
use stratum_core::models::material::SealedCaMaterial;
use stratum_core::repository::{
    CertificateAuthorityRepository, MaterialRepository, Pagination, PkiStore, Repository,
};
use stratum_db::repository::SurrealPkiStore;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

async fn setup() -> SurrealPkiStore<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    stratum_db::run_migrations(&db).await.unwrap();
    SurrealPkiStore::new(db)
}

fn subject(cn: &str) -> DistinguishedName {
    DistinguishedName {
        organization: "Acme".into(),
        country: "US".into(),
        common_name: cn.into(),
        ..Default::default()
    }
}

fn root(tenant_id: Uuid, cn: &str) -> CreateCertificateAuthority {
    CreateCertificateAuthority {
        tenant_id,
        parent_ca_id: None,
        ca_type: CaType::Root,
        subject: subject(cn),
        max_path_length: None,
    }
}

fn intermediate(tenant_id: Uuid, parent: Uuid, cn: &str) -> CreateCertificateAuthority {
    CreateCertificateAuthority {
        tenant_id,
        parent_ca_id: Some(parent),
        ca_type: CaType::Intermediate,
        subject: subject(cn),
        max_path_length: None,
    }
}

fn sealed(serial: &str) -> SealedCaMaterial {
    let now = Utc::now();
    SealedCaMaterial {
        certificate_pem: format!("-----BEGIN CERTIFICATE-----\n{serial}"),
        certificate_chain_pem: String::new(),
        serial_number: serial.into(),
        not_before: now,
        not_after: now + Duration::days(365),
        public_key: vec![1, 2, 3],
        encrypted_private_key: vec![9, 9, 9],
    }
}

#[tokio::test]
async fn create_and_get_ca() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();

    let ca = store
        .authorities()
        .create(root(tenant_id, "Acme Root"))
        .await
        .unwrap();

    assert_eq!(ca.status, IssuanceStatus::PendingCertificate);
    assert_eq!(ca.dn, "C=US,O=Acme,CN=Acme Root");
    assert!(ca.serial_number.is_none());

    let fetched = store.authorities().get_by_id(tenant_id, ca.id).await.unwrap();
    assert_eq!(fetched.id, ca.id);
    assert_eq!(fetched.subject, ca.subject);
    assert_eq!(fetched.ca_type, CaType::Root);
}

#[tokio::test]
async fn lookup_is_tenant_scoped() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let ca = store
        .authorities()
        .create(root(tenant_id, "Acme Root"))
        .await
        .unwrap();

    let err = store
        .authorities()
        .get_by_id(Uuid::new_v4(), ca.id)
        .await
        .unwrap_err();
    assert!(matches!(err, StratumError::NotFound { .. }));
}

#[tokio::test]
async fn duplicate_dn_in_tenant_conflicts() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    store
        .authorities()
        .create(root(tenant_id, "Acme Root"))
        .await
        .unwrap();

    let err = store
        .authorities()
        .create(root(tenant_id, "Acme Root"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, StratumError::Conflict { ref entity, .. } if entity == "certificate_authority"),
        "got {err:?}"
    );

    // Same DN in another tenant is fine.
    store
        .authorities()
        .create(root(Uuid::new_v4(), "Acme Root"))
        .await
        .unwrap();
}

#[tokio::test]
async fn get_by_dn_finds_ca() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let ca = store
        .authorities()
        .create(root(tenant_id, "Acme Root"))
        .await
        .unwrap();

    let found = store
        .authorities()
        .get_by_dn(tenant_id, &ca.dn)
        .await
        .unwrap();
    assert_eq!(found.map(|c| c.id), Some(ca.id));

    let missing = store
        .authorities()
        .get_by_dn(tenant_id, "CN=Nobody")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn update_sets_lifecycle_fields() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let ca = store
        .authorities()
        .create(root(tenant_id, "Acme Root"))
        .await
        .unwrap();

    let not_before = Utc::now();
    let updated = store
        .authorities()
        .update(
            tenant_id,
            ca.id,
            UpdateCertificateAuthority {
                status: Some(IssuanceStatus::Active),
                serial_number: Some("01AB".into()),
                not_before: Some(not_before),
                not_after: Some(not_before + Duration::days(30)),
            },
        )
        .await
        .unwrap();

    assert!(updated.is_active());
    assert_eq!(updated.serial_number.as_deref(), Some("01AB"));
    assert!(updated.not_after.is_some());
    assert_eq!(updated.dn, ca.dn);
}

#[tokio::test]
async fn update_unknown_ca_is_not_found() {
    let store = setup().await;
    let err = store
        .authorities()
        .update(
            Uuid::new_v4(),
            Uuid::new_v4(),
            UpdateCertificateAuthority::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StratumError::NotFound { .. }));
}

#[tokio::test]
async fn list_children_and_counts() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let repo = store.authorities();
    let r = repo.create(root(tenant_id, "Root")).await.unwrap();
    repo.create(intermediate(tenant_id, r.id, "Issuing A"))
        .await
        .unwrap();
    repo.create(intermediate(tenant_id, r.id, "Issuing B"))
        .await
        .unwrap();
    repo.create(root(tenant_id, "Other Root")).await.unwrap();

    let children = repo.list_children(tenant_id, r.id).await.unwrap();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| c.parent_ca_id == Some(r.id)));

    assert_eq!(
        repo.count_intermediate_children(tenant_id, r.id)
            .await
            .unwrap(),
        2
    );

    let roots = repo
        .list(
            tenant_id,
            CaFilter {
                ca_type: Some(CaType::Root),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(roots.total, 2);
    assert_eq!(roots.items.len(), 2);

    let page = repo
        .list(
            tenant_id,
            CaFilter::default(),
            Pagination {
                offset: 0,
                limit: 3,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.items.len(), 3);
}

#[tokio::test]
async fn delete_cascades_to_subtree_and_material() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let repo = store.authorities();

    let r = repo.create(root(tenant_id, "Root")).await.unwrap();
    let i = repo
        .create(intermediate(tenant_id, r.id, "Issuing"))
        .await
        .unwrap();
    let leaf = repo
        .create(intermediate(tenant_id, i.id, "Leaf CA"))
        .await
        .unwrap();

    let mut tx = store.begin();
    store
        .materials()
        .stage_ca_material(&mut tx, tenant_id, i.id, 1, &sealed("AA01"));
    store.commit(tx).await.unwrap();
    assert!(store.materials().serial_in_use("AA01").await.unwrap());

    repo.delete(tenant_id, i.id).await.unwrap();

    for gone in [i.id, leaf.id] {
        let err = repo.get_by_id(tenant_id, gone).await.unwrap_err();
        assert!(matches!(err, StratumError::NotFound { .. }));
    }
    assert!(repo.get_by_id(tenant_id, r.id).await.is_ok());
    assert!(!store.materials().serial_in_use("AA01").await.unwrap());
    assert!(
        store
            .materials()
            .current_ca_key_pair(tenant_id, i.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn staged_insert_is_discarded_without_commit() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let ca = store
        .authorities()
        .create(root(tenant_id, "Root"))
        .await
        .unwrap();

    let mut tx = store.begin();
    store.authorities().stage_update(
        &mut tx,
        tenant_id,
        ca.id,
        &UpdateCertificateAuthority {
            status: Some(IssuanceStatus::Active),
            ..Default::default()
        },
    );
    drop(tx);

    let fetched = store.authorities().get_by_id(tenant_id, ca.id).await.unwrap();
    assert_eq!(fetched.status, IssuanceStatus::PendingCertificate);
}

#[tokio::test]
async fn child_budget_guard_rejects_insert_past_limit() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let repo = store.authorities();
    let mut input = root(tenant_id, "Root");
    input.max_path_length = Some(1);
    let r = repo.create(input).await.unwrap();
    repo.create(intermediate(tenant_id, r.id, "First"))
        .await
        .unwrap();

    // Staged without any pre-check, as a writer holding a stale count would.
    let late = stratum_core::models::certificate_authority::CertificateAuthority::new_pending(
        intermediate(tenant_id, r.id, "Second"),
    );
    let mut tx = store.begin();
    repo.stage_lock(&mut tx, tenant_id, r.id);
    repo.stage_child_budget(&mut tx, tenant_id, r.id, 1);
    repo.stage_insert(&mut tx, &late);
    let err = store.commit(tx).await.unwrap_err();

    assert!(err.is_retryable(), "got {err:?}");
    assert_eq!(repo.count_intermediate_children(tenant_id, r.id).await.unwrap(), 1);
    assert!(matches!(
        repo.get_by_id(tenant_id, late.id).await.unwrap_err(),
        StratumError::NotFound { .. }
    ));
}

#[tokio::test]
async fn child_budget_guard_passes_under_limit() {
    let store = setup().await;
    let tenant_id = Uuid::new_v4();
    let repo = store.authorities();
    let mut input = root(tenant_id, "Root");
    input.max_path_length = Some(2);
    let r = repo.create(input).await.unwrap();
    repo.create(intermediate(tenant_id, r.id, "First"))
        .await
        .unwrap();

    let second = stratum_core::models::certificate_authority::CertificateAuthority::new_pending(
        intermediate(tenant_id, r.id, "Second"),
    );
    let mut tx = store.begin();
    repo.stage_child_budget(&mut tx, tenant_id, r.id, 2);
    repo.stage_insert(&mut tx, &second);
    store.commit(tx).await.unwrap();

    assert_eq!(repo.count_intermediate_children(tenant_id, r.id).await.unwrap(), 2);
}

#[tokio::test]
async fn subtree_walk_honours_configured_depth() {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    stratum_db::run_migrations(&db).await.unwrap();
    let shallow = SurrealPkiStore::with_max_hierarchy_depth(db.clone(), 2);
    let deep = SurrealPkiStore::with_max_hierarchy_depth(db, 3);

    let tenant_id = Uuid::new_v4();
    let r = deep.authorities().create(root(tenant_id, "Root")).await.unwrap();
    let i1 = deep
        .authorities()
        .create(intermediate(tenant_id, r.id, "Level 1"))
        .await
        .unwrap();
    deep.authorities()
        .create(intermediate(tenant_id, i1.id, "Level 2"))
        .await
        .unwrap();

    let err = shallow.authorities().delete(tenant_id, r.id).await.unwrap_err();
    assert!(matches!(err, StratumError::CorruptHierarchy { .. }), "got {err:?}");

    deep.authorities().delete(tenant_id, r.id).await.unwrap();
    assert!(matches!(
        deep.authorities().get_by_id(tenant_id, r.id).await.unwrap_err(),
        StratumError::NotFound { .. }
    ));
}
