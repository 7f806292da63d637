//! Tenant resolution integration tests.
//!
//! These run the connection manager against a file-backed registry and one
//! SQLite file per tenant.

mod common;

use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use chorus_persistence::core::{Backend, RecordStore, TransactionOptions};
use chorus_persistence::error::{StorageError, TenantError};
use chorus_persistence::tenant::{TenantId, TenantManagerConfig, TenantStatus};
use chorus_persistence::types::{RecordKey, RecordQuery, RecordWrite};

use common::TestEnv;

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_resolve_creates_tenant_file() {
    let env = TestEnv::new();
    let tenant = env.add_tenant("grace-chapel").await;

    let handle = env.manager.resolve(&tenant).await.unwrap();
    assert_eq!(handle.tenant_id(), &tenant);
    assert_eq!(handle.display_name(), "grace-chapel church");
    handle.health_check().await.unwrap();

    assert!(env.tenant_dir().join("grace_chapel.db").exists());
    assert_eq!(env.manager.pool_count(), 1);
}

#[tokio::test]
async fn test_pool_is_reused() {
    let env = TestEnv::new();
    let tenant = env.add_tenant("grace-chapel").await;

    let first = env.manager.resolve(&tenant).await.unwrap();
    first
        .create_many(
            &[RecordWrite::new("contacts", "c1", json!({"name": "Ada"}))],
            &TransactionOptions::default(),
        )
        .await
        .unwrap();

    let second = env.manager.resolve(&tenant).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(first.store(), second.store()));
    assert!(
        second
            .find(&RecordKey::new("contacts", "c1"))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let env = TestEnv::new();
    let grace = env.add_tenant("grace-chapel").await;
    let hope = env.add_tenant("hope-church").await;

    let handle = env.manager.resolve(&grace).await.unwrap();
    handle
        .create_many(
            &[
                RecordWrite::new("contacts", "c1", json!({"name": "Ada"})),
                RecordWrite::new("contacts", "c2", json!({"name": "Grace"})),
            ],
            &TransactionOptions::default(),
        )
        .await
        .unwrap();

    let other = env.manager.resolve(&hope).await.unwrap();
    assert_eq!(
        other.count(&RecordQuery::collection("contacts")).await.unwrap(),
        0
    );
    assert_eq!(env.manager.pool_count(), 2);
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_unknown_tenant_is_not_found() {
    let env = TestEnv::new();
    let err = env
        .manager
        .resolve(&TenantId::new("nowhere"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Tenant(TenantError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_invalid_identifiers_are_rejected() {
    let env = TestEnv::new();
    for id in ["", "   ", "../etc/passwd", "has space"] {
        let err = env.manager.resolve(&TenantId::new(id)).await.unwrap_err();
        assert!(
            matches!(err, StorageError::Tenant(TenantError::InvalidTenant { .. })),
            "expected {:?} to be invalid, got {}",
            id,
            err
        );
    }
}

#[tokio::test]
async fn test_suspension_closes_pool() {
    let env = TestEnv::new();
    let tenant = env.add_tenant("grace-chapel").await;

    env.manager.resolve(&tenant).await.unwrap();
    assert!(env.manager.is_pooled(&tenant));

    env.set_status(&tenant, TenantStatus::Suspended).await;
    let err = env.manager.resolve(&tenant).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Tenant(TenantError::Suspended { .. })
    ));
    assert!(!env.manager.is_pooled(&tenant));

    env.set_status(&tenant, TenantStatus::Active).await;
    assert_ok!(env.manager.resolve(&tenant).await);
}

#[tokio::test]
async fn test_deleted_tenant_is_not_found() {
    let env = TestEnv::new();
    let tenant = env.add_tenant("grace-chapel").await;
    env.set_status(&tenant, TenantStatus::Deleted).await;

    let err = env.manager.resolve(&tenant).await.unwrap_err();
    assert!(matches!(
        err,
        StorageError::Tenant(TenantError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_cached_record_hides_status_change_until_invalidated() {
    let env = TestEnv::with_config(TenantManagerConfig::default().with_registry_cache_ttl_secs(60));
    let tenant = env.add_tenant("grace-chapel").await;

    env.manager.resolve(&tenant).await.unwrap();
    env.set_status(&tenant, TenantStatus::Suspended).await;

    // Still served from the cached record
    assert_ok!(env.manager.resolve(&tenant).await);

    env.manager.invalidate(&tenant);
    assert_err!(env.manager.resolve(&tenant).await);
}

// ============================================================================
// Pool lifecycle
// ============================================================================

#[tokio::test]
async fn test_max_pools_evicts_least_recent() {
    let env = TestEnv::with_config(
        TenantManagerConfig::default()
            .with_registry_cache_ttl_secs(0)
            .with_max_pools(2),
    );
    let a = env.add_tenant("church-a").await;
    let b = env.add_tenant("church-b").await;
    let c = env.add_tenant("church-c").await;

    env.manager.resolve(&a).await.unwrap();
    env.manager.resolve(&b).await.unwrap();
    env.manager.resolve(&c).await.unwrap();

    assert_eq!(env.manager.pool_count(), 2);
    assert!(!env.manager.is_pooled(&a));
    assert!(env.manager.is_pooled(&c));
}

#[tokio::test]
async fn test_data_survives_pool_close() {
    let env = TestEnv::new();
    let tenant = env.add_tenant("grace-chapel").await;

    let handle = env.manager.resolve(&tenant).await.unwrap();
    handle
        .create_many(
            &[RecordWrite::new("groups", "choir", json!({"size": 24}))],
            &TransactionOptions::default(),
        )
        .await
        .unwrap();
    drop(handle);

    assert!(env.manager.close(&tenant));
    let reopened = env.manager.resolve(&tenant).await.unwrap();
    let group = reopened
        .find(&RecordKey::new("groups", "choir"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(group.data["size"], 24);
}
