use super::*;
use crate::credentials::SecretString;
use crate::hosts::{HostDirectory, HostRecord};
use tempfile::TempDir;

struct TestContext {
    store: SqliteStore,
    _dir: TempDir,
}

async fn create_test_context() -> TestContext {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data").join("shellcord.db");
    let store = SqliteStore::from_path(&path).await.unwrap();
    TestContext { store, _dir: dir }
}

fn host(owner: &str, name: &str) -> HostRecord {
    HostRecord {
        owner_id: owner.to_string(),
        hostname: name.to_string(),
        address: "10.0.0.5".to_string(),
        port: Some(2222),
        username: "deploy".to_string(),
        password: Some(SecretString::new("pw")),
        key_material: None,
    }
}

#[tokio::test]
async fn test_upsert_and_get_host() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    store.upsert_host(&host("42", "web1")).await.unwrap();

    let found = store.get_host("42", "web1").await.unwrap().unwrap();
    assert_eq!(found.address, "10.0.0.5");
    assert_eq!(found.port, Some(2222));
    assert_eq!(found.password.unwrap().expose(), "pw");

    assert!(store.get_host("7", "web1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_upsert_host_replaces_credentials() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    store.upsert_host(&host("42", "web1")).await.unwrap();
    let replaced = HostRecord {
        port: None,
        password: None,
        key_material: Some(SecretString::new("-----BEGIN KEY-----")),
        ..host("42", "web1")
    };
    store.upsert_host(&replaced).await.unwrap();

    let found = store.get_host("42", "web1").await.unwrap().unwrap();
    assert!(found.password.is_none());
    assert!(found.key_material.is_some());
    assert_eq!(found.target().unwrap().port, 22);
}

#[tokio::test]
async fn test_upsert_host_requires_credential() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    let bare = HostRecord {
        password: Some(SecretString::new("  ")),
        ..host("42", "web1")
    };
    assert!(matches!(
        store.upsert_host(&bare).await,
        Err(Error::CredentialMissing { .. })
    ));
    assert!(store.get_host("42", "web1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_and_remove_hosts() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    store.upsert_host(&host("42", "web2")).await.unwrap();
    store.upsert_host(&host("42", "web1")).await.unwrap();
    store.upsert_host(&host("7", "db")).await.unwrap();

    let listed = store.list_hosts("42").await.unwrap();
    let names: Vec<_> = listed.iter().map(|h| h.hostname.as_str()).collect();
    assert_eq!(names, vec!["web1", "web2"]);
    assert!(listed.iter().all(|h| h.updated_at.is_some()));

    store.remove_host("42", "web1").await.unwrap();
    assert!(matches!(
        store.remove_host("42", "web1").await,
        Err(Error::HostNotFound(_))
    ));
    assert_eq!(store.list_hosts("42").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_lifecycle_rows() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    store
        .upsert_active(&DurableSession::active("c1", "42", "web1"))
        .await
        .unwrap();
    store
        .upsert_active(&DurableSession::active("c2", "42", "web2"))
        .await
        .unwrap();

    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|s| s.is_active));

    store.set_active("c1", false).await.unwrap();
    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].channel_id, "c2");

    let inactive = store.latest_inactive("c1").await.unwrap().unwrap();
    assert_eq!(inactive.hostname, "web1");
    assert!(!inactive.is_active);
    assert!(store.latest_inactive("c2").await.unwrap().is_none());

    store.delete("c2").await.unwrap();
    assert!(store.list_active().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upsert_active_reactivates_with_new_owner() {
    let ctx = create_test_context().await;
    let store = &ctx.store;

    store
        .upsert_active(&DurableSession::active("c1", "42", "web1"))
        .await
        .unwrap();
    store.set_active("c1", false).await.unwrap();
    store
        .upsert_active(&DurableSession::active("c1", "7", "web1"))
        .await
        .unwrap();

    let active = store.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].owner_id, "7");
}

#[tokio::test]
async fn test_set_active_unknown_channel() {
    let store = SqliteStore::in_memory().await.unwrap();

    assert!(matches!(
        store.set_active("missing", true).await,
        Err(Error::SessionNotFound(_))
    ));
    store.delete("missing").await.unwrap();
}
