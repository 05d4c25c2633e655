use tempfile::TempDir;

use session::store::SessionStore;
use session::store::sqlite_store::SqliteSessionStore;

///
/// Test suite for SqliteSessionStore
///
/// This suite verifies:
///   · schema creation on connect
///   · set_if_absent writes exactly once
///   · compare-and-swap / compare-and-delete semantics
///   · prefix scans, including LIKE metacharacters in the prefix
///   · durability across reconnects
///
/// Every test runs against its own database file in a temporary directory.
///
async fn setup_store() -> (TempDir, SqliteSessionStore) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("sessions.db").display());
    let store = SqliteSessionStore::connect(&url).await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn test_set_if_absent_and_get() -> anyhow::Result<()> {
    let (_dir, store) = setup_store().await;

    assert!(store.set_if_absent("TEST_a", r#"{"v":1}"#).await?);
    assert!(!store.set_if_absent("TEST_a", r#"{"v":2}"#).await?);

    assert_eq!(store.get("TEST_a").await?.as_deref(), Some(r#"{"v":1}"#));
    assert_eq!(store.get("TEST_missing").await?, None);

    Ok(())
}

#[tokio::test]
async fn test_exists_and_delete() -> anyhow::Result<()> {
    let (_dir, store) = setup_store().await;

    store.set_if_absent("TEST_a", "{}").await?;
    assert!(store.exists("TEST_a").await?);

    assert_eq!(store.delete("TEST_a").await?, 1);
    assert_eq!(store.delete("TEST_a").await?, 0);
    assert!(!store.exists("TEST_a").await?);

    Ok(())
}

#[tokio::test]
async fn test_replace_if_equals() -> anyhow::Result<()> {
    let (_dir, store) = setup_store().await;
    store.set_if_absent("k", "v1").await?;

    assert!(!store.replace_if_equals("k", "stale", "v2").await?);
    assert_eq!(store.get("k").await?.as_deref(), Some("v1"));

    assert!(store.replace_if_equals("k", "v1", "v2").await?);
    assert_eq!(store.get("k").await?.as_deref(), Some("v2"));

    assert!(!store.replace_if_equals("absent", "v1", "v2").await?);
    assert!(!store.exists("absent").await?);

    Ok(())
}

#[tokio::test]
async fn test_delete_if_equals() -> anyhow::Result<()> {
    let (_dir, store) = setup_store().await;
    store.set_if_absent("k", "v1").await?;

    assert!(!store.delete_if_equals("k", "other").await?);
    assert!(store.exists("k").await?);

    assert!(store.delete_if_equals("k", "v1").await?);
    assert!(!store.exists("k").await?);

    Ok(())
}

#[tokio::test]
async fn test_keys_are_prefix_scoped_and_sorted() -> anyhow::Result<()> {
    let (_dir, store) = setup_store().await;

    for key in ["TEST_b", "cerebro1", "TEST_a", "TESTx", "T%_z"] {
        store.set_if_absent(key, "{}").await?;
    }

    assert_eq!(store.keys("TEST_").await?, vec!["TEST_a", "TEST_b"]);
    assert_eq!(store.keys("T%_").await?, vec!["T%_z"]);
    assert_eq!(store.keys("").await?.len(), 5);
    assert!(store.keys("nothing").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_documents_survive_reconnect() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let url = format!("sqlite://{}", dir.path().join("sessions.db").display());

    let store = SqliteSessionStore::connect(&url).await?;
    store.set_if_absent("TEST_keep", "{}").await?;
    store.close().await?;

    let reopened = SqliteSessionStore::connect(&url).await?;
    assert!(reopened.exists("TEST_keep").await?);

    Ok(())
}
