use super::*;

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn put_then_get_round_trips_value() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .put_value("http://127.0.0.1:8000", "theme", "dark")
        .await
        .expect("put");

    let stored = storage
        .get_value("http://127.0.0.1:8000", "theme")
        .await
        .expect("get")
        .expect("value present");
    assert_eq!(stored.value, "dark");
    assert_eq!(stored.key, "theme");
}

#[tokio::test]
async fn put_overwrites_existing_key() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.put_value("o", "history", "[]").await.expect("first");
    storage.put_value("o", "history", "[1]").await.expect("second");

    let stored = storage.get_value("o", "history").await.expect("get");
    assert_eq!(stored.map(|v| v.value).as_deref(), Some("[1]"));
}

#[tokio::test]
async fn values_are_scoped_per_origin() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.put_value("a", "theme", "dark").await.expect("put");

    assert!(storage.get_value("b", "theme").await.expect("get").is_none());
    assert_eq!(
        storage
            .get_value("a", "theme")
            .await
            .expect("get")
            .map(|v| v.value)
            .as_deref(),
        Some("dark")
    );
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("storage.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn values_survive_reopen() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("stager.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let storage = Storage::new(&database_url).await.expect("db");
        storage.put_value("o", "theme", "dark").await.expect("put");
        storage.pool().close().await;
    }

    let reopened = Storage::new(&database_url).await.expect("reopen");
    let stored = reopened.get_value("o", "theme").await.expect("get");
    assert_eq!(stored.map(|v| v.value).as_deref(), Some("dark"));
}

#[test]
fn memory_urls_have_no_file_path() {
    assert!(sqlite_path("sqlite::memory:").is_none());
    assert_eq!(
        sqlite_path("sqlite://./data/stager.db?mode=rwc"),
        Some(PathBuf::from("./data/stager.db"))
    );
}
