use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use storage::Storage;
use tokio::sync::Mutex;
use url::Url;

pub const THEME_KEY: &str = "theme";
pub const HISTORY_KEY: &str = "history";

/// Durable string storage under fixed keys, scoped to one backend origin.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
}

pub struct OriginStore {
    storage: Storage,
    origin: String,
}

impl OriginStore {
    pub fn new(storage: Storage, backend_url: &Url) -> Self {
        Self {
            storage,
            origin: backend_url.origin().ascii_serialization(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[async_trait]
impl DurableStore for OriginStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .storage
            .get_value(&self.origin, key)
            .await?
            .map(|stored| stored.value))
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.storage.put_value(&self.origin, key, value).await
    }
}

/// Process-local store, used when nothing should outlive the session.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn with_value(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn origin_store_scopes_keys_by_backend_origin() {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let local = OriginStore::new(
            storage.clone(),
            &Url::parse("http://127.0.0.1:8000/api/").expect("url"),
        );
        let remote = OriginStore::new(
            storage,
            &Url::parse("https://staging.example.com").expect("url"),
        );

        local.save(THEME_KEY, "dark").await.expect("save");

        assert_eq!(local.origin(), "http://127.0.0.1:8000");
        assert_eq!(local.load(THEME_KEY).await.expect("load").as_deref(), Some("dark"));
        assert!(remote.load(THEME_KEY).await.expect("load").is_none());
    }
}
