use std::sync::Arc;

use shared::domain::Theme;
use tracing::warn;

use crate::{
    error::StagingError,
    store::{DurableStore, THEME_KEY},
};

pub struct Preferences {
    store: Arc<dyn DurableStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    /// Missing or unreadable values fall back to [`Theme::Light`].
    pub async fn load_theme(&self) -> Result<Theme, StagingError> {
        let raw = self
            .store
            .load(THEME_KEY)
            .await
            .map_err(StagingError::storage)?;
        let Some(raw) = raw else {
            return Ok(Theme::default());
        };
        Ok(raw.parse().unwrap_or_else(|err| {
            warn!(error = %err, "ignoring stored theme preference");
            Theme::default()
        }))
    }

    pub async fn save_theme(&self, theme: Theme) -> Result<(), StagingError> {
        self.store
            .save(THEME_KEY, theme.as_str())
            .await
            .map_err(StagingError::storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn theme_defaults_to_light_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let preferences = Preferences::new(store.clone());
        assert_eq!(preferences.load_theme().await.expect("load"), Theme::Light);

        preferences.save_theme(Theme::Dark).await.expect("save");
        assert_eq!(store.load(THEME_KEY).await.expect("raw").as_deref(), Some("dark"));
        assert_eq!(preferences.load_theme().await.expect("reload"), Theme::Dark);
    }

    #[tokio::test]
    async fn unknown_theme_value_falls_back_to_light() {
        let store = Arc::new(MemoryStore::new().with_value(THEME_KEY, "solarized").await);
        let preferences = Preferences::new(store);
        assert_eq!(preferences.load_theme().await.expect("load"), Theme::Light);
    }
}
