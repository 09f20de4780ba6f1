use std::path::PathBuf;

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;
use shared::domain::Resolution;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_HEALTH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_SAMPLES_DIR: &str = "./data/samples";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub backend_url: String,
    pub database_url: String,
    pub default_resolution: u32,
    pub health_timeout_ms: u64,
    pub samples_dir: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            database_url: default_database_url(),
            default_resolution: Resolution::default().px(),
            health_timeout_ms: DEFAULT_HEALTH_TIMEOUT_MS,
            samples_dir: DEFAULT_SAMPLES_DIR.into(),
        }
    }
}

/// Defaults, then `stager.toml` if present, then `APP__*` variables.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from("stager")
}

pub fn load_settings_from(file_stem: &str) -> anyhow::Result<Settings> {
    let defaults = Settings::default();
    let raw = Config::builder()
        .set_default("backend_url", defaults.backend_url)?
        .set_default("database_url", defaults.database_url)?
        .set_default("default_resolution", i64::from(defaults.default_resolution))?
        .set_default("health_timeout_ms", defaults.health_timeout_ms)?
        .set_default("samples_dir", defaults.samples_dir)?
        .add_source(File::with_name(file_stem).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to assemble settings")?;
    raw.try_deserialize::<Settings>()
        .context("invalid stager settings")
}

fn default_database_url() -> String {
    let root = dirs::data_dir()
        .map(|dir| dir.join("stager"))
        .unwrap_or_else(|| PathBuf::from("./data"));
    normalize_database_url(&root.join("stager.db").to_string_lossy())
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return default_database_url();
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/test.db"),
            "sqlite://./data/test.db"
        );
        assert_eq!(
            normalize_database_url("sqlite:C:\\stager\\db.sqlite"),
            "sqlite://C:/stager/db.sqlite"
        );
    }

    #[test]
    fn keeps_memory_and_full_urls() {
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_database_url(" sqlite://./x.db "),
            "sqlite://./x.db"
        );
    }

    #[test]
    fn default_database_lives_under_stager_dir() {
        let url = Settings::default().database_url;
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("stager.db"));
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stem = dir.path().join("stager");
        fs::write(
            stem.with_extension("toml"),
            "backend_url = \"http://10.0.0.5:9000\"\ndefault_resolution = 1536\nsamples_dir = \"rooms\"\n",
        )
        .expect("write settings");

        let settings = load_settings_from(&stem.to_string_lossy()).expect("settings");
        assert_eq!(settings.backend_url, "http://10.0.0.5:9000");
        assert_eq!(settings.default_resolution, 1536);
        assert_eq!(settings.samples_dir, "rooms");
        assert_eq!(settings.health_timeout_ms, DEFAULT_HEALTH_TIMEOUT_MS);
    }
}
