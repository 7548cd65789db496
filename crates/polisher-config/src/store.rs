//! Settings collaborator.
//!
//! The pipeline reads settings once per invocation and never caches them, so
//! edits made while a page is open apply to the next rewrite.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::ConfigError;
use crate::loader::ConfigLoader;
use crate::schema::Settings;

/// Key-value settings persistence.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Settings, ConfigError>;

    async fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

/// In-process settings, for embedders that own persistence themselves.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Apply an in-place edit.
    pub fn update(&self, edit: impl FnOnce(&mut Settings)) {
        edit(&mut self.settings.write());
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> Result<Settings, ConfigError> {
        Ok(self.settings.read().clone())
    }

    async fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        *self.settings.write() = settings.clone();
        Ok(())
    }
}

/// Settings persisted as a TOML file, re-read on every load.
///
/// A missing file yields default settings (no credential).
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `~`-expanded `path`.
    pub fn from_user_path(path: &str) -> Self {
        Self::new(ConfigLoader::expand_path(path))
    }

    /// Store at the platform config directory, if one exists.
    pub fn at_default_location() -> Option<Self> {
        ConfigLoader::default_settings_path().map(Self::new)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self) -> Result<Settings, ConfigError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => ConfigLoader::load_settings_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Settings file {:?} not found, using defaults", self.path);
                Ok(Settings::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = toml::to_string_pretty(settings)?;
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySettingsStore::default();
        assert!(!store.load().await.unwrap().has_credential());

        store
            .save(&Settings::default().with_credential("sk-test"))
            .await
            .unwrap();
        assert!(store.load().await.unwrap().has_credential());
    }

    #[tokio::test]
    async fn test_memory_store_update_is_visible_on_next_load() {
        let store = MemorySettingsStore::new(Settings::default());
        store.update(|s| s.provider = "openai".to_string());
        assert_eq!(store.load().await.unwrap().provider, "openai");
    }

    #[tokio::test]
    async fn test_file_store_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join("settings.toml"));
        let settings = store.load().await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_file_store_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileSettingsStore::new(dir.path().join("nested").join("settings.toml"));
        let settings = Settings::default()
            .with_provider("openai")
            .with_credential("sk-file")
            .with_custom_instructions("No emoji.");

        store.save(&settings).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, settings);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("customInstructions"));
    }

    #[tokio::test]
    async fn test_file_store_rereads_on_each_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let store = FileSettingsStore::new(&path);

        std::fs::write(&path, "provider = \"deepseek\"").unwrap();
        assert_eq!(store.load().await.unwrap().provider, "deepseek");

        std::fs::write(&path, "provider = \"openai\"").unwrap();
        assert_eq!(store.load().await.unwrap().provider, "openai");
    }

    #[tokio::test]
    async fn test_file_store_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "provider = [").unwrap();
        let store = FileSettingsStore::new(&path);
        assert!(store.load().await.is_err());
    }
}
