//! Persisted settings - global and per-plugin sections
//!
//! The orchestrator only talks to the [`ConfigStore`] trait. The binary
//! uses [`TomlConfigStore`]; tests and embedders can use
//! [`MemoryConfigStore`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use plinth_plugin_api::ConfigSection;

/// Everything a settings store holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredConfig {
    /// Host-wide settings, including run statistics
    #[serde(default)]
    pub global: ConfigSection,
    /// One section per plugin name
    #[serde(default)]
    pub plugins: BTreeMap<String, ConfigSection>,
}

impl StoredConfig {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.plugins.is_empty()
    }

    /// Section for `name`, empty if the plugin has never saved anything
    pub fn plugin(&self, name: &str) -> ConfigSection {
        self.plugins.get(name).cloned().unwrap_or_default()
    }
}

#[derive(Error, Debug)]
pub enum ConfigStoreError {
    #[error("Settings I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize settings: {0}")]
    Serialize(String),
}

/// Persists [`StoredConfig`] between runs
pub trait ConfigStore: Send {
    /// Read the stored settings. A store that has never been written
    /// returns the default.
    fn load(&mut self) -> Result<StoredConfig, ConfigStoreError>;

    fn save(&mut self, config: &StoredConfig) -> Result<(), ConfigStoreError>;

    /// Erase everything stored
    fn clear(&mut self) -> Result<(), ConfigStoreError>;

    /// Where the settings live, for log output
    fn describe(&self) -> String;
}

/// Settings kept in a TOML file
#[derive(Debug, Clone)]
pub struct TomlConfigStore {
    path: PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> ConfigStoreError {
        ConfigStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&mut self) -> Result<StoredConfig, ConfigStoreError> {
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "No settings file, using defaults");
            return Ok(StoredConfig::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        toml::from_str(&content).map_err(|e| ConfigStoreError::Parse {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    fn save(&mut self, config: &StoredConfig) -> Result<(), ConfigStoreError> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigStoreError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        std::fs::write(&self.path, content).map_err(|e| self.io_error(e))?;
        tracing::debug!(path = %self.path.display(), "Settings saved");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), ConfigStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    config: Option<StoredConfig>,
    loads: usize,
    saves: usize,
    fail_load: bool,
}

/// Settings kept in memory.
///
/// Clones share the same state, so a test can keep one clone and hand the
/// other to an orchestrator.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with `config`
    pub fn with_config(config: StoredConfig) -> Self {
        let store = Self::default();
        store.lock().config = Some(config);
        store
    }

    /// Store whose `load` always fails with a parse error
    pub fn malformed() -> Self {
        let store = Self::default();
        store.lock().fail_load = true;
        store
    }

    /// Last saved (or seeded) settings
    pub fn saved(&self) -> Option<StoredConfig> {
        self.lock().config.clone()
    }

    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&mut self) -> Result<StoredConfig, ConfigStoreError> {
        let mut state = self.lock();
        state.loads += 1;
        if state.fail_load {
            return Err(ConfigStoreError::Parse {
                path: PathBuf::from("<memory>"),
                message: "simulated malformed settings".to_string(),
            });
        }
        Ok(state.config.clone().unwrap_or_default())
    }

    fn save(&mut self, config: &StoredConfig) -> Result<(), ConfigStoreError> {
        let mut state = self.lock();
        state.saves += 1;
        state.config = Some(config.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), ConfigStoreError> {
        self.lock().config = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "<memory>".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> StoredConfig {
        let mut config = StoredConfig::default();
        config.global.set("runs_started", 3).unwrap();
        let mut meter = ConfigSection::new();
        meter.set("interval_ms", 250).unwrap();
        meter.set("label", "cpu").unwrap();
        config.plugins.insert("meter".to_string(), meter);
        config
    }

    #[test]
    fn test_toml_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let mut store = TomlConfigStore::new(dir.path().join("settings.toml"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_toml_save_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("settings.toml");
        let mut store = TomlConfigStore::new(&path);

        store.save(&sample()).unwrap();
        assert!(path.exists());

        let loaded = store.load().unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.plugin("meter").get::<i64>("interval_ms"), Some(250));
    }

    #[test]
    fn test_toml_file_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let mut store = TomlConfigStore::new(&path);
        store.save(&sample()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[global]"));
        assert!(content.contains("[plugins.meter]"));
        assert!(content.contains("label = \"cpu\""));
    }

    #[test]
    fn test_toml_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "this is [not valid toml").unwrap();

        let mut store = TomlConfigStore::new(&path);
        assert!(matches!(store.load(), Err(ConfigStoreError::Parse { .. })));
    }

    #[test]
    fn test_toml_clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        let mut store = TomlConfigStore::new(&path);
        store.save(&sample()).unwrap();

        store.clear().unwrap();
        assert!(!path.exists());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_unknown_plugin_section_is_empty() {
        assert!(sample().plugin("absent").is_empty());
    }

    #[test]
    fn test_memory_store_shares_state_between_clones() {
        let store = MemoryConfigStore::new();
        let mut writer = store.clone();

        writer.save(&sample()).unwrap();
        assert_eq!(store.saved(), Some(sample()));
        assert_eq!(store.save_count(), 1);

        writer.clear().unwrap();
        assert_eq!(store.saved(), None);
    }

    #[test]
    fn test_memory_store_malformed_counts_loads() {
        let store = MemoryConfigStore::malformed();
        let mut reader = store.clone();
        assert!(reader.load().is_err());
        assert_eq!(store.load_count(), 1);
    }
}
