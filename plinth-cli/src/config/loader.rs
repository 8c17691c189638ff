use super::types::{CONFIG_FILE_NAME, HostConfig, HostSection, PluginsSection, SETTINGS_FILE_NAME};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Environment variable naming an extra host config file
pub const CONFIG_ENV: &str = "PLINTH_CONFIG";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + explicit)
    ///
    /// The explicit file is `explicit` if given, else `$PLINTH_CONFIG`. Unlike
    /// the user config it must exist.
    pub fn load(explicit: Option<&Path>) -> Result<HostConfig> {
        let mut config = HostConfig::default();

        // Layer 1: User config
        let user_path = Self::user_config_path();
        if user_path.exists() {
            config = Self::merge(config, Self::read(&user_path)?);
        }

        // Layer 2: Explicit config
        if let Some(path) = Self::explicit_config_path(explicit) {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            config = Self::merge(config, Self::read(&path)?);
        }

        Ok(config)
    }

    /// `$XDG_CONFIG_HOME/plinth/config.toml` or the platform equivalent
    pub fn user_config_path() -> PathBuf {
        plinth_paths::config_dir().join(CONFIG_FILE_NAME)
    }

    fn explicit_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
    }

    /// Settings file: command line, then config file, then the data directory
    pub fn settings_path(config: &HostConfig, cli: Option<&Path>) -> PathBuf {
        cli.map(Path::to_path_buf)
            .or_else(|| config.host.settings_path.clone())
            .unwrap_or_else(|| plinth_paths::data_dir().join(SETTINGS_FILE_NAME))
    }

    fn read(path: &Path) -> Result<HostConfig> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("Malformed config {}", path.display()))
    }

    /// Lists are unioned (base entries first); scalar overlay values win
    fn merge(base: HostConfig, overlay: HostConfig) -> HostConfig {
        HostConfig {
            plugins: PluginsSection {
                paths: union(base.plugins.paths, overlay.plugins.paths),
                enabled: union(base.plugins.enabled, overlay.plugins.enabled),
                disabled: union(base.plugins.disabled, overlay.plugins.disabled),
            },
            host: HostSection {
                settings_path: overlay.host.settings_path.or(base.host.settings_path),
            },
        }
    }
}

fn union<T: PartialEq>(mut base: Vec<T>, overlay: Vec<T>) -> Vec<T> {
    for item in overlay {
        if !base.contains(&item) {
            base.push(item);
        }
    }
    base
}
