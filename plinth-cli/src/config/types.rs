use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Host configuration as stored in `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub plugins: PluginsSection,

    #[serde(default)]
    pub host: HostSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginsSection {
    /// Extra plugin directories, searched after the install location
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// When non-empty, only these plugins load
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Plugins that never load
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostSection {
    /// Where persisted plugin settings live
    pub settings_path: Option<PathBuf>,
}

/// File name of the host configuration inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the persisted settings inside the data directory
pub const SETTINGS_FILE_NAME: &str = "settings.toml";
