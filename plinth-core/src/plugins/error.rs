//! Plugin host error types

use std::path::PathBuf;
use thiserror::Error;

use plinth_plugin_api::{LifecycleState, PluginError};

/// Problems found while scanning plugin directories. Never fatal.
#[derive(Error, Debug)]
pub enum DiscoveryWarning {
    /// Directory exists but cannot be listed
    #[error("Plugin directory unreadable: {path}: {source}")]
    UnreadableDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Subdirectory that does not contain a plugin library
    #[error("No plugin library in {path}")]
    MissingLibrary { path: PathBuf },
}

/// Errors from loading a single plugin module
#[derive(Error, Debug)]
pub enum LoadError {
    /// Library file is gone
    #[error("Plugin library not found: {path}")]
    NotFound { path: PathBuf },

    /// The OS loader refused the file
    #[error("Failed to open plugin library {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// Module lacks the plugin entry points
    #[error("Plugin library {path} does not export `{symbol}`")]
    SymbolMismatch { path: PathBuf, symbol: String },

    /// API version mismatch between host and plugin
    #[error("API version mismatch: host expects {expected}, plugin has {found}")]
    IncompatibleVersion { expected: u32, found: u32 },

    /// Manifest name disagrees with the container the plugin was found in
    #[error("Plugin found as '{container}' reports its name as '{reported}'")]
    NameMismatch { container: String, reported: String },

    /// Plugin was loaded before in this run
    #[error("Plugin '{name}' is already loaded")]
    AlreadyLoaded { name: String },

    /// Plugin was not accepted by the activation policy
    #[error("Plugin '{name}' cannot be loaded from state '{state}'")]
    NotAccepted { name: String, state: LifecycleState },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Errors from initializing or starting a loaded plugin
#[derive(Error, Debug)]
pub enum InitError {
    /// Plugin returned an error
    #[error("Plugin '{name}' failed to {stage}: {source}")]
    Failed {
        name: String,
        stage: &'static str,
        #[source]
        source: PluginError,
    },

    /// Plugin panicked
    #[error("Plugin '{name}' panicked during {stage}")]
    Panicked { name: String, stage: &'static str },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Registry bookkeeping errors.
///
/// `InvalidTransition` and `DuplicateName` mean the registry's invariants
/// were broken; they indicate a bug in the host, not a misbehaving plugin.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Plugin not found
    #[error("Plugin '{name}' not found")]
    UnknownPlugin { name: String },

    /// Plugin has no loaded module
    #[error("Plugin '{name}' is not loaded")]
    NotLoaded { name: String },

    #[error("Invalid lifecycle transition for '{name}': {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("Duplicate plugin name in registry: '{name}'")]
    DuplicateName { name: String },
}
