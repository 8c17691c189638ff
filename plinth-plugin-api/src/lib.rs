//! plinth-plugin-api - Plugin API for the plinth host
//!
//! This crate provides the traits and types needed to write plugins for
//! plinth. Plugins are native Rust dynamic libraries; the host finds them on
//! disk, checks their API version and manifest, then drives them through a
//! fixed lifecycle:
//!
//! 1. [`Plugin::initialize`] - once, in discovery order
//! 2. [`Plugin::load_config`] - persisted settings from the previous run
//! 3. [`Plugin::start`]
//! 4. [`Plugin::stop`] - in reverse initialization order
//! 5. [`Plugin::save_config`]
//! 6. [`Plugin::shutdown`] - just before the library is released
//!
//! # Example
//!
//! ```ignore
//! use plinth_plugin_api::{Plugin, PluginContext, PluginError, PluginManifest, export_plugin};
//!
//! #[derive(Default)]
//! pub struct MyPlugin;
//!
//! impl Plugin for MyPlugin {
//!     fn manifest(&self) -> PluginManifest {
//!         PluginManifest {
//!             name: "my-plugin".to_string(),
//!             version: "0.1.0".to_string(),
//!             capabilities: vec!["greeting".to_string()],
//!             ..Default::default()
//!         }
//!     }
//!
//!     fn initialize(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
//!         ctx.log_info("Plugin initialized!");
//!         Ok(())
//!     }
//!
//!     fn shutdown(&mut self) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! export_plugin!(MyPlugin);
//! ```

pub mod context;
pub mod error;
pub mod types;

pub use context::{ConfigSection, PluginContext, PluginLookup, SharedService};
pub use error::PluginError;
pub use types::*;

/// Current plugin API version. Plugins must match this exactly.
/// This is checked when loading plugins, before any plugin code besides the
/// version query runs.
pub const API_VERSION: u32 = 1;

/// Symbol exported by [`export_plugin!`] returning the plugin's API version
pub const API_VERSION_SYMBOL: &[u8] = b"_plinth_plugin_api_version";

/// Symbol exported by [`export_plugin!`] creating the plugin instance
pub const CREATE_SYMBOL: &[u8] = b"_plinth_plugin_create";

/// The core plugin trait - implement this to create a plinth plugin.
///
/// Only `manifest`, `initialize` and `shutdown` are required.
pub trait Plugin: Send + Sync {
    /// Return plugin metadata
    fn manifest(&self) -> PluginManifest;

    /// Called once after loading. Plugins initialized earlier are already
    /// visible through the context, along with the services they published.
    fn initialize(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError>;

    /// Apply settings persisted by the previous run (empty on first run)
    fn load_config(&mut self, _section: &ConfigSection) {}

    /// Begin normal activity
    fn start(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Stop activity; settings are saved right after this
    fn stop(&mut self) {}

    /// Write settings to persist for the next run
    fn save_config(&self, _section: &mut ConfigSection) {}

    /// Release resources. Called before the plugin library is unloaded.
    fn shutdown(&mut self) -> Result<(), PluginError>;
}

/// Export a plugin type for dynamic loading.
///
/// This macro generates the C ABI entry points that the plinth host uses
/// to negotiate with and instantiate the plugin.
///
/// # Usage
///
/// ```ignore
/// plinth_plugin_api::export_plugin!(MyPlugin);
/// ```
///
/// # Generated Functions
///
/// - `_plinth_plugin_api_version()`: Returns the API version
/// - `_plinth_plugin_create()`: Creates a new plugin instance
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _plinth_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _plinth_plugin_create() -> *mut dyn $crate::Plugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new(<$plugin_type>::default());
            Box::into_raw(plugin)
        }
    };
}
