//! Plugin discovery, activation and bookkeeping
//!
//! - [`PluginRegistry`]: table of discovered plugins, their modules and
//!   lifecycle states
//! - [`ActivationPolicy`]: decides from enable/disable overrides which
//!   discovered plugins may load
//! - [`ModuleLoader`]: turns a descriptor into a plugin instance
//!   ([`NativeLoader`] for shared libraries, [`BuiltinLoader`] for plugins
//!   linked into the host)
//!
//! # Plugin Containers
//!
//! Each search directory may hold, in any mix:
//! - `<name>.so` or `lib<name>.so` (`.dylib`/`.dll` per platform)
//! - `<name>/` containing `<name>.so` or `lib<name>.so` plus data files
//!
//! Directories are scanned in the order given; the first container with a
//! given name wins.
//!
//! # Example
//!
//! ```ignore
//! use plinth_core::plugins::{ActivationPolicy, NativeLoader, PluginRegistry};
//!
//! let mut registry = PluginRegistry::new(Box::new(NativeLoader));
//! registry.discover(&dirs)?;
//! registry.filter(&ActivationPolicy::default())?;
//! registry.load_all()?;
//! registry.initialize_all(&defines)?;
//! // ...
//! registry.unload_all()?;
//! ```

mod activation;
mod discovery;
mod error;
mod loader;
mod registry;

pub use activation::{ActivationOverrides, ActivationPolicy, accepts};
pub use discovery::{Candidate, ScanResult, library_extensions, scan_directory};
pub use error::{DiscoveryWarning, InitError, LoadError, RegistryError};
pub use loader::{BuiltinLoader, LoadedModule, ModuleLoader, NativeLoader};
pub use registry::{
    DiscoveryReport, PhaseOutcome, PluginDescriptor, PluginRegistry, RegistryHandle,
};
