//! plinth-core: plugin discovery and lifecycle for the plinth host
//!
//! - **Plugins** - [`plugins::PluginRegistry`] finds plugin containers,
//!   applies the [`plugins::ActivationPolicy`] and owns the loaded modules
//! - **Settings** - [`ConfigStore`] persists global and per-plugin sections
//! - **Orchestration** - [`Orchestrator`] drives one host run from
//!   discovery to unload
//!
//! # Quick Start
//!
//! ```no_run
//! use plinth_core::{MemoryConfigStore, Orchestrator, OrchestratorConfig};
//! use plinth_core::plugins::NativeLoader;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OrchestratorConfig::new(vec!["/usr/lib/plinth".into()]);
//!     let mut host = Orchestrator::new(
//!         config,
//!         Box::new(NativeLoader),
//!         Box::new(MemoryConfigStore::new()),
//!     );
//!
//!     let report = host.startup()?;
//!     println!("{} plugins running", report.running().len());
//!     host.shutdown()?;
//!     Ok(())
//! }
//! ```

pub mod config_store;
pub mod orchestrator;
pub mod plugins;

pub use config_store::{
    ConfigStore, ConfigStoreError, MemoryConfigStore, StoredConfig, TomlConfigStore,
};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, OrchestratorError, Phase, RunReport, ShutdownReport,
    StartupReport,
};
