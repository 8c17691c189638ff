//! Lifecycle orchestration - drives every plugin through one host run
//!
//! ```text
//! Idle → Discovering → Filtering → Loading → Initializing → ConfigLoaded
//!      → Running → Stopping → ConfigSaved → Unloaded
//! ```
//!
//! [`Orchestrator::startup`] runs everything up to `Running`,
//! [`Orchestrator::shutdown`] everything after it. Failures of individual
//! plugins are logged and reported but never abort the sequence.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use plinth_paths::PathResolver;
use plinth_plugin_api::{ConfigSection, LifecycleState, PluginHandle};

use crate::config_store::{ConfigStore, ConfigStoreError, StoredConfig};
use crate::plugins::{
    ActivationOverrides, ActivationPolicy, InitError, ModuleLoader, PhaseOutcome, PluginRegistry,
    RegistryError,
};

/// Keys of the run statistics kept in the global settings section
pub mod stats {
    pub const RUNS_STARTED: &str = "runs_started";
    pub const RUNS_FINISHED: &str = "runs_finished";
    pub const LAST_STARTED: &str = "last_started";
    pub const LAST_FINISHED: &str = "last_finished";
    pub const ACTIVE_PLUGINS: &str = "active_plugins";
}

/// Where the host is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Discovering,
    Filtering,
    Loading,
    Initializing,
    ConfigLoaded,
    Running,
    Stopping,
    ConfigSaved,
    Unloaded,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Discovering => "discovering",
            Self::Filtering => "filtering",
            Self::Loading => "loading",
            Self::Initializing => "initializing",
            Self::ConfigLoaded => "config loaded",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::ConfigSaved => "config saved",
            Self::Unloaded => "unloaded",
        };
        write!(f, "{}", s)
    }
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Operation called out of sequence
    #[error("Cannot do that while {found}; expected to be {expected}")]
    InvalidPhase { expected: Phase, found: Phase },

    /// Registry invariants broken
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Settings store error: {0}")]
    Store(#[from] ConfigStoreError),
}

/// What a host run needs to know up front
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Directories to scan, in priority order
    pub search_dirs: Vec<PathBuf>,
    pub overrides: ActivationOverrides,
    /// `--define` variables handed to every plugin
    pub defines: BTreeMap<String, String>,
}

impl OrchestratorConfig {
    pub fn new(search_dirs: Vec<PathBuf>) -> Self {
        Self {
            search_dirs,
            ..Default::default()
        }
    }

    /// Search directories resolved for an executable in `executable_dir`
    pub fn from_resolver(resolver: &PathResolver, executable_dir: &Path) -> Self {
        Self::new(resolver.resolve(executable_dir))
    }

    pub fn with_overrides(mut self, overrides: ActivationOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_defines(mut self, defines: BTreeMap<String, String>) -> Self {
        self.defines = defines;
        self
    }
}

/// Summary of [`Orchestrator::startup`]
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    /// Plugins found, in discovery order
    pub discovered: Vec<String>,
    /// Accepted and rejected by the activation policy
    pub filtered: PhaseOutcome,
    pub loaded: PhaseOutcome,
    pub initialized: PhaseOutcome,
    /// Plugins that reached `Running`
    pub started: PhaseOutcome,
    /// Discovery warnings, rendered
    pub warnings: Vec<String>,
    /// The store held saved settings. False on a first run and when
    /// malformed settings were replaced by defaults.
    pub settings_loaded: bool,
}

impl StartupReport {
    pub fn running(&self) -> &[String] {
        &self.started.succeeded
    }
}

/// Summary of [`Orchestrator::shutdown`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    /// Plugins told to stop, in stop order
    pub stopped: Vec<String>,
    /// Plugins whose settings were collected
    pub saved: Vec<String>,
    /// The store accepted the settings
    pub settings_saved: bool,
    /// Plugins unloaded, in unload order
    pub unloaded: Vec<String>,
}

/// Summary of [`Orchestrator::run_until`]
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub startup: StartupReport,
    pub shutdown: ShutdownReport,
}

/// Drives the registry and the settings store through one host run
pub struct Orchestrator {
    config: OrchestratorConfig,
    registry: PluginRegistry,
    store: Box<dyn ConfigStore>,
    phase: Phase,
    /// Loaded once in `ConfigLoaded`, written once in `ConfigSaved`
    settings: StoredConfig,
    started_at: Option<DateTime<Utc>>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        loader: Box<dyn ModuleLoader>,
        store: Box<dyn ConfigStore>,
    ) -> Self {
        Self {
            config,
            registry: PluginRegistry::new(loader),
            store,
            phase: Phase::Idle,
            settings: StoredConfig::default(),
            started_at: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Settings as loaded (after startup) or as saved (after shutdown)
    pub fn settings(&self) -> &StoredConfig {
        &self.settings
    }

    /// Plugins currently running
    pub fn active(&self) -> Vec<PluginHandle> {
        self.registry.active()
    }

    /// Bring the host from `Idle` to `Running`
    pub fn startup(&mut self) -> Result<StartupReport, OrchestratorError> {
        self.expect_phase(Phase::Idle)?;
        let mut report = StartupReport::default();

        self.enter(Phase::Discovering);
        let discovery = self.registry.discover(&self.config.search_dirs)?;
        report.discovered = discovery.discovered;
        report.warnings = discovery.warnings.iter().map(ToString::to_string).collect();
        if report.discovered.is_empty() {
            tracing::info!(
                dirs = self.config.search_dirs.len(),
                "No plugins found, running without plugins"
            );
        }

        self.enter(Phase::Filtering);
        let policy = ActivationPolicy::new(self.config.overrides.clone());
        report.filtered = self.registry.filter(&policy)?;

        self.enter(Phase::Loading);
        report.loaded = self.registry.load_all()?;

        self.enter(Phase::Initializing);
        let defines = Arc::new(self.config.defines.clone());
        report.initialized = self.registry.initialize_all(&defines)?;

        self.enter(Phase::ConfigLoaded);
        report.settings_loaded = self.load_settings();
        self.record_start();
        self.distribute_settings()?;

        self.enter(Phase::Running);
        report.started = self.start_initialized()?;

        tracing::info!(
            discovered = report.discovered.len(),
            running = report.started.succeeded.len(),
            failed = report.loaded.failed.len()
                + report.initialized.failed.len()
                + report.started.failed.len(),
            "Host running"
        );
        Ok(report)
    }

    /// Stop, save and unload. Only valid while `Running`.
    pub fn shutdown(&mut self) -> Result<ShutdownReport, OrchestratorError> {
        self.expect_phase(Phase::Running)?;
        let mut report = ShutdownReport::default();

        self.enter(Phase::Stopping);
        report.stopped = self.registry.stop_all()?;

        self.enter(Phase::ConfigSaved);
        let mut active = report.stopped.clone();
        active.reverse();
        let (settings, saved) = self.collect_settings(&active);
        report.saved = saved;
        match self.store.save(&settings) {
            Ok(()) => report.settings_saved = true,
            Err(e) => {
                tracing::error!(store = %self.store.describe(), error = %e, "Failed to save settings");
            }
        }
        self.settings = settings;

        self.enter(Phase::Unloaded);
        report.unloaded = self.registry.unload_all()?;

        tracing::info!(unloaded = report.unloaded.len(), "Host stopped");
        Ok(report)
    }

    /// Start up, wait for `shutdown` to be cancelled, then shut down
    pub async fn run_until(
        &mut self,
        shutdown: CancellationToken,
    ) -> Result<RunReport, OrchestratorError> {
        let startup = self.startup()?;
        shutdown.cancelled().await;
        tracing::info!("Shutdown requested");
        let shutdown = self.shutdown()?;
        Ok(RunReport { startup, shutdown })
    }

    /// Erase the persisted settings. Only valid once the run is over.
    pub fn clear_settings(&mut self) -> Result<(), OrchestratorError> {
        self.expect_phase(Phase::Unloaded)?;
        self.store.clear()?;
        tracing::info!(store = %self.store.describe(), "Settings cleared");
        Ok(())
    }

    // ─── Settings ────────────────────────────────────────────────────

    /// Read the store once. Returns whether it held any saved settings.
    fn load_settings(&mut self) -> bool {
        match self.store.load() {
            Ok(settings) => {
                tracing::debug!(
                    store = %self.store.describe(),
                    sections = settings.plugins.len(),
                    "Settings loaded"
                );
                let found = !settings.is_empty();
                self.settings = settings;
                found
            }
            Err(e) => {
                tracing::warn!(
                    store = %self.store.describe(),
                    error = %e,
                    "Could not read settings, using defaults"
                );
                self.settings = StoredConfig::default();
                false
            }
        }
    }

    fn record_start(&mut self) {
        let now = Utc::now();
        self.started_at = Some(now);

        let global = &mut self.settings.global;
        let runs = global.get::<i64>(stats::RUNS_STARTED).unwrap_or(0) + 1;
        record(global, stats::RUNS_STARTED, runs);
        record(global, stats::LAST_STARTED, now.to_rfc3339());
    }

    fn distribute_settings(&mut self) -> Result<(), OrchestratorError> {
        for name in self.registry.initialized() {
            let section = self.settings.plugin(&name);
            match self.registry.apply_config(&name, &section) {
                Ok(()) => {}
                Err(InitError::Registry(e)) => return Err(e.into()),
                // Already logged and marked stopped
                Err(_) => {}
            }
        }
        Ok(())
    }

    /// Build the settings to save: stored sections of plugins absent this
    /// run are kept, every plugin that initialized replaces its own.
    fn collect_settings(&self, active: &[String]) -> (StoredConfig, Vec<String>) {
        let mut settings = self.settings.clone();
        let mut saved = Vec::new();

        for name in self.registry.initialized() {
            let mut section = ConfigSection::new();
            if !self.registry.save_config(&name, &mut section) {
                continue;
            }
            if section.is_empty() {
                settings.plugins.remove(&name);
            } else {
                settings.plugins.insert(name.clone(), section);
            }
            saved.push(name);
        }

        let global = &mut settings.global;
        let runs = global.get::<i64>(stats::RUNS_FINISHED).unwrap_or(0) + 1;
        record(global, stats::RUNS_FINISHED, runs);
        record(global, stats::LAST_FINISHED, Utc::now().to_rfc3339());
        record(global, stats::ACTIVE_PLUGINS, active.to_vec());
        if let Some(started) = self.started_at {
            tracing::debug!(
                uptime_secs = (Utc::now() - started).num_seconds(),
                "Run statistics recorded"
            );
        }

        (settings, saved)
    }

    // ─── Phases ──────────────────────────────────────────────────────

    fn start_initialized(&mut self) -> Result<PhaseOutcome, OrchestratorError> {
        let mut outcome = PhaseOutcome::default();
        let handle = self.registry.handle();

        for name in self.registry.initialized() {
            if handle.state(&name) != Some(LifecycleState::Initialized) {
                outcome.skipped.push(name);
                continue;
            }
            match self.registry.start(&name) {
                Ok(()) => outcome.succeeded.push(name),
                Err(InitError::Registry(e)) => return Err(e.into()),
                Err(e) => outcome.failed.push((name, e.to_string())),
            }
        }

        Ok(outcome)
    }

    fn expect_phase(&self, expected: Phase) -> Result<(), OrchestratorError> {
        if self.phase != expected {
            return Err(OrchestratorError::InvalidPhase {
                expected,
                found: self.phase,
            });
        }
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = %self.phase, to = %phase, "Entering phase");
        self.phase = phase;
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase)
            .field("registry", &self.registry)
            .field("store", &self.store.describe())
            .finish()
    }
}

fn record<T: Serialize>(section: &mut ConfigSection, key: &str, value: T) {
    if let Err(e) = section.set(key, value) {
        tracing::warn!(key = %key, error = %e, "Could not record run statistic");
    }
}
