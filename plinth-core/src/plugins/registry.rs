//! Plugin registry - the table of discovered plugins and their modules
//!
//! Descriptors live in a table shared (behind a lock) with the plugins
//! themselves, so they can look each other up. Loaded plugin instances are
//! kept outside the lock; no lock is held while plugin code runs.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use plinth_plugin_api::{
    API_VERSION, ConfigSection, LifecycleState, Plugin, PluginContext, PluginError, PluginHandle,
    PluginLookup, SharedService, Verdict,
};

use super::activation::ActivationPolicy;
use super::discovery::{self, Candidate};
use super::error::{DiscoveryWarning, InitError, LoadError, RegistryError};
use super::loader::{LoadedModule, ModuleLoader};

/// The registry's record of one discovered plugin
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    /// Unique plugin name
    pub name: String,
    /// Shared library holding the plugin
    pub library: PathBuf,
    /// Directory owning the plugin
    pub dir: PathBuf,
    /// Version from the manifest, once loaded
    pub version: Option<String>,
    /// Declared capability tags plus those registered at runtime
    pub capabilities: Vec<String>,
    pub state: LifecycleState,
    /// Most recent failure, if any
    pub last_error: Option<String>,
}

impl PluginDescriptor {
    pub fn discovered(name: impl Into<String>, library: PathBuf, dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            library,
            dir,
            version: None,
            capabilities: Vec::new(),
            state: LifecycleState::Discovered,
            last_error: None,
        }
    }

    pub fn handle(&self) -> PluginHandle {
        PluginHandle {
            name: self.name.clone(),
            version: self.version.clone().unwrap_or_default(),
            path: self.library.clone(),
            capabilities: self.capabilities.clone(),
            state: self.state,
        }
    }

    fn add_capability(&mut self, tag: &str) {
        if !self.capabilities.iter().any(|c| c == tag) {
            self.capabilities.push(tag.to_string());
        }
    }
}

impl From<Candidate> for PluginDescriptor {
    fn from(candidate: Candidate) -> Self {
        Self::discovered(candidate.name, candidate.library, candidate.dir)
    }
}

/// Per-plugin outcome of one lifecycle phase
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseOutcome {
    /// Plugins that passed this phase, in processing order
    pub succeeded: Vec<String>,
    /// Plugins that failed, with the reason
    pub failed: Vec<(String, String)>,
    /// Plugins deliberately left out (rejected by policy)
    pub skipped: Vec<String>,
}

impl PhaseOutcome {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty() && self.skipped.is_empty()
    }

    fn fail(&mut self, name: &str, error: &impl std::fmt::Display) {
        self.failed.push((name.to_string(), error.to_string()));
    }
}

/// Result of a discovery pass
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Newly registered plugins, in discovery order
    pub discovered: Vec<String>,
    /// Containers ignored because an earlier one had the same name
    pub shadowed: Vec<PathBuf>,
    pub warnings: Vec<DiscoveryWarning>,
}

#[derive(Default)]
struct RegistryTable {
    /// Discovery order
    descriptors: Vec<PluginDescriptor>,
    services: HashMap<(String, String), SharedService>,
}

impl RegistryTable {
    fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut PluginDescriptor> {
        self.descriptors.iter_mut().find(|d| d.name == name)
    }

    fn insert(&mut self, descriptor: PluginDescriptor) -> Result<(), RegistryError> {
        if self.get(&descriptor.name).is_some() {
            return Err(RegistryError::DuplicateName {
                name: descriptor.name,
            });
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    fn transition(&mut self, name: &str, to: LifecycleState) -> Result<(), RegistryError> {
        let descriptor = self
            .get_mut(name)
            .ok_or_else(|| RegistryError::UnknownPlugin {
                name: name.to_string(),
            })?;

        if !descriptor.state.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition {
                name: name.to_string(),
                from: descriptor.state,
                to,
            });
        }

        tracing::trace!(plugin = %name, from = %descriptor.state, to = %to, "Lifecycle transition");
        descriptor.state = to;
        Ok(())
    }

    fn withdraw_services(&mut self, provider: &str) {
        self.services.retain(|(p, _), _| p != provider);
    }
}

/// Shared, thread-safe view of the registry table.
///
/// Handed to plugins as their [`PluginLookup`]. Writes go through short
/// critical sections.
#[derive(Clone, Default)]
pub struct RegistryHandle {
    table: Arc<RwLock<RegistryTable>>,
}

impl RegistryHandle {
    fn read(&self) -> RwLockReadGuard<'_, RegistryTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.read().get(name).cloned()
    }

    pub fn state(&self, name: &str) -> Option<LifecycleState> {
        self.read().get(name).map(|d| d.state)
    }
}

impl PluginLookup for RegistryHandle {
    fn by_name(&self, name: &str) -> Option<PluginHandle> {
        self.read().get(name).map(PluginDescriptor::handle)
    }

    fn by_capability(&self, tag: &str) -> Vec<PluginHandle> {
        self.read()
            .descriptors
            .iter()
            .filter(|d| d.capabilities.iter().any(|c| c == tag))
            .map(PluginDescriptor::handle)
            .collect()
    }

    fn service(&self, provider: &str, service: &str) -> Option<SharedService> {
        self.read()
            .services
            .get(&(provider.to_string(), service.to_string()))
            .cloned()
    }

    fn publish_service(
        &self,
        provider: &str,
        service: &str,
        value: SharedService,
    ) -> Result<(), PluginError> {
        let mut table = self.write();
        let key = (provider.to_string(), service.to_string());
        if table.services.contains_key(&key) {
            return Err(PluginError::DuplicateService(format!("{provider}/{service}")));
        }
        tracing::debug!(plugin = %provider, service = %service, "Service published");
        table.services.insert(key, value);
        Ok(())
    }

    fn add_capability(&self, plugin: &str, tag: &str) {
        if let Some(descriptor) = self.write().get_mut(plugin) {
            descriptor.add_capability(tag);
        }
    }
}

/// A plugin instance with its module and teardown bookkeeping
struct LoadedPlugin {
    module: LoadedModule,
    /// Initialization succeeded
    initialized: bool,
    shut_down: bool,
}

impl LoadedPlugin {
    fn plugin(&mut self) -> &mut dyn Plugin {
        self.module.instance.as_mut()
    }

    fn shutdown(&mut self, name: &str) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let instance = self.module.instance.as_mut();
        match std::panic::catch_unwind(AssertUnwindSafe(|| instance.shutdown())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(plugin = %name, error = %e, "Plugin shutdown returned error");
            }
            Err(_) => {
                tracing::error!(plugin = %name, "Plugin panicked in shutdown");
            }
        }
    }
}

/// The registry: discovered descriptors, loaded modules and their order.
pub struct PluginRegistry {
    handle: RegistryHandle,
    loader: Box<dyn ModuleLoader>,
    modules: HashMap<String, LoadedPlugin>,
    /// Order in which initialization was attempted
    init_order: Vec<String>,
    /// Every plugin loaded in this run, including unloaded ones
    ever_loaded: HashSet<String>,
}

impl PluginRegistry {
    pub fn new(loader: Box<dyn ModuleLoader>) -> Self {
        Self {
            handle: RegistryHandle::default(),
            loader,
            modules: HashMap::new(),
            init_order: Vec::new(),
            ever_loaded: HashSet::new(),
        }
    }

    /// Shared handle for lookups from other components and plugins
    pub fn handle(&self) -> RegistryHandle {
        self.handle.clone()
    }

    // ─── Discovery & Filtering ───────────────────────────────────────

    /// Scan `dirs` in order and register every new plugin container.
    ///
    /// Names already in the registry are ignored, so rescanning never
    /// duplicates entries. Within one scan the first container with a given
    /// name wins.
    pub fn discover(&mut self, dirs: &[PathBuf]) -> Result<DiscoveryReport, RegistryError> {
        let mut report = DiscoveryReport::default();

        for dir in dirs {
            let Some(scan) = discovery::scan_directory(dir) else {
                continue;
            };

            for warning in scan.warnings {
                tracing::warn!(dir = %dir.display(), "{}", warning);
                report.warnings.push(warning);
            }

            let mut table = self.handle.write();
            for candidate in scan.candidates {
                if let Some(existing) = table.get(&candidate.name) {
                    tracing::debug!(
                        plugin = %candidate.name,
                        path = %candidate.library.display(),
                        kept = %existing.library.display(),
                        "Plugin already discovered, skipping"
                    );
                    report.shadowed.push(candidate.library);
                    continue;
                }

                tracing::debug!(
                    plugin = %candidate.name,
                    path = %candidate.library.display(),
                    "Plugin discovered"
                );
                report.discovered.push(candidate.name.clone());
                table.insert(candidate.into())?;
            }
        }

        Ok(report)
    }

    /// Apply the activation policy to every plugin still in `Discovered`
    pub fn filter(&mut self, policy: &ActivationPolicy) -> Result<PhaseOutcome, RegistryError> {
        let mut outcome = PhaseOutcome::default();
        let mut table = self.handle.write();

        let pending: Vec<String> = table
            .descriptors
            .iter()
            .filter(|d| d.state == LifecycleState::Discovered)
            .map(|d| d.name.clone())
            .collect();

        for name in pending {
            let verdict = policy.verdict(&name);
            table.transition(&name, LifecycleState::Filtered(verdict))?;
            match verdict {
                Verdict::Accepted => outcome.succeeded.push(name),
                Verdict::Rejected => {
                    tracing::info!(plugin = %name, "Plugin disabled, skipping");
                    outcome.skipped.push(name);
                }
            }
        }

        Ok(outcome)
    }

    // ─── Loading ─────────────────────────────────────────────────────

    /// Load one accepted plugin.
    ///
    /// On failure the plugin is marked `Unloaded` and takes no further part
    /// in this run.
    pub fn load(&mut self, name: &str) -> Result<PluginHandle, LoadError> {
        let descriptor =
            self.handle
                .descriptor(name)
                .ok_or_else(|| RegistryError::UnknownPlugin {
                    name: name.to_string(),
                })?;

        if self.ever_loaded.contains(name) {
            return Err(LoadError::AlreadyLoaded {
                name: name.to_string(),
            });
        }
        if descriptor.state != LifecycleState::Filtered(Verdict::Accepted) {
            return Err(LoadError::NotAccepted {
                name: name.to_string(),
                state: descriptor.state,
            });
        }

        match self.load_module(&descriptor) {
            Ok(module) => {
                let manifest = module.instance.manifest();
                let mut table = self.handle.write();
                table.transition(name, LifecycleState::Loaded)?;
                let entry = table
                    .get_mut(name)
                    .ok_or_else(|| RegistryError::UnknownPlugin {
                        name: name.to_string(),
                    })?;
                entry.version = Some(manifest.version.clone());
                for tag in &manifest.capabilities {
                    entry.add_capability(tag);
                }
                let handle = entry.handle();
                drop(table);

                tracing::info!(
                    plugin = %name,
                    version = %manifest.version,
                    "Plugin loaded"
                );
                self.ever_loaded.insert(name.to_string());
                self.modules.insert(
                    name.to_string(),
                    LoadedPlugin {
                        module,
                        initialized: false,
                        shut_down: false,
                    },
                );
                Ok(handle)
            }
            Err(e) => {
                tracing::error!(plugin = %name, error = %e, "Failed to load plugin");
                let mut table = self.handle.write();
                table.transition(name, LifecycleState::Unloaded)?;
                if let Some(entry) = table.get_mut(name) {
                    entry.last_error = Some(e.to_string());
                }
                Err(e)
            }
        }
    }

    /// Load the module and check its manifest before trusting it
    fn load_module(&self, descriptor: &PluginDescriptor) -> Result<LoadedModule, LoadError> {
        let module = self.loader.load(descriptor)?;
        let manifest = module.instance.manifest();

        if manifest.api_version != API_VERSION {
            return Err(LoadError::IncompatibleVersion {
                expected: API_VERSION,
                found: manifest.api_version,
            });
        }
        if manifest.name != descriptor.name {
            return Err(LoadError::NameMismatch {
                container: descriptor.name.clone(),
                reported: manifest.name,
            });
        }

        Ok(module)
    }

    /// Load every accepted plugin in discovery order
    pub fn load_all(&mut self) -> Result<PhaseOutcome, RegistryError> {
        let mut outcome = PhaseOutcome::default();

        for name in self.names_in_state(LifecycleState::Filtered(Verdict::Accepted)) {
            match self.load(&name) {
                Ok(_) => outcome.succeeded.push(name),
                Err(LoadError::Registry(e)) => return Err(e),
                Err(e) => outcome.fail(&name, &e),
            }
        }

        Ok(outcome)
    }

    // ─── Initialization & Running ────────────────────────────────────

    /// Initialize one loaded plugin.
    ///
    /// A failing or panicking plugin is marked `Stopped` and the services
    /// it managed to publish are withdrawn.
    pub fn initialize(
        &mut self,
        name: &str,
        defines: &Arc<BTreeMap<String, String>>,
    ) -> Result<(), InitError> {
        let descriptor = self.expect_state(name, LifecycleState::Loaded)?;
        let lookup: Arc<dyn PluginLookup> = Arc::new(self.handle.clone());
        let mut ctx = PluginContext::new(name.to_string(), descriptor.dir, lookup)
            .with_defines(Arc::clone(defines));

        let plugin = self
            .modules
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotLoaded {
                name: name.to_string(),
            })?;
        self.init_order.push(name.to_string());

        let instance = plugin.plugin();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| instance.initialize(&mut ctx)));

        match flatten(name, "initialize", result) {
            Ok(()) => {
                plugin.initialized = true;
                self.handle
                    .write()
                    .transition(name, LifecycleState::Initialized)?;
                tracing::debug!(plugin = %name, "Plugin initialized");
                Ok(())
            }
            Err(e) => {
                tracing::error!(plugin = %name, error = %e, "Plugin initialization failed");
                self.mark_stopped(name, &e)?;
                Err(e)
            }
        }
    }

    /// Initialize every loaded plugin in discovery order
    pub fn initialize_all(
        &mut self,
        defines: &Arc<BTreeMap<String, String>>,
    ) -> Result<PhaseOutcome, RegistryError> {
        let mut outcome = PhaseOutcome::default();

        for name in self.names_in_state(LifecycleState::Loaded) {
            match self.initialize(&name, defines) {
                Ok(()) => outcome.succeeded.push(name),
                Err(InitError::Registry(e)) => return Err(e),
                Err(e) => outcome.fail(&name, &e),
            }
        }

        Ok(outcome)
    }

    /// Hand persisted settings to an initialized plugin
    pub fn apply_config(&mut self, name: &str, section: &ConfigSection) -> Result<(), InitError> {
        self.expect_state(name, LifecycleState::Initialized)?;
        let plugin = self.module_mut(name)?.plugin();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| plugin.load_config(section)));

        if let Err(e) = flatten(name, "load its configuration", result.map(Ok)) {
            tracing::error!(plugin = %name, error = %e, "Plugin failed to load its configuration");
            self.mark_stopped(name, &e)?;
            return Err(e);
        }
        Ok(())
    }

    /// Move an initialized plugin to `Running`
    pub fn start(&mut self, name: &str) -> Result<(), InitError> {
        self.expect_state(name, LifecycleState::Initialized)?;
        let plugin = self.module_mut(name)?.plugin();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| plugin.start()));

        match flatten(name, "start", result) {
            Ok(()) => {
                self.handle.write().transition(name, LifecycleState::Running)?;
                tracing::info!(plugin = %name, "Plugin running");
                Ok(())
            }
            Err(e) => {
                tracing::error!(plugin = %name, error = %e, "Plugin failed to start");
                self.mark_stopped(name, &e)?;
                Err(e)
            }
        }
    }

    /// Tell a running plugin to stop its activity
    pub fn stop(&mut self, name: &str) -> Result<(), RegistryError> {
        self.expect_state(name, LifecycleState::Running)?;
        let plugin = self.module_mut(name)?.plugin();

        if std::panic::catch_unwind(AssertUnwindSafe(|| plugin.stop())).is_err() {
            tracing::error!(plugin = %name, "Plugin panicked in stop");
        }

        self.handle.write().transition(name, LifecycleState::Stopped)?;
        tracing::debug!(plugin = %name, "Plugin stopped");
        Ok(())
    }

    /// Stop every running plugin, last initialized first
    pub fn stop_all(&mut self) -> Result<Vec<String>, RegistryError> {
        let running: Vec<String> = self
            .init_order
            .iter()
            .rev()
            .filter(|name| self.handle.state(name) == Some(LifecycleState::Running))
            .cloned()
            .collect();

        for name in &running {
            self.stop(name)?;
        }

        Ok(running)
    }

    /// Let a plugin that initialized successfully write its settings.
    ///
    /// Returns `false` for plugins that never initialized; they have
    /// nothing meaningful to save.
    pub fn save_config(&self, name: &str, section: &mut ConfigSection) -> bool {
        let Some(plugin) = self.modules.get(name).filter(|p| p.initialized) else {
            return false;
        };

        let instance = plugin.module.instance.as_ref();
        match std::panic::catch_unwind(AssertUnwindSafe(|| instance.save_config(section))) {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(plugin = %name, "Plugin panicked while saving configuration");
                false
            }
        }
    }

    // ─── Teardown ────────────────────────────────────────────────────

    /// Shut down and release every loaded module.
    ///
    /// Runs in reverse initialization order so later plugins, which may
    /// hold references into earlier ones, go first. Modules that were loaded
    /// but never initialized follow, in reverse discovery order.
    pub fn unload_all(&mut self) -> Result<Vec<String>, RegistryError> {
        let mut order: Vec<String> = self.init_order.iter().rev().cloned().collect();
        let never_initialized: Vec<String> = self
            .handle
            .read()
            .descriptors
            .iter()
            .rev()
            .filter(|d| self.modules.contains_key(&d.name) && !self.init_order.contains(&d.name))
            .map(|d| d.name.clone())
            .collect();
        order.extend(never_initialized);
        order.retain(|name| self.modules.contains_key(name));

        for name in &order {
            if let Some(mut plugin) = self.modules.remove(name) {
                plugin.shutdown(name);
                // Services may run drop code from the plugin's library, which
                // must still be mapped when they go
                self.handle.write().withdraw_services(name);
                drop(plugin);
            }

            self.handle
                .write()
                .transition(name, LifecycleState::Unloaded)?;
            tracing::debug!(plugin = %name, "Plugin unloaded");
        }

        Ok(order)
    }

    // ─── Lookups ─────────────────────────────────────────────────────

    pub fn by_name(&self, name: &str) -> Option<PluginHandle> {
        self.handle.by_name(name)
    }

    pub fn by_capability(&self, tag: &str) -> Vec<PluginHandle> {
        self.handle.by_capability(tag)
    }

    /// Snapshot of every descriptor, in discovery order
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.handle.read().descriptors.clone()
    }

    /// Plugins currently running, in discovery order
    pub fn active(&self) -> Vec<PluginHandle> {
        self.handle
            .read()
            .descriptors
            .iter()
            .filter(|d| d.state.is_running())
            .map(PluginDescriptor::handle)
            .collect()
    }

    /// Order in which plugins were (or were attempted to be) initialized
    pub fn initialization_order(&self) -> &[String] {
        &self.init_order
    }

    /// Plugins that initialized successfully, in initialization order
    pub fn initialized(&self) -> Vec<String> {
        self.init_order
            .iter()
            .filter(|name| self.modules.get(*name).is_some_and(|p| p.initialized))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handle.read().descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn loaded_count(&self) -> usize {
        self.modules.len()
    }

    // ─── Helpers ─────────────────────────────────────────────────────

    fn names_in_state(&self, state: LifecycleState) -> Vec<String> {
        self.handle
            .read()
            .descriptors
            .iter()
            .filter(|d| d.state == state)
            .map(|d| d.name.clone())
            .collect()
    }

    fn expect_state(
        &self,
        name: &str,
        expected: LifecycleState,
    ) -> Result<PluginDescriptor, RegistryError> {
        let descriptor = self
            .handle
            .descriptor(name)
            .ok_or_else(|| RegistryError::UnknownPlugin {
                name: name.to_string(),
            })?;

        if descriptor.state != expected {
            return Err(RegistryError::InvalidTransition {
                name: name.to_string(),
                from: descriptor.state,
                to: next_state(expected),
            });
        }
        Ok(descriptor)
    }

    fn module_mut(&mut self, name: &str) -> Result<&mut LoadedPlugin, RegistryError> {
        self.modules
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotLoaded {
                name: name.to_string(),
            })
    }

    fn mark_stopped(&mut self, name: &str, error: &InitError) -> Result<(), RegistryError> {
        let mut table = self.handle.write();
        table.withdraw_services(name);
        table.transition(name, LifecycleState::Stopped)?;
        if let Some(entry) = table.get_mut(name) {
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

/// The state an operation expecting `state` would move to
fn next_state(state: LifecycleState) -> LifecycleState {
    match state {
        LifecycleState::Discovered => LifecycleState::Filtered(Verdict::Accepted),
        LifecycleState::Filtered(_) => LifecycleState::Loaded,
        LifecycleState::Loaded => LifecycleState::Initialized,
        LifecycleState::Initialized => LifecycleState::Running,
        LifecycleState::Running => LifecycleState::Stopped,
        LifecycleState::Stopped | LifecycleState::Unloaded => LifecycleState::Unloaded,
    }
}

fn flatten(
    name: &str,
    stage: &'static str,
    result: std::thread::Result<Result<(), PluginError>>,
) -> Result<(), InitError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(InitError::Failed {
            name: name.to_string(),
            stage,
            source,
        }),
        Err(_) => Err(InitError::Panicked {
            name: name.to_string(),
            stage,
        }),
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.len())
            .field("loaded", &self.modules.len())
            .field("init_order", &self.init_order)
            .finish()
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        if !self.modules.is_empty()
            && let Err(e) = self.unload_all()
        {
            tracing::error!(error = %e, "Failed to unload plugins on drop");
        }
    }
}
