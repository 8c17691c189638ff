//! PluginContext - a plugin's interface to the host

use crate::error::PluginError;
use crate::types::PluginHandle;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::any::Any;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Type-erased service published by a plugin
pub type SharedService = Arc<dyn Any + Send + Sync>;

// ─── Registry Lookup ─────────────────────────────────────────────────

/// Host-side registry as seen by plugins.
///
/// The host hands every plugin a handle implementing this trait during
/// initialization. Lookups may be made at any time, including from plugin
/// threads while the host is changing lifecycle states.
pub trait PluginLookup: Send + Sync {
    /// Find a plugin by its unique name
    fn by_name(&self, name: &str) -> Option<PluginHandle>;

    /// All plugins advertising `tag`, in discovery order
    fn by_capability(&self, tag: &str) -> Vec<PluginHandle>;

    /// Fetch a service published by `provider`
    fn service(&self, provider: &str, service: &str) -> Option<SharedService>;

    /// Publish a service on behalf of `provider`
    fn publish_service(
        &self,
        provider: &str,
        service: &str,
        value: SharedService,
    ) -> Result<(), PluginError>;

    /// Advertise an additional capability tag on behalf of `plugin`
    fn add_capability(&self, plugin: &str, tag: &str);
}

/// Plugin's interface to the host.
///
/// Passed to [`Plugin::initialize`](crate::Plugin::initialize). It is cheap
/// to clone; plugins that need registry access after initialization keep a
/// clone.
#[derive(Clone)]
pub struct PluginContext {
    plugin_name: String,
    plugin_dir: PathBuf,
    lookup: Arc<dyn PluginLookup>,
    defines: Arc<BTreeMap<String, String>>,
}

impl PluginContext {
    /// Create a new plugin context
    pub fn new(plugin_name: String, plugin_dir: PathBuf, lookup: Arc<dyn PluginLookup>) -> Self {
        Self {
            plugin_name,
            plugin_dir,
            lookup,
            defines: Arc::new(BTreeMap::new()),
        }
    }

    /// Builder: command-line variables defined by the user
    pub fn with_defines(mut self, defines: Arc<BTreeMap<String, String>>) -> Self {
        self.defines = defines;
        self
    }

    /// Get the plugin's name
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Get the directory the plugin was discovered in
    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Value of a `--define key:value` command-line variable
    pub fn define(&self, key: &str) -> Option<&str> {
        self.defines.get(key).map(String::as_str)
    }

    pub fn defines(&self) -> &BTreeMap<String, String> {
        &self.defines
    }

    // ─── Registry ────────────────────────────────────────────────────

    /// Shared registry handle, for plugins that look things up later
    pub fn lookup(&self) -> Arc<dyn PluginLookup> {
        Arc::clone(&self.lookup)
    }

    pub fn plugin(&self, name: &str) -> Option<PluginHandle> {
        self.lookup.by_name(name)
    }

    pub fn plugins_with_capability(&self, tag: &str) -> Vec<PluginHandle> {
        self.lookup.by_capability(tag)
    }

    /// Advertise a capability tag that was not declared in the manifest
    pub fn register_capability(&self, tag: &str) {
        self.lookup.add_capability(&self.plugin_name, tag);
    }

    /// Publish a service other plugins can fetch with [`Self::service`].
    ///
    /// For trait objects publish an `Arc<Arc<dyn Trait>>` and fetch with
    /// `T = Arc<dyn Trait>`.
    pub fn provide_service<T: Send + Sync + 'static>(
        &self,
        name: &str,
        service: Arc<T>,
    ) -> Result<(), PluginError> {
        self.lookup
            .publish_service(&self.plugin_name, name, service as SharedService)
    }

    /// Fetch a service published by `provider`.
    ///
    /// Returns `None` when nothing is published under that name or when it
    /// has a different type.
    pub fn service<T: Send + Sync + 'static>(&self, provider: &str, name: &str) -> Option<Arc<T>> {
        self.lookup
            .service(provider, name)
            .and_then(|service| service.downcast::<T>().ok())
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Log an info message (automatically prefixed with plugin name)
    pub fn log_info(&self, message: &str) {
        tracing::info!(plugin = %self.plugin_name, "{}", message);
    }

    /// Log a warning message
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(plugin = %self.plugin_name, "{}", message);
    }

    /// Log an error message
    pub fn log_error(&self, message: &str) {
        tracing::error!(plugin = %self.plugin_name, "{}", message);
    }

    /// Log a debug message
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(plugin = %self.plugin_name, "{}", message);
    }
}

// ─── Settings ────────────────────────────────────────────────────────

/// One plugin's persisted settings: an ordered key/value table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSection {
    values: BTreeMap<String, toml::Value>,
}

impl ConfigSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value, converted to `T`.
    ///
    /// Missing keys and values of a different type both give `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(|v| v.clone().try_into().ok())
    }

    /// Set a value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), PluginError> {
        let toml_value =
            toml::Value::try_from(value).map_err(|e| PluginError::Serialization(e.to_string()))?;
        self.values.insert(key.to_string(), toml_value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<toml::Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Lookup backed by a fixed list of handles and a service map
    #[derive(Default)]
    struct FixedLookup {
        handles: Vec<PluginHandle>,
        services: Mutex<BTreeMap<(String, String), SharedService>>,
        added: Mutex<Vec<(String, String)>>,
    }

    impl PluginLookup for FixedLookup {
        fn by_name(&self, name: &str) -> Option<PluginHandle> {
            self.handles.iter().find(|h| h.name == name).cloned()
        }

        fn by_capability(&self, tag: &str) -> Vec<PluginHandle> {
            self.handles
                .iter()
                .filter(|h| h.has_capability(tag))
                .cloned()
                .collect()
        }

        fn service(&self, provider: &str, service: &str) -> Option<SharedService> {
            self.services
                .lock()
                .unwrap()
                .get(&(provider.to_string(), service.to_string()))
                .cloned()
        }

        fn publish_service(
            &self,
            provider: &str,
            service: &str,
            value: SharedService,
        ) -> Result<(), PluginError> {
            let mut services = self.services.lock().unwrap();
            let key = (provider.to_string(), service.to_string());
            if services.contains_key(&key) {
                return Err(PluginError::DuplicateService(format!("{provider}/{service}")));
            }
            services.insert(key, value);
            Ok(())
        }

        fn add_capability(&self, plugin: &str, tag: &str) {
            self.added
                .lock()
                .unwrap()
                .push((plugin.to_string(), tag.to_string()));
        }
    }

    fn context_with(lookup: Arc<FixedLookup>) -> PluginContext {
        PluginContext::new("test".to_string(), PathBuf::from("/tmp/test"), lookup)
    }

    #[test]
    fn test_context_creation() {
        let ctx = context_with(Arc::new(FixedLookup::default()));
        assert_eq!(ctx.plugin_name(), "test");
        assert_eq!(ctx.plugin_dir(), Path::new("/tmp/test"));
        assert!(ctx.defines().is_empty());
    }

    #[test]
    fn test_defines() {
        let defines = BTreeMap::from([("mode".to_string(), "live".to_string())]);
        let ctx = context_with(Arc::new(FixedLookup::default())).with_defines(Arc::new(defines));
        assert_eq!(ctx.define("mode"), Some("live"));
        assert_eq!(ctx.define("missing"), None);
    }

    #[test]
    fn test_service_roundtrip_and_type_mismatch() {
        let lookup = Arc::new(FixedLookup::default());
        let ctx = context_with(lookup);

        ctx.provide_service("counter", Arc::new(41u32)).unwrap();

        let fetched: Option<Arc<u32>> = ctx.service("test", "counter");
        assert_eq!(fetched.as_deref(), Some(&41));

        let wrong_type: Option<Arc<String>> = ctx.service("test", "counter");
        assert!(wrong_type.is_none());
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let ctx = context_with(Arc::new(FixedLookup::default()));
        ctx.provide_service("clock", Arc::new(1u8)).unwrap();
        let err = ctx.provide_service("clock", Arc::new(2u8)).unwrap_err();
        assert!(matches!(err, PluginError::DuplicateService(_)));
    }

    #[test]
    fn test_register_capability_uses_plugin_name() {
        let lookup = Arc::new(FixedLookup::default());
        let ctx = context_with(Arc::clone(&lookup));
        ctx.register_capability("midi");
        assert_eq!(
            *lookup.added.lock().unwrap(),
            vec![("test".to_string(), "midi".to_string())]
        );
    }

    #[test]
    fn test_config_section_get_set() {
        let mut section = ConfigSection::new();

        section.set("string_key", "hello").unwrap();
        section.set("int_key", 42i64).unwrap();
        section.set("bool_key", true).unwrap();

        assert_eq!(section.get::<String>("string_key"), Some("hello".to_string()));
        assert_eq!(section.get::<i64>("int_key"), Some(42));
        assert_eq!(section.get::<bool>("bool_key"), Some(true));
        assert_eq!(section.get::<String>("missing"), None);
        assert_eq!(section.get::<i64>("string_key"), None);
        assert_eq!(section.len(), 3);
    }

    #[test]
    fn test_config_section_remove() {
        let mut section = ConfigSection::new();
        section.set("a", 1i64).unwrap();
        assert!(section.contains("a"));
        assert!(section.remove("a").is_some());
        assert!(section.is_empty());
    }

    #[test]
    fn test_config_section_is_transparent_table() {
        let mut section = ConfigSection::new();
        section.set("gain", 0.5f64).unwrap();
        let toml_str = toml::to_string(&section).unwrap();
        assert_eq!(toml_str.trim(), "gain = 0.5");
    }
}
