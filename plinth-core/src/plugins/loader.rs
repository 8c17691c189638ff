//! Module loaders - turn a discovered descriptor into a plugin instance

use libloading::Library;
use std::collections::HashMap;

use plinth_plugin_api::{API_VERSION, API_VERSION_SYMBOL, CREATE_SYMBOL, Plugin};

use super::error::LoadError;
use super::registry::PluginDescriptor;

/// A plugin instance plus whatever keeps its code mapped.
///
/// Field order matters: the instance is dropped before the library.
pub struct LoadedModule {
    pub(crate) instance: Box<dyn Plugin>,
    library: Option<Library>,
}

impl LoadedModule {
    /// A plugin compiled into the host binary
    pub fn builtin(instance: Box<dyn Plugin>) -> Self {
        Self {
            instance,
            library: None,
        }
    }

    fn native(instance: Box<dyn Plugin>, library: Library) -> Self {
        Self {
            instance,
            library: Some(library),
        }
    }

    pub fn is_native(&self) -> bool {
        self.library.is_some()
    }
}

/// Loads plugin modules. The registry validates the returned manifest.
pub trait ModuleLoader: Send {
    fn load(&self, descriptor: &PluginDescriptor) -> Result<LoadedModule, LoadError>;
}

/// Loads plugins from shared libraries exporting the `export_plugin!`
/// entry points.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    fn load(&self, descriptor: &PluginDescriptor) -> Result<LoadedModule, LoadError> {
        let path = &descriptor.library;
        if !path.is_file() {
            return Err(LoadError::NotFound { path: path.clone() });
        }

        // SAFETY: Loading runs the library's initializers. The library was
        // placed in a plugin directory and is expected to follow the plugin
        // contract.
        let library = unsafe { Library::new(path) }.map_err(|source| LoadError::Open {
            path: path.clone(),
            source,
        })?;

        let instance = {
            // SAFETY: The symbol type matches the signature generated by
            // `export_plugin!`.
            let api_version_fn: libloading::Symbol<extern "C" fn() -> u32> =
                unsafe { library.get(API_VERSION_SYMBOL) }.map_err(|_| {
                    LoadError::SymbolMismatch {
                        path: path.clone(),
                        symbol: symbol_name(API_VERSION_SYMBOL),
                    }
                })?;

            // The version is checked before any other plugin code runs
            let found = api_version_fn();
            if found != API_VERSION {
                return Err(LoadError::IncompatibleVersion {
                    expected: API_VERSION,
                    found,
                });
            }

            // SAFETY: As above; the returned pointer comes from
            // `Box::into_raw` in the plugin.
            let create_fn: libloading::Symbol<extern "C" fn() -> *mut dyn Plugin> =
                unsafe { library.get(CREATE_SYMBOL) }.map_err(|_| LoadError::SymbolMismatch {
                    path: path.clone(),
                    symbol: symbol_name(CREATE_SYMBOL),
                })?;

            let raw = create_fn();
            if raw.is_null() {
                return Err(LoadError::SymbolMismatch {
                    path: path.clone(),
                    symbol: symbol_name(CREATE_SYMBOL),
                });
            }

            unsafe { Box::from_raw(raw) }
        };

        Ok(LoadedModule::native(instance, library))
    }
}

fn symbol_name(symbol: &[u8]) -> String {
    String::from_utf8_lossy(symbol).into_owned()
}

type PluginFactory = Box<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Loader for plugins compiled into the host.
///
/// Discovery still decides which plugins exist; the loader maps container
/// names to factories instead of opening the file.
#[derive(Default)]
pub struct BuiltinLoader {
    factories: HashMap<String, PluginFactory>,
}

impl BuiltinLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a factory for the plugin found as `name`
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }
}

impl ModuleLoader for BuiltinLoader {
    fn load(&self, descriptor: &PluginDescriptor) -> Result<LoadedModule, LoadError> {
        let factory = self
            .factories
            .get(&descriptor.name)
            .ok_or_else(|| LoadError::NotFound {
                path: descriptor.library.clone(),
            })?;
        Ok(LoadedModule::builtin(factory()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_plugin_api::{PluginContext, PluginError, PluginManifest};
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Named;

    impl Plugin for Named {
        fn manifest(&self) -> PluginManifest {
            PluginManifest {
                name: "named".to_string(),
                ..Default::default()
            }
        }

        fn initialize(&mut self, _ctx: &mut PluginContext) -> Result<(), PluginError> {
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn descriptor(name: &str, library: PathBuf) -> PluginDescriptor {
        PluginDescriptor::discovered(name, library, PathBuf::from("/plugins"))
    }

    #[test]
    fn test_native_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let result = NativeLoader.load(&descriptor("ghost", dir.path().join("ghost.so")));
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
    }

    #[test]
    fn test_native_garbage_file_is_open_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("garbage.so");
        std::fs::write(&path, b"definitely not a shared object").unwrap();

        let result = NativeLoader.load(&descriptor("garbage", path));
        assert!(matches!(result, Err(LoadError::Open { .. })));
    }

    /// A shared library the test process already has mapped, e.g. libc
    #[cfg(target_os = "linux")]
    fn mapped_system_library() -> Option<PathBuf> {
        let maps = std::fs::read_to_string("/proc/self/maps").ok()?;
        maps.lines()
            .filter_map(|line| line.split_whitespace().nth(5))
            .map(PathBuf::from)
            .find(|path| {
                let file = path.file_name().and_then(|f| f.to_str()).unwrap_or_default();
                file.starts_with("libc.so") || file.starts_with("libgcc_s.so")
            })
            .filter(|path| path.is_file())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_native_library_without_entry_points_is_symbol_mismatch() {
        // Statically linked test binaries have nothing to borrow
        let Some(library) = mapped_system_library() else {
            return;
        };

        let result = NativeLoader.load(&descriptor("libc", library.clone()));
        match result {
            Err(LoadError::SymbolMismatch { path, symbol }) => {
                assert_eq!(path, library);
                assert_eq!(symbol, "_plinth_plugin_api_version");
            }
            Err(other) => panic!("expected SymbolMismatch, got {other}"),
            Ok(_) => panic!("expected SymbolMismatch, got a module"),
        }
    }

    #[test]
    fn test_builtin_loader_creates_instance() {
        let loader = BuiltinLoader::new().with("named", || Box::new(Named));
        let module = loader
            .load(&descriptor("named", PathBuf::from("/plugins/named.so")))
            .unwrap();
        assert_eq!(module.instance.manifest().name, "named");
        assert!(!module.is_native());
    }

    #[test]
    fn test_builtin_loader_unknown_name() {
        let loader = BuiltinLoader::new();
        let result = loader.load(&descriptor("other", PathBuf::from("/plugins/other.so")));
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
    }
}
