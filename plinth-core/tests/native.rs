//! Host runs over the `hello-plugin` demo, loaded as a real shared library
//!
//! The demo is built once per test binary into Cargo's scratch directory
//! for integration tests, then installed into a temp plugin directory.

use std::collections::BTreeMap;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use plinth_core::plugins::NativeLoader;
use plinth_core::{MemoryConfigStore, Orchestrator, OrchestratorConfig};
use plinth_plugin_api::{LifecycleState, PluginLookup};
use tempfile::TempDir;

fn demo_library() -> &'static Path {
    static LIBRARY: OnceLock<PathBuf> = OnceLock::new();
    LIBRARY.get_or_init(|| {
        let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("..");
        let target_dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("hello-plugin");

        let status = Command::new(env!("CARGO"))
            .arg("build")
            .arg("--manifest-path")
            .arg(workspace.join("Cargo.toml"))
            .args(["-p", "hello-plugin"])
            .arg("--target-dir")
            .arg(&target_dir)
            .status()
            .expect("failed to run cargo");
        assert!(status.success(), "building hello-plugin failed");

        let library = target_dir
            .join("debug")
            .join(format!("{DLL_PREFIX}hello_plugin{DLL_SUFFIX}"));
        assert!(library.is_file(), "missing {}", library.display());
        library
    })
}

/// Install the demo as `<root>/plugins/hello/hello.<ext>`
fn install_demo(root: &Path) -> PathBuf {
    let plugins = root.join("plugins");
    let container = plugins.join("hello");
    std::fs::create_dir_all(&container).unwrap();
    std::fs::copy(demo_library(), container.join(format!("hello{DLL_SUFFIX}"))).unwrap();
    plugins
}

fn native_host(plugins: &Path, store: &MemoryConfigStore) -> Orchestrator {
    let defines = BTreeMap::from([("greeting".to_string(), "howdy".to_string())]);
    Orchestrator::new(
        OrchestratorConfig::new(vec![plugins.to_path_buf()]).with_defines(defines),
        Box::new(NativeLoader),
        Box::new(store.clone()),
    )
}

#[test]
fn native_plugin_runs_and_unloads_cleanly() {
    let root = TempDir::new().unwrap();
    let plugins = install_demo(root.path());
    let store = MemoryConfigStore::new();
    let mut host = native_host(&plugins, &store);

    let report = host.startup().unwrap();
    assert_eq!(report.running(), ["hello"]);

    let hello = host.registry().by_name("hello").unwrap();
    assert_eq!(hello.version, "0.1.0");
    assert!(hello.capabilities.contains(&"greeter".to_string()));

    let handle = host.registry().handle();
    assert!(handle.service("hello", "greeting").is_some());

    let shutdown = host.shutdown().unwrap();
    assert_eq!(shutdown.unloaded, vec!["hello"]);
    assert!(handle.service("hello", "greeting").is_none());
    assert_eq!(handle.state("hello"), Some(LifecycleState::Unloaded));

    let saved = store.saved().unwrap();
    assert_eq!(saved.plugin("hello").get::<i64>("runs"), Some(1));
}

#[test]
fn native_plugin_reloads_with_saved_settings() {
    let root = TempDir::new().unwrap();
    let plugins = install_demo(root.path());
    let store = MemoryConfigStore::new();

    for _ in 0..2 {
        let mut host = native_host(&plugins, &store);
        host.startup().unwrap();
        host.shutdown().unwrap();
    }

    let saved = store.saved().unwrap();
    assert_eq!(saved.plugin("hello").get::<i64>("runs"), Some(2));
}
