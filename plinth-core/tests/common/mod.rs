//! Shared fixtures for lifecycle scenarios
//!
//! Plugins are linked into the test binary through `BuiltinLoader`; the
//! files placed in the temp directories only drive discovery.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use plinth_core::plugins::{BuiltinLoader, library_extensions};
use plinth_core::{MemoryConfigStore, Orchestrator, OrchestratorConfig};
use plinth_plugin_api::{
    API_VERSION, ConfigSection, Plugin, PluginContext, PluginError, PluginManifest,
};

/// Ordered record of lifecycle calls, e.g. `"init:meter"`
pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn events(journal: &Journal, prefix: &str) -> Vec<String> {
    journal
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
        .collect()
}

/// How a recording plugin should misbehave
#[derive(Clone, Default)]
pub struct Script {
    pub fail_init: bool,
    pub wrong_api_version: bool,
    pub capabilities: Vec<String>,
    /// Publish a `greeting` service during initialize
    pub provide_greeting: bool,
    /// Read the `greeting` service of this provider during initialize
    pub greet_from: Option<String>,
}

pub struct Recording {
    name: String,
    script: Script,
    journal: Journal,
    runs: i64,
}

impl Recording {
    fn log(&self, event: impl AsRef<str>) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:{}", event.as_ref(), self.name));
    }
}

impl Plugin for Recording {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            name: self.name.clone(),
            version: "0.3.0".to_string(),
            api_version: if self.script.wrong_api_version {
                API_VERSION + 7
            } else {
                API_VERSION
            },
            capabilities: self.script.capabilities.clone(),
            ..Default::default()
        }
    }

    fn initialize(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        self.log("init");
        if self.script.fail_init {
            return Err(PluginError::custom("scripted failure"));
        }
        if self.script.provide_greeting {
            ctx.provide_service("greeting", Arc::new(format!("hello from {}", self.name)))?;
        }
        if let Some(provider) = &self.script.greet_from {
            let greeting = ctx
                .service::<String>(provider, "greeting")
                .ok_or_else(|| PluginError::missing_dependency(provider.clone()))?;
            self.log(format!("heard {}", greeting));
        }
        if let Some(value) = ctx.define("tag") {
            self.log(format!("define {}", value));
        }
        Ok(())
    }

    fn load_config(&mut self, section: &ConfigSection) {
        self.runs = section.get("runs").unwrap_or(0);
        self.log("config");
    }

    fn start(&mut self) -> Result<(), PluginError> {
        self.log("start");
        Ok(())
    }

    fn stop(&mut self) {
        self.log("stop");
    }

    fn save_config(&self, section: &mut ConfigSection) {
        self.log("save");
        let _ = section.set("runs", self.runs + 1);
    }

    fn shutdown(&mut self) -> Result<(), PluginError> {
        self.log("shutdown");
        Ok(())
    }
}

/// Temp tree of plugin directories plus the matching builtin factories
pub struct Harness {
    pub root: tempfile::TempDir,
    pub journal: Journal,
    pub store: MemoryConfigStore,
    plugins: Vec<(String, Script)>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            root: tempfile::TempDir::new().unwrap(),
            journal: Journal::default(),
            store: MemoryConfigStore::new(),
            plugins: Vec::new(),
        }
    }

    pub fn dir(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    /// Drop a plugin container for `name` into directory `dir`
    pub fn plugin(self, dir: &str, name: &str) -> Self {
        self.scripted(dir, name, Script::default())
    }

    pub fn scripted(mut self, dir: &str, name: &str, script: Script) -> Self {
        let path = self.dir(dir);
        touch_library(&path, name);
        if !self.plugins.iter().any(|(n, _)| n == name) {
            self.plugins.push((name.to_string(), script));
        }
        self
    }

    pub fn loader(&self) -> BuiltinLoader {
        let mut loader = BuiltinLoader::new();
        for (name, script) in &self.plugins {
            let name = name.clone();
            let script = script.clone();
            let journal = Arc::clone(&self.journal);
            loader.register(name.clone(), move || {
                Box::new(Recording {
                    name: name.clone(),
                    script: script.clone(),
                    journal: Arc::clone(&journal),
                    runs: 0,
                })
            });
        }
        loader
    }

    pub fn orchestrator(&self, config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(
            config,
            Box::new(self.loader()),
            Box::new(self.store.clone()),
        )
    }

    pub fn orchestrator_over(&self, dirs: &[&str]) -> Orchestrator {
        let dirs = dirs.iter().map(|d| self.dir(d)).collect();
        self.orchestrator(OrchestratorConfig::new(dirs))
    }

    pub fn clear_journal(&self) {
        self.journal.lock().unwrap().clear();
    }
}

pub fn touch_library(dir: &Path, name: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(format!("{name}.{}", library_extensions()[0])), b"").unwrap();
}
