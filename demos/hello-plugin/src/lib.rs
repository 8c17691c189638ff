//! Hello Plugin - A simple example plugin for plinth
//!
//! This plugin demonstrates:
//! - Basic plugin structure with the `export_plugin!` macro
//! - Reading `--define` variables and persisted settings
//! - Publishing a service for plugins initialized after it
//!
//! ## Building
//!
//! ```bash
//! cargo build --release -p hello-plugin
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p plugins/hello
//! cp target/release/libhello_plugin.so plugins/hello/hello.so
//! plinth --pp plugins -d greeting:howdy
//! ```

use std::sync::Arc;

use plinth_plugin_api::{
    ConfigSection, Plugin, PluginContext, PluginError, PluginManifest, export_plugin,
};

/// Greets on start and counts how often it has run.
#[derive(Default)]
pub struct HelloPlugin {
    greeting: String,
    /// Runs recorded in the settings, including this one once started
    runs: i64,
}

impl Plugin for HelloPlugin {
    fn manifest(&self) -> PluginManifest {
        PluginManifest {
            name: "hello".to_string(),
            version: "0.1.0".to_string(),
            description: "A simple example plugin that greets and counts runs".to_string(),
            author: "plinth".to_string(),
            capabilities: vec!["greeter".to_string()],
            ..Default::default()
        }
    }

    fn initialize(&mut self, ctx: &mut PluginContext) -> Result<(), PluginError> {
        self.greeting = ctx.define("greeting").unwrap_or("hello").to_string();
        ctx.provide_service("greeting", Arc::new(self.greeting.clone()))?;
        ctx.log_info(&format!("Initialized from {}", ctx.plugin_dir().display()));
        Ok(())
    }

    fn load_config(&mut self, section: &ConfigSection) {
        self.runs = section.get("runs").unwrap_or(0);
    }

    fn start(&mut self) -> Result<(), PluginError> {
        self.runs += 1;
        println!("{}! (run #{})", self.greeting, self.runs);
        Ok(())
    }

    fn save_config(&self, section: &mut ConfigSection) {
        let _ = section.set("runs", self.runs);
    }

    fn shutdown(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

// This macro generates the C ABI entry points for dynamic loading
export_plugin!(HelloPlugin);
