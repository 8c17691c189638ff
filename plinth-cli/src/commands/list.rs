//! `plinth list` - what would load, without loading anything

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use plinth_core::plugins::{ActivationPolicy, NativeLoader, PluginDescriptor, PluginRegistry};
use plinth_plugin_api::{LifecycleState, Verdict};

use super::HostArgs;
use crate::config::ConfigLoader;

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// One row of `plinth list`
#[derive(Debug, Serialize)]
pub struct ListEntry {
    pub name: String,
    pub path: PathBuf,
    pub enabled: bool,
    pub state: LifecycleState,
}

impl From<&PluginDescriptor> for ListEntry {
    fn from(descriptor: &PluginDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            path: descriptor.library.clone(),
            enabled: descriptor.state == LifecycleState::Filtered(Verdict::Accepted),
            state: descriptor.state,
        }
    }
}

#[derive(Debug, Serialize)]
struct ListReport {
    search_dirs: Vec<PathBuf>,
    plugins: Vec<ListEntry>,
    warnings: Vec<String>,
}

pub fn run(host: &HostArgs, args: &ListArgs) -> Result<()> {
    let config = ConfigLoader::load(host.config.as_deref())?;
    let orchestrator_config = host.orchestrator_config(&config)?;

    let mut registry = PluginRegistry::new(Box::new(NativeLoader));
    let discovery = registry.discover(&orchestrator_config.search_dirs)?;
    registry.filter(&ActivationPolicy::new(orchestrator_config.overrides))?;

    let report = ListReport {
        search_dirs: orchestrator_config.search_dirs,
        plugins: registry.descriptors().iter().map(ListEntry::from).collect(),
        warnings: discovery.warnings.iter().map(ToString::to_string).collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_table(&report);
    }
    Ok(())
}

fn print_table(report: &ListReport) {
    if report.plugins.is_empty() {
        println!("No plugins found");
        println!();
        if report.search_dirs.is_empty() {
            println!("No plugin directory found; add one with --plugin-path <dir>");
        } else {
            println!("Searched:");
            for dir in &report.search_dirs {
                println!("  {}", dir.display());
            }
        }
        return;
    }

    for entry in &report.plugins {
        let status = if entry.enabled { "✓" } else { "○" };
        println!("{} {}    {}", status, entry.name, entry.path.display());
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plinth_core::plugins::ActivationOverrides;
    use tempfile::TempDir;

    #[test]
    fn test_entries_reflect_filter_verdicts() {
        let dir = TempDir::new().unwrap();
        let ext = plinth_core::plugins::library_extensions()[0];
        std::fs::write(dir.path().join(format!("meter.{ext}")), b"").unwrap();
        std::fs::write(dir.path().join(format!("noisy.{ext}")), b"").unwrap();

        let mut registry = PluginRegistry::new(Box::new(NativeLoader));
        registry.discover(&[dir.path().to_path_buf()]).unwrap();
        registry
            .filter(&ActivationPolicy::new(ActivationOverrides::new(
                Vec::<String>::new(),
                ["noisy"],
            )))
            .unwrap();

        let entries: Vec<ListEntry> = registry.descriptors().iter().map(ListEntry::from).collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "meter");
        assert!(entries[0].enabled);
        assert!(!entries[1].enabled);

        let json = serde_json::to_value(&entries).unwrap();
        assert_eq!(json[1]["name"], "noisy");
        assert_eq!(json[1]["enabled"], false);
    }
}
