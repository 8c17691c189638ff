//! Command handlers and the options they share

pub mod list;
pub mod run;

use anyhow::{Result, bail};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;

use plinth_core::OrchestratorConfig;
use plinth_core::plugins::ActivationOverrides;
use plinth_paths::{APP_NAME, InstallLayout, PathResolver};

use crate::config::HostConfig;

/// Options accepted by every command
#[derive(Args, Debug, Clone, Default)]
pub struct HostArgs {
    /// Additional plugin directory (repeatable)
    #[arg(long = "plugin-path", visible_alias = "pp", value_name = "PATH", global = true)]
    pub plugin_paths: Vec<PathBuf>,

    /// Load only the named plugins (repeatable)
    #[arg(long = "enable-plugin", visible_alias = "pe", value_name = "NAME", global = true)]
    pub enable: Vec<String>,

    /// Never load the named plugin (repeatable)
    #[arg(long = "disable-plugin", visible_alias = "pd", value_name = "NAME", global = true)]
    pub disable: Vec<String>,

    /// Variable passed to plugins, as `key:value` (repeatable)
    #[arg(short = 'd', long = "define", value_name = "KEY[:VALUE]", value_parser = parse_define, global = true)]
    pub defines: Vec<(String, String)>,

    /// Host config file, layered over the user config
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Settings file for plugin state
    #[arg(long, value_name = "FILE", global = true)]
    pub settings: Option<PathBuf>,

    /// Erase the settings file once the run is over
    #[arg(long, global = true)]
    pub clear_settings: bool,
}

impl HostArgs {
    /// Enable/disable lists from the config file unioned with the command line
    pub fn overrides(&self, config: &HostConfig) -> ActivationOverrides {
        let mut overrides = ActivationOverrides::new(
            config.plugins.enabled.iter().cloned(),
            config.plugins.disabled.iter().cloned(),
        );
        overrides.merge(ActivationOverrides::new(
            self.enable.iter().cloned(),
            self.disable.iter().cloned(),
        ));
        overrides
    }

    pub fn defines(&self) -> BTreeMap<String, String> {
        self.defines.iter().cloned().collect()
    }

    /// Extra search directories: config file first, then command line
    pub fn extra_paths(&self, config: &HostConfig) -> Vec<PathBuf> {
        config
            .plugins
            .paths
            .iter()
            .chain(&self.plugin_paths)
            .cloned()
            .collect()
    }

    /// Everything the orchestrator needs, with search directories resolved
    /// from the running executable's location
    pub fn orchestrator_config(&self, config: &HostConfig) -> Result<OrchestratorConfig> {
        let resolver = PathResolver::new(InstallLayout::detect(APP_NAME))
            .with_extra_paths(self.extra_paths(config));

        let exe_dir = match plinth_paths::executable_dir() {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        tracing::debug!(
            layout = ?resolver.layout(),
            exe_dir = %exe_dir.display(),
            "Resolving plugin directories"
        );

        Ok(OrchestratorConfig::from_resolver(&resolver, &exe_dir)
            .with_overrides(self.overrides(config))
            .with_defines(self.defines()))
    }
}

/// Parse `key:value`; a bare `key` maps to an empty value
pub fn parse_define(s: &str) -> Result<(String, String)> {
    let (key, value) = s.split_once(':').unwrap_or((s, ""));
    if key.is_empty() {
        bail!("define needs a key: '{}'", s);
    }
    Ok((key.to_string(), value.to_string()))
}
