//! Activation policy - which discovered plugins may load
//!
//! The allow-list is exclusive as soon as it has a single entry, while the
//! deny-list only ever removes plugins. A name on both lists is denied.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use plinth_plugin_api::Verdict;

/// Plugin names forced on or off, usually from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationOverrides {
    /// When non-empty, only these plugins load
    #[serde(default)]
    pub enabled: BTreeSet<String>,
    /// These plugins never load
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

impl ActivationOverrides {
    pub fn new<E, D>(enabled: E, disabled: D) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            enabled: enabled.into_iter().map(Into::into).collect(),
            disabled: disabled.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }

    /// Union another set of overrides into this one
    pub fn merge(&mut self, other: ActivationOverrides) {
        self.enabled.extend(other.enabled);
        self.disabled.extend(other.disabled);
    }

    /// Names that are both enabled and disabled (disabled wins)
    pub fn conflicts(&self) -> Vec<&str> {
        self.enabled
            .intersection(&self.disabled)
            .map(String::as_str)
            .collect()
    }
}

/// Decide whether `name` may load under `overrides`.
pub fn accepts(name: &str, overrides: &ActivationOverrides) -> bool {
    if overrides.disabled.contains(name) {
        return false;
    }

    overrides.enabled.is_empty() || overrides.enabled.contains(name)
}

/// Activation policy applied to every discovered plugin
#[derive(Debug, Clone, Default)]
pub struct ActivationPolicy {
    overrides: ActivationOverrides,
}

impl ActivationPolicy {
    pub fn new(overrides: ActivationOverrides) -> Self {
        for name in overrides.conflicts() {
            tracing::warn!(
                plugin = %name,
                "Plugin is both enabled and disabled; it will not load"
            );
        }
        Self { overrides }
    }

    pub fn accepts(&self, name: &str) -> bool {
        accepts(name, &self.overrides)
    }

    pub fn verdict(&self, name: &str) -> Verdict {
        if self.accepts(name) {
            Verdict::Accepted
        } else {
            Verdict::Rejected
        }
    }

    pub fn overrides(&self) -> &ActivationOverrides {
        &self.overrides
    }
}
