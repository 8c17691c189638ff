//! Plugin types and metadata structures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Plugin manifest: the introspection record the host checks before it
/// trusts a freshly loaded module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Plugin name; must match the name of the file or directory it ships in
    pub name: String,
    /// Plugin version (semver)
    pub version: String,
    /// API version this plugin was built against
    pub api_version: u32,
    /// Human-readable description
    pub description: String,
    /// Plugin author
    pub author: String,
    /// Capability tags this plugin advertises
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: "0.0.1".to_string(),
            api_version: crate::API_VERSION,
            description: String::new(),
            author: String::new(),
            capabilities: Vec::new(),
        }
    }
}

/// Outcome of the activation policy for one plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected,
}

/// Stage of a plugin in its one-way trip from discovery to teardown.
///
/// States only ever move forward within one process run. Skipping ahead is
/// allowed (a plugin whose initialization fails goes straight from `Loaded`
/// to `Stopped`), going back is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Discovered,
    Filtered(Verdict),
    Loaded,
    Initialized,
    Running,
    Stopped,
    Unloaded,
}

impl LifecycleState {
    /// Position in the progression; both filter verdicts share a rank.
    pub fn rank(self) -> u8 {
        match self {
            Self::Discovered => 0,
            Self::Filtered(_) => 1,
            Self::Loaded => 2,
            Self::Initialized => 3,
            Self::Running => 4,
            Self::Stopped => 5,
            Self::Unloaded => 6,
        }
    }

    /// Whether moving from `self` to `next` keeps the progression monotonic.
    ///
    /// A rejected plugin never moves again.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        match self {
            Self::Filtered(Verdict::Rejected) => false,
            _ => next.rank() > self.rank(),
        }
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovered => write!(f, "discovered"),
            Self::Filtered(Verdict::Accepted) => write!(f, "accepted"),
            Self::Filtered(Verdict::Rejected) => write!(f, "rejected"),
            Self::Loaded => write!(f, "loaded"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Unloaded => write!(f, "unloaded"),
        }
    }
}

/// Read-only snapshot of a plugin as seen through the host registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginHandle {
    /// Unique plugin name
    pub name: String,
    /// Version reported by the manifest (empty until loaded)
    pub version: String,
    /// Library file the plugin was loaded from
    pub path: PathBuf,
    /// Declared and runtime-registered capability tags
    pub capabilities: Vec<String>,
    /// Lifecycle state at the time of the lookup
    pub state: LifecycleState,
}

impl PluginHandle {
    pub fn has_capability(&self, tag: &str) -> bool {
        self.capabilities.iter().any(|c| c == tag)
    }
}
