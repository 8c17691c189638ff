//! Plugin search-path resolution
//!
//! The install layout is picked once at startup and every OS-specific
//! assumption about where plugins live stays inside [`InstallLayout`].

use std::path::{Path, PathBuf};

/// Name of the directory the generic search looks for.
const PLUGINS_DIR_NAME: &str = "plugins";

/// Number of levels between a bundle's executable and the bundle's parent
/// (`Foo.app/Contents/MacOS/foo`).
const BUNDLE_DEPTH: usize = 3;

/// How the application was installed, which decides where its plugins are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallLayout {
    /// Distribution package: plugins live at `<exe_dir>/../lib/<app_name>`
    Package { app_name: String },
    /// Application bundle: leave the bundle, then search like `Generic`
    Bundle,
    /// Development builds and everything else: walk upwards looking for a
    /// `plugins` directory
    Generic,
}

impl InstallLayout {
    /// Pick the layout for the platform this binary was built for.
    ///
    /// Debug builds on Linux use the generic search so a freshly built
    /// binary finds the `plugins` directory of the source tree.
    pub fn detect(app_name: impl Into<String>) -> Self {
        if cfg!(all(target_os = "linux", not(debug_assertions))) {
            Self::Package {
                app_name: app_name.into(),
            }
        } else if cfg!(target_os = "macos") {
            Self::Bundle
        } else {
            Self::Generic
        }
    }

    /// Locate the layout's plugin directory, starting from the directory
    /// holding the executable.
    pub fn locate(&self, executable_dir: &Path) -> Option<PathBuf> {
        let Ok(start) = std::fs::canonicalize(executable_dir) else {
            tracing::debug!(
                dir = %executable_dir.display(),
                "Executable directory cannot be resolved"
            );
            return None;
        };

        match self {
            Self::Package { app_name } => {
                let candidate = start.parent()?.join("lib").join(app_name);
                is_readable_dir(&candidate).then_some(candidate)
            }
            Self::Bundle => search_upwards(start.ancestors().nth(BUNDLE_DEPTH)?),
            Self::Generic => search_upwards(&start),
        }
    }
}

/// Computes the ordered set of directories to scan for plugins.
#[derive(Debug, Clone)]
pub struct PathResolver {
    layout: InstallLayout,
    extra_paths: Vec<PathBuf>,
}

impl PathResolver {
    pub fn new(layout: InstallLayout) -> Self {
        Self {
            layout,
            extra_paths: Vec::new(),
        }
    }

    /// Builder: directories supplied explicitly by the user.
    ///
    /// These are appended verbatim and never go through the layout heuristic.
    pub fn with_extra_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.extra_paths.extend(paths);
        self
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Resolve the search directories for an executable living in
    /// `executable_dir`.
    ///
    /// The layout's directory (if any) comes first, followed by the extra
    /// paths in the order given. An empty result is valid: the host simply
    /// runs without plugins.
    pub fn resolve(&self, executable_dir: &Path) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(self.extra_paths.len() + 1);

        match self.layout.locate(executable_dir) {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "Plugin directory");
                dirs.push(dir);
            }
            None => {
                tracing::debug!(
                    layout = ?self.layout,
                    exe_dir = %executable_dir.display(),
                    "No plugin directory found for install layout"
                );
            }
        }

        dirs.extend(self.extra_paths.iter().cloned());
        dirs
    }
}

/// Walk from `start` towards the root, returning the first readable
/// `plugins` child. The root itself is never searched.
fn search_upwards(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);

    while let Some(dir) = current {
        if dir.parent().is_none() || !is_readable_dir(dir) {
            return None;
        }

        let candidate = dir.join(PLUGINS_DIR_NAME);
        if is_readable_dir(&candidate) {
            return Some(candidate);
        }

        current = dir.parent();
    }

    None
}

fn is_readable_dir(path: &Path) -> bool {
    path.is_dir() && std::fs::read_dir(path).is_ok()
}
