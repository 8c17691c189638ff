//! Plugin container scanning
//!
//! A plugin container is either
//! - a shared library directly inside a search directory
//!   (`<name>.<ext>` or `lib<name>.<ext>`), or
//! - a subdirectory `<name>/` holding `<name>.<ext>` or `lib<name>.<ext>`,
//!   next to whatever data files the plugin ships.

use std::path::{Path, PathBuf};

use super::error::DiscoveryWarning;

/// A plugin container found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Plugin name derived from the container
    pub name: String,
    /// Shared library to load
    pub library: PathBuf,
    /// Directory owning the plugin (data files, per-plugin resources)
    pub dir: PathBuf,
}

/// Result of scanning one directory
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Containers in file-name order
    pub candidates: Vec<Candidate>,
    pub warnings: Vec<DiscoveryWarning>,
}

/// Shared-library extensions for the current platform, most specific first
pub fn library_extensions() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else if cfg!(target_os = "windows") {
        &["dll"]
    } else {
        &["so"]
    }
}

/// Plugin name for a library file name, if it is one.
///
/// Versioned files (`name.1.2.0.so`) are not containers; packages ship them
/// next to an unversioned `name.so` link.
pub fn plugin_name_from_file(file_name: &str) -> Option<String> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if !library_extensions().contains(&ext) {
        return None;
    }

    let name = stem.strip_prefix("lib").filter(|s| !s.is_empty()).unwrap_or(stem);
    if name.is_empty() || name.starts_with('.') || name.contains('.') {
        return None;
    }

    Some(name.to_string())
}

/// Find the library file for plugin `name` inside its own directory
pub fn find_library(dir: &Path, name: &str) -> Option<PathBuf> {
    for ext in library_extensions() {
        let lib_path = dir.join(format!("{name}.{ext}"));
        if lib_path.is_file() {
            return Some(lib_path);
        }

        let lib_path = dir.join(format!("lib{name}.{ext}"));
        if lib_path.is_file() {
            return Some(lib_path);
        }
    }

    None
}

/// Scan one search directory.
///
/// Returns `None` when the directory does not exist; that is expected for
/// optional locations and is not worth a warning.
pub fn scan_directory(dir: &Path) -> Option<ScanResult> {
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "Plugin directory does not exist");
        return None;
    }

    let mut result = ScanResult::default();

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) => {
            result.warnings.push(DiscoveryWarning::UnreadableDirectory {
                path: dir.to_path_buf(),
                source,
            });
            return Some(result);
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    paths.sort();

    for path in paths {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            match find_library(&path, file_name) {
                Some(library) => result.candidates.push(Candidate {
                    name: file_name.to_string(),
                    library,
                    dir: path.clone(),
                }),
                None => result
                    .warnings
                    .push(DiscoveryWarning::MissingLibrary { path: path.clone() }),
            }
        } else if let Some(name) = plugin_name_from_file(file_name) {
            result.candidates.push(Candidate {
                name,
                library: path.clone(),
                dir: dir.to_path_buf(),
            });
        } else {
            tracing::trace!(path = %path.display(), "Not a plugin library, skipping");
        }
    }

    Some(result)
}
