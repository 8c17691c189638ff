//! Paths for plinth.
//!
//! Two concerns live here:
//!
//! - XDG base directories for host configuration and persisted settings.
//!   CLI tools should use XDG paths for cross-platform consistency, not
//!   platform-native paths.
//! - [`PathResolver`], which turns the running executable's location and the
//!   install layout into the ordered list of plugin directories to scan.

mod layout;

pub use layout::{InstallLayout, PathResolver};

use std::path::PathBuf;

/// Application name used for directory names.
pub const APP_NAME: &str = "plinth";

/// Get the plinth config directory.
///
/// Returns `$XDG_CONFIG_HOME/plinth` if set, otherwise `~/.config/plinth`.
/// This is where the host config file lives.
///
/// # Examples
///
/// ```
/// use plinth_paths::config_dir;
///
/// let config = config_dir();
/// let host_config = config.join("config.toml");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_NAME)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config").join(APP_NAME)
    } else {
        PathBuf::from(".config").join(APP_NAME)
    }
}

/// Get the plinth data directory.
///
/// Returns `$XDG_DATA_HOME/plinth` if set, otherwise `~/.local/share/plinth`.
/// Persisted plugin settings are stored here.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join(APP_NAME)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share").join(APP_NAME)
    } else {
        PathBuf::from(".local/share").join(APP_NAME)
    }
}

/// Directory containing the running executable, if it can be determined.
pub fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_ends_with_app_name() {
        let path = config_dir();
        assert!(path.ends_with("plinth"), "config_dir should end with 'plinth'");
    }

    #[test]
    #[serial]
    fn test_data_dir_ends_with_app_name() {
        let path = data_dir();
        assert!(path.ends_with("plinth"), "data_dir should end with 'plinth'");
    }

    #[test]
    #[serial]
    fn test_config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
        }
        let path = config_dir();
        assert_eq!(path, PathBuf::from("/tmp/test-config/plinth"));
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_data_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_DATA_HOME", "/tmp/test-data");
        }
        let path = data_dir();
        assert_eq!(path, PathBuf::from("/tmp/test-data/plinth"));
        unsafe {
            std::env::remove_var("XDG_DATA_HOME");
        }
    }

    #[test]
    fn test_executable_dir_exists() {
        let dir = executable_dir().expect("test binary has a parent directory");
        assert!(dir.is_dir());
    }
}
