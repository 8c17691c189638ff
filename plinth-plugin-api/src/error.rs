//! Error types for plugin authors

use thiserror::Error;

/// Errors that plugins can return.
///
/// Returned from [`Plugin::initialize`](crate::Plugin::initialize) this is
/// the host's initialization error: the plugin is marked stopped and the
/// remaining plugins carry on.
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A capability or service the plugin depends on is not available
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// Service published twice under the same name
    #[error("Duplicate service: {0}")]
    DuplicateService(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl PluginError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a missing dependency error
    pub fn missing_dependency(what: impl Into<String>) -> Self {
        Self::MissingDependency(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = PluginError::Config("missing key".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: missing key");

        let dep_err = PluginError::MissingDependency("capability 'audio'".to_string());
        assert_eq!(dep_err.to_string(), "Missing dependency: capability 'audio'");

        let custom_err = PluginError::Custom("something happened".to_string());
        assert_eq!(custom_err.to_string(), "something happened");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let plugin_err: PluginError = io_err.into();

        assert!(matches!(plugin_err, PluginError::Io(_)));
        assert!(plugin_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_helper_constructors() {
        assert!(matches!(PluginError::custom("test"), PluginError::Custom(_)));
        assert!(matches!(
            PluginError::config("bad config"),
            PluginError::Config(_)
        ));
        assert!(matches!(
            PluginError::missing_dependency("timer"),
            PluginError::MissingDependency(_)
        ));
    }

    #[test]
    fn test_duplicate_service_error() {
        let err = PluginError::DuplicateService("clock/now".into());
        assert!(err.to_string().contains("clock/now"));
    }
}
