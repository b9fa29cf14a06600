//! Configuration management for the device plugin

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(String),

    #[error("Invalid configuration value: {0}")]
    Invalid(String),
}

/// Plugin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the node agent scans for plugin sockets
    pub plugin_dir: PathBuf,

    /// Socket file name advertised at registration. Basename only; the
    /// node agent resolves it against the plugin directory.
    pub socket_name: String,

    /// The node agent's registration socket
    pub kubelet_socket: PathBuf,

    /// Resource type served by this plugin
    pub resource_name: String,

    /// Registration settings
    pub register_timeout_ms: u64,
    pub register_retry_initial_ms: u64,
    pub register_retry_max_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let plugin_dir = PathBuf::from(mydevice_proto::DEVICE_PLUGIN_PATH);
        Self {
            kubelet_socket: PathBuf::from(mydevice_proto::KUBELET_SOCKET),
            plugin_dir,
            socket_name: "example.sock".to_string(),
            resource_name: "example.com/mydevice".to_string(),
            register_timeout_ms: 30_000,
            register_retry_initial_ms: 500,
            register_retry_max_ms: 5_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(dir) = env::var("MYDEV_PLUGIN_DIR") {
            config.plugin_dir = PathBuf::from(dir);
            // Follow the plugin directory unless overridden explicitly below.
            config.kubelet_socket = config.plugin_dir.join("kubelet.sock");
        }

        if let Ok(name) = env::var("MYDEV_SOCKET_NAME") {
            config.socket_name = name;
        }

        if let Ok(socket) = env::var("MYDEV_KUBELET_SOCKET") {
            config.kubelet_socket = PathBuf::from(socket);
        }

        if let Ok(resource) = env::var("MYDEV_RESOURCE_NAME") {
            config.resource_name = resource;
        }

        if let Ok(timeout) = env::var("MYDEV_REGISTER_TIMEOUT_MS") {
            config.register_timeout_ms = timeout
                .parse()
                .map_err(|_| ConfigError::Invalid("MYDEV_REGISTER_TIMEOUT_MS".to_string()))?;
        }

        if let Ok(delay) = env::var("MYDEV_REGISTER_RETRY_INITIAL_MS") {
            config.register_retry_initial_ms = delay
                .parse()
                .map_err(|_| ConfigError::Invalid("MYDEV_REGISTER_RETRY_INITIAL_MS".to_string()))?;
        }

        if let Ok(delay) = env::var("MYDEV_REGISTER_RETRY_MAX_MS") {
            config.register_retry_max_ms = delay
                .parse()
                .map_err(|_| ConfigError::Invalid("MYDEV_REGISTER_RETRY_MAX_MS".to_string()))?;
        }

        Ok(config)
    }

    /// Full path of the plugin's own endpoint socket
    pub fn socket_path(&self) -> PathBuf {
        self.plugin_dir.join(&self.socket_name)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_name.is_empty() {
            return Err(ConfigError::Missing("resource_name".to_string()));
        }

        if self.socket_name.is_empty() {
            return Err(ConfigError::Missing("socket_name".to_string()));
        }

        // The registration payload carries a basename, not a path.
        if self.socket_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "socket_name must be a file name, got '{}'",
                self.socket_name
            )));
        }

        if self.register_timeout_ms == 0 || self.register_retry_initial_ms == 0 {
            return Err(ConfigError::Invalid(
                "registration timeouts must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resource_name, "example.com/mydevice");
        assert_eq!(
            config.socket_path(),
            PathBuf::from("/var/lib/kubelet/device-plugins/example.sock")
        );
    }

    #[test]
    fn socket_name_with_path_is_rejected() {
        let config = Config {
            socket_name: "nested/example.sock".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_resource_name_is_rejected() {
        let config = Config {
            resource_name: String::new(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = Config {
            register_timeout_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_follow_plugin_dir() {
        env::set_var("MYDEV_PLUGIN_DIR", "/tmp/mydev-test-plugins");
        let config = Config::from_env().unwrap();
        env::remove_var("MYDEV_PLUGIN_DIR");

        assert_eq!(config.plugin_dir, PathBuf::from("/tmp/mydev-test-plugins"));
        assert_eq!(
            config.kubelet_socket,
            PathBuf::from("/tmp/mydev-test-plugins/kubelet.sock")
        );
    }
}
