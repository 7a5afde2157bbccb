//! Configuration management for GNSS Share

mod client;
pub mod serde_utils;
mod server;

pub use client::ClientConfig;
pub use server::ServerConfig;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gnss-share")
}

/// Get the default configuration file path for a component
pub fn default_config_path(component: &str) -> PathBuf {
    default_config_dir().join(format!("{}.toml", component))
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_save_then_load_client_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.toml");

        let mut config = ClientConfig::default();
        config.use_gateway = false;
        config.server_address = "10.0.0.7".to_string();
        config.reconnect_delay = Duration::from_millis(750);

        save_config(&path, &config).unwrap();
        let loaded: ClientConfig = load_config(&path).unwrap();

        assert!(!loaded.use_gateway);
        assert_eq!(loaded.server_address, "10.0.0.7");
        assert_eq!(loaded.reconnect_delay, Duration::from_millis(750));
        assert_eq!(loaded.port, config.port);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "heartbeat_timeout = 5000\n").unwrap();

        let loaded: ServerConfig = load_config(&path).unwrap();
        assert_eq!(loaded.heartbeat_timeout, Duration::from_secs(5));
        assert_eq!(loaded.bind_address, ServerConfig::default().bind_address);
    }

    #[test]
    fn test_missing_file() {
        let result: Result<ServerConfig, _> = load_config(Path::new("/nonexistent/server.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path("client");
        assert!(path.ends_with("gnss-share/client.toml"));
    }
}
