//! Shared configuration for peerport tools
//!
//! Reads from ~/.peerport/config.toml

use anyhow::{Context, Result};
use peerport::AdapterConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level config structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub adapter: AdapterSettings,
}

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8090".to_string()
}

/// Adapter behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterSettings {
    /// Deregister data and media handles when they close
    #[serde(default = "default_true")]
    pub release_on_close: bool,
    /// Length of generated handles
    #[serde(default = "default_id_length")]
    pub id_length: usize,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            release_on_close: true,
            id_length: default_id_length(),
        }
    }
}

impl AdapterSettings {
    pub fn to_adapter_config(&self) -> AdapterConfig {
        AdapterConfig {
            release_on_close: self.release_on_close,
            id_length: self.id_length,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_id_length() -> usize {
    peerport::DEFAULT_ID_LENGTH
}

impl Config {
    /// Load config from file, or create default if doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path())
    }

    /// Load config, returning default on any error (no panic)
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }
}

/// Get the peerport directory (~/.peerport)
pub fn get_peerport_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PEERPORT_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".peerport")
}

/// Get the config file path (~/.peerport/config.toml)
pub fn get_config_path() -> PathBuf {
    get_peerport_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "127.0.0.1:8090");
        assert!(config.adapter.release_on_close);
        assert_eq!(config.adapter.id_length, 21);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:8090");
        assert!(config.adapter.release_on_close);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[adapter]
release_on_close = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.adapter.release_on_close);
        assert_eq!(config.adapter.id_length, 21);
        assert_eq!(config.server.bind_address, "127.0.0.1:8090");
    }

    #[test]
    fn test_adapter_config_conversion() {
        let settings = AdapterSettings {
            release_on_close: false,
            id_length: 8,
        };
        let config = settings.to_adapter_config();
        assert!(!config.release_on_close);
        assert_eq!(config.id_length, 8);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.bind_address, "127.0.0.1:8090");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.server.bind_address = "0.0.0.0:9000".to_string();
        config.adapter.id_length = 10;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.server.bind_address, "0.0.0.0:9000");
        assert_eq!(loaded.adapter.id_length, 10);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[server\nbind_address = 1").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
