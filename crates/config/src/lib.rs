// Configuration Management
//
// This crate handles all configuration loading for the restate client.
// It provides:
// - Configuration structs and deserialization
// - Environment and file loading logic
// - Default configuration values
//
// This keeps configuration concerns separate from the auth and resource logic.

use std::path::Path;
use thiserror::Error;

pub mod types;

// Re-export all configuration types
pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingVar(String),

    #[error("{var} {reason}")]
    InvalidValue { var: String, reason: String },

    #[error("Failed to read configuration file: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {source}")]
    ParseError {
        #[from]
        source: serde_yaml::Error,
    },
}

const CONFIG_PATHS: [&str; 2] = ["config/config.yaml", "config.yaml"];

/// Main configuration loading interface
impl AppConfig {
    /// Load configuration from YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_yaml::from_str(&content)?;
        config.client.endpoint = config.client.endpoint.trim_end_matches('/').to_string();
        Ok(config)
    }

    /// Load configuration from the first YAML file found, falling back to
    /// environment variables
    pub fn load() -> Result<Self, ConfigError> {
        for path in &CONFIG_PATHS {
            if Path::new(path).exists() {
                return Self::load_from_file(path);
            }
        }

        Self::from_env()
    }
}
