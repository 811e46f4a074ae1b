// ⚙️ Configuration
//
// Lookup: $FREIGHT_ROTATION_CONFIG, else ./freight-rotation.toml, else defaults.
// Then FREIGHT_ROTATION_DB / FREIGHT_ROTATION_ADDR / FREIGHT_ROTATION_PENALTY
// override single fields.

use crate::rotation::PenaltyStrategy;
use crate::store::DEFAULT_STORAGE_KEY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "FREIGHT_ROTATION_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "freight-rotation.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub storage_key: String,
    pub penalty_strategy: PenaltyStrategy,
    pub server_addr: String,
    pub share_title: String,
    pub log_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("freight-rotation.db"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            penalty_strategy: PenaltyStrategy::CostPenalty,
            server_addr: "0.0.0.0:3000".to_string(),
            share_title: "FREIGHT ROTATION".to_string(),
            log_file: PathBuf::from("freight-rotation.log"),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Resolve the file, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(DEFAULT_CONFIG_FILE)?
            }
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = var("FREIGHT_ROTATION_DB") {
            self.database_path = PathBuf::from(db);
        }

        if let Some(addr) = var("FREIGHT_ROTATION_ADDR") {
            if addr.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "FREIGHT_ROTATION_ADDR".to_string(),
                    value: addr,
                });
            }
            self.server_addr = addr;
        }

        if let Some(penalty) = var("FREIGHT_ROTATION_PENALTY") {
            self.penalty_strategy =
                PenaltyStrategy::parse(&penalty).ok_or(ConfigError::InvalidValue {
                    key: "FREIGHT_ROTATION_PENALTY".to_string(),
                    value: penalty,
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage_key, "freightSystemDrivers");
        assert_eq!(config.penalty_strategy, PenaltyStrategy::CostPenalty);
        assert_eq!(config.server_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            database_path = "/var/lib/rotation.db"
            penalty_strategy = "zero"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/rotation.db"));
        assert_eq!(config.penalty_strategy, PenaltyStrategy::ZeroValueRefusal);
        assert_eq!(config.share_title, "FREIGHT ROTATION");
    }

    #[test]
    fn test_bad_toml() {
        assert!(Config::from_toml(r#"penalty_strategy = "harsh""#).is_err());
        assert!(matches!(
            Config::from_file("/definitely/not/here.toml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FREIGHT_ROTATION_DB", "other.db"),
            ("FREIGHT_ROTATION_PENALTY", "zero"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("other.db"));
        assert_eq!(config.penalty_strategy, PenaltyStrategy::ZeroValueRefusal);
        assert_eq!(config.server_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_invalid_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == "FREIGHT_ROTATION_PENALTY").then(|| "lenient".to_string()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for FREIGHT_ROTATION_PENALTY: 'lenient'");
    }
}
