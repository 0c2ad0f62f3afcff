//! Configuration management for diaryledger

use crate::crypto::KdfParams;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default ledger file name for the sled backend
pub const DEFAULT_SLED_DIR: &str = "ledger.db";

/// Default chain file for the JSON backend
pub const DEFAULT_CHAIN_FILE: &str = "chains/main_chain.json";

/// Default keystore location under the data directory
pub const DEFAULT_KEYSTORE_FILE: &str = "keystore/keystore.json";

/// Storage backend for blocks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    /// Embedded sled database
    Sled,

    /// One pretty-printed JSON file
    JsonFile,
}

impl StorageBackend {
    /// Parse a backend name as used in config and env
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sled" => Some(StorageBackend::Sled),
            "json-file" | "json" => Some(StorageBackend::JsonFile),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageBackend::Sled => "sled",
            StorageBackend::JsonFile => "json-file",
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to use
    pub backend: StorageBackend,

    /// Ledger location (defaults under the data directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Sled,
            path: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the data directory
    pub data_dir: PathBuf,

    /// Block storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// KDF profile used when a new ledger is created
    ///
    /// Existing ledgers keep the profile pinned in their keystore.
    #[serde(default)]
    pub kdf: KdfParams,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("diaryledger");

        Config {
            data_dir,
            storage: StorageConfig::default(),
            kdf: KdfParams::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load the file if present, otherwise defaults with env overrides
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DIARYLEDGER_DATA_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(backend) = lookup("DIARYLEDGER_STORAGE") {
            if let Some(backend) = StorageBackend::parse(&backend) {
                self.storage.backend = backend;
            }
        }

        if let Some(iterations) = lookup("DIARYLEDGER_KDF_ITERATIONS") {
            if let Ok(n) = iterations.trim().parse::<u32>() {
                match &mut self.kdf {
                    KdfParams::Pbkdf2Sha512 { iterations } => *iterations = n,
                    KdfParams::Argon2id { iterations, .. } => *iterations = n,
                }
            }
        }

        if let Some(level) = lookup("DIARYLEDGER_LOG_LEVEL") {
            let level = level.trim().to_string();
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Data directory is required".to_string(),
            ));
        }

        self.kdf
            .validate()
            .map_err(|e| Error::InvalidConfig(format!("KDF: {}", e)))?;

        if parse_level(&self.logging.level).is_none() {
            return Err(Error::InvalidConfig(format!(
                "Unknown log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Where the ledger is stored
    pub fn ledger_path(&self) -> PathBuf {
        match &self.storage.path {
            Some(path) => path.clone(),
            None => match self.storage.backend {
                StorageBackend::Sled => self.data_dir.join(DEFAULT_SLED_DIR),
                StorageBackend::JsonFile => self.data_dir.join(DEFAULT_CHAIN_FILE),
            },
        }
    }

    /// Where the keystore is stored
    pub fn keystore_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_KEYSTORE_FILE)
    }

    /// Configured log level
    pub fn log_level(&self) -> tracing::Level {
        parse_level(&self.logging.level).unwrap_or(tracing::Level::INFO)
    }
}

fn parse_level(level: &str) -> Option<tracing::Level> {
    level.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.kdf, KdfParams::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.data_dir = dir.path().join("data");
        config.storage.backend = StorageBackend::JsonFile;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.storage.backend, StorageBackend::JsonFile);
        assert_eq!(loaded.ledger_path(), dir.path().join("data").join(DEFAULT_CHAIN_FILE));
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"data_dir": "/tmp/diary"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = Config::default();
        config.kdf = KdfParams::Pbkdf2Sha512 { iterations: 0 };

        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DIARYLEDGER_DATA_DIR", "/srv/diary"),
            ("DIARYLEDGER_STORAGE", "json"),
            ("DIARYLEDGER_KDF_ITERATIONS", "2000"),
            ("DIARYLEDGER_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides_from(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/srv/diary"));
        assert_eq!(config.storage.backend, StorageBackend::JsonFile);
        assert_eq!(config.kdf, KdfParams::Pbkdf2Sha512 { iterations: 2000 });
        assert_eq!(config.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides_from(|name| match name {
            "DIARYLEDGER_STORAGE" => Some("floppy".to_string()),
            "DIARYLEDGER_KDF_ITERATIONS" => Some("many".to_string()),
            _ => None,
        });

        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.kdf, KdfParams::default());
    }

    #[test]
    fn test_paths() {
        let mut config = Config::default();
        config.data_dir = PathBuf::from("/data");

        assert_eq!(config.ledger_path(), PathBuf::from("/data/ledger.db"));
        assert_eq!(config.keystore_path(), PathBuf::from("/data/keystore/keystore.json"));

        config.storage.path = Some(PathBuf::from("/elsewhere/chain.db"));
        assert_eq!(config.ledger_path(), PathBuf::from("/elsewhere/chain.db"));
    }
}
