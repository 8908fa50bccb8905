//! Configuration types for tessera

use crate::error::TesseraError;
use crate::traits::TesseraResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Node name for logging
    pub name: String,

    /// Data directory holding the key-value store
    pub data_dir: PathBuf,

    /// Logging level
    pub log_level: String,

    /// Storage engine configuration
    pub storage: StorageConfig,

    /// Hasher used for insert commitments
    pub hasher: HashAlgorithm,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "tessera-node".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            storage: StorageConfig::default(),
            hasher: HashAlgorithm::default(),
        }
    }
}

impl NodeConfig {
    /// Load a configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> TesseraResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TesseraError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> TesseraResult<Self> {
        let config: NodeConfig =
            serde_json::from_str(content).map_err(|e| TesseraError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> TesseraResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> TesseraResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(TesseraError::Config("data_dir must not be empty".into()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(TesseraError::Config(format!(
                "unrecognised log_level '{}'",
                self.log_level
            )));
        }
        self.storage.validate()
    }
}

/// Storage engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Page cache capacity in bytes
    pub cache_capacity_bytes: u64,

    /// Background flush interval; `None` disables periodic flushing
    pub flush_every_ms: Option<u64>,

    /// Flush after every batch and load before returning
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: 64 * 1024 * 1024,
            flush_every_ms: Some(500),
            sync_writes: false,
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> TesseraResult<()> {
        if self.cache_capacity_bytes == 0 {
            return Err(TesseraError::Config(
                "storage.cache_capacity_bytes must be non-zero".into(),
            ));
        }
        if self.flush_every_ms == Some(0) {
            return Err(TesseraError::Config(
                "storage.flush_every_ms must be non-zero when set".into(),
            ));
        }
        Ok(())
    }
}

/// Commitment hash function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Blake3,
    Sha256,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hasher, HashAlgorithm::Blake3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = NodeConfig::from_json(r#"{"data_dir": "/tmp/x", "hasher": "sha256"}"#).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.hasher, HashAlgorithm::Sha256);
        assert_eq!(config.log_level, "info");
        assert!(!config.storage.sync_writes);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(NodeConfig::from_json(r#"{"log_level": "loud"}"#).is_err());
        assert!(NodeConfig::from_json(r#"{"storage": {"cache_capacity_bytes": 0}}"#).is_err());
        assert!(NodeConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = NodeConfig::default().to_json().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let loaded = NodeConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded.name, "tessera-node");
    }
}
