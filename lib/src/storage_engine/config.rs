// lib/src/storage_engine/config.rs

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use models::errors::LedgerError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATA_DIRECTORY: &str = "./data/medconnect";
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageEngineType {
    #[default]
    Sled,
    InMemory,
}

impl StorageEngineType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageEngineType::Sled => "sled",
            StorageEngineType::InMemory => "in_memory",
        }
    }
}

impl fmt::Display for StorageEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageEngineType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sled" => Ok(StorageEngineType::Sled),
            "in_memory" | "inmemory" | "memory" => Ok(StorageEngineType::InMemory),
            other => Err(LedgerError::ConfigurationError(format!(
                "Unknown storage engine type: {other}"
            ))),
        }
    }
}

/// Settings for the persistence layer backing the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub engine_type: StorageEngineType,
    pub data_path: PathBuf,
    pub cache_capacity: u64,
    /// Flush the sled log after every successful access-log append.
    pub flush_on_audit: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            engine_type: StorageEngineType::default(),
            data_path: PathBuf::from(DEFAULT_DATA_DIRECTORY),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_on_audit: true,
        }
    }
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        StorageConfig {
            engine_type: StorageEngineType::InMemory,
            ..StorageConfig::default()
        }
    }

    pub fn sled(data_path: impl Into<PathBuf>) -> Self {
        StorageConfig {
            engine_type: StorageEngineType::Sled,
            data_path: data_path.into(),
            ..StorageConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_type_parses_aliases() {
        assert_eq!("sled".parse::<StorageEngineType>().unwrap(), StorageEngineType::Sled);
        assert_eq!(" In_Memory ".parse::<StorageEngineType>().unwrap(), StorageEngineType::InMemory);
        assert!(matches!(
            "rocksdb".parse::<StorageEngineType>(),
            Err(LedgerError::ConfigurationError(_))
        ));
    }

    #[test]
    fn defaults_use_sled_with_audit_flush() {
        let config = StorageConfig::default();
        assert_eq!(config.engine_type, StorageEngineType::Sled);
        assert!(config.flush_on_audit);
        assert_eq!(StorageConfig::in_memory().engine_type, StorageEngineType::InMemory);
    }
}
