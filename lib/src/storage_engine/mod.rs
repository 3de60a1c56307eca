// lib/src/storage_engine/mod.rs

pub mod config;
pub mod inmemory_storage;
pub mod sled_storage;
pub mod storage_engine;
pub mod storage_utils;

pub use config::{StorageConfig, StorageEngineType};
pub use inmemory_storage::InMemoryStorage;
pub use sled_storage::{open_sled_db, SledStorage};
pub use storage_engine::{AccessLogStore, ConnectionStore, ConsentStore, UserDirectory};

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

/// The four tables the core reads and writes, as trait objects so that the
/// services never see which engine backs them.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserDirectory>,
    pub connections: Arc<dyn ConnectionStore>,
    pub consents: Arc<dyn ConsentStore>,
    pub access_logs: Arc<dyn AccessLogStore>,
}

impl Storage {
    pub fn from_engine<E>(engine: Arc<E>) -> Self
    where
        E: UserDirectory + ConnectionStore + ConsentStore + AccessLogStore,
    {
        Storage {
            users: engine.clone(),
            connections: engine.clone(),
            consents: engine.clone(),
            access_logs: engine,
        }
    }

    pub fn in_memory() -> Self {
        Storage::from_engine(Arc::new(InMemoryStorage::default()))
    }
}

/// Creates the storage bundle for the configured engine. Sled is the default.
pub fn create_storage(config: &StorageConfig) -> Result<Storage> {
    info!("Creating {} storage", config.engine_type);
    match config.engine_type {
        StorageEngineType::Sled => {
            let engine = SledStorage::open(config)
                .with_context(|| format!("Failed to open sled storage at {}", config.data_path.display()))?;
            Ok(Storage::from_engine(Arc::new(engine)))
        }
        StorageEngineType::InMemory => Ok(Storage::from_engine(Arc::new(InMemoryStorage::new(config.clone())))),
    }
}
