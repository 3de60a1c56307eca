// lib/src/lib.rs

//! Consent and access-control core: the connection registry, the consent
//! ledger, the access audit log and the decision gate that composes them,
//! over pluggable storage engines.

pub mod config;
pub mod events;
pub mod ledger;
pub mod storage_engine;

pub use crate::config::{load_app_config, AppConfig, PolicyConfig, ServerConfig};
pub use crate::events::{BroadcastEventSink, EventSink, LogEventSink, NoopEventSink};
pub use crate::ledger::{
    AccessAuditLog, AccessBasis, AccessDecision, AccessRequest, AccessTarget, ConnectionRegistry, ConsentLedger,
    DecisionGate, LedgerCore, LedgerStatistics, NewConsent, StatisticsService,
};
pub use crate::storage_engine::{create_storage, Storage, StorageConfig, StorageEngineType};

pub use models::{LedgerError, LedgerResult, ValidationError};
