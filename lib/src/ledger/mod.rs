// lib/src/ledger/mod.rs

pub mod access_log;
pub mod connection_registry;
pub mod consent_ledger;
pub mod decision_gate;
pub mod statistics;
pub mod validation;

pub use access_log::AccessAuditLog;
pub use connection_registry::ConnectionRegistry;
pub use consent_ledger::{ConsentLedger, NewConsent};
pub use decision_gate::{AccessBasis, AccessDecision, AccessRequest, AccessTarget, DecisionGate};
pub use statistics::{AccessStatistics, ConnectionStatistics, ConsentStatistics, LedgerStatistics, StatisticsService};

use std::sync::Arc;

use anyhow::Result;
use log::info;
use models::errors::LedgerResult;
use models::medical::User;

use crate::config::{AppConfig, PolicyConfig};
use crate::events::EventSink;
use crate::storage_engine::{create_storage, Storage};

/// The assembled core: one instance of each service over a shared storage
/// bundle. Cheap to clone.
#[derive(Clone)]
pub struct LedgerCore {
    pub storage: Storage,
    pub connections: Arc<ConnectionRegistry>,
    pub consents: Arc<ConsentLedger>,
    pub audit: Arc<AccessAuditLog>,
    pub gate: Arc<DecisionGate>,
    pub statistics: Arc<StatisticsService>,
}

impl LedgerCore {
    pub fn new(storage: Storage, events: Arc<dyn EventSink>, policy: PolicyConfig) -> Self {
        let policy = Arc::new(policy);
        let connections = Arc::new(ConnectionRegistry::new(&storage, events.clone(), policy.clone()));
        let consents = Arc::new(ConsentLedger::new(&storage, events.clone(), policy.clone()));
        let audit = Arc::new(AccessAuditLog::new(
            storage.access_logs.clone(),
            events,
            policy.default_log_limit,
        ));
        let gate = Arc::new(DecisionGate::new(consents.clone(), audit.clone(), policy));
        let statistics = Arc::new(StatisticsService::new(&storage));
        LedgerCore { storage, connections, consents, audit, gate, statistics }
    }

    pub fn from_config(config: &AppConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let storage = create_storage(&config.storage)?;
        info!("Ledger core ready on {} storage", config.storage.engine_type);
        Ok(LedgerCore::new(storage, events, config.policy.clone()))
    }

    /// Sync point for the identity provider: stores or refreshes a user.
    pub async fn register_user(&self, user: &User) -> LedgerResult<()> {
        self.storage.users.upsert_user(user).await
    }
}
