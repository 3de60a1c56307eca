// lib/src/ledger/statistics.rs

use std::sync::Arc;

use chrono::Utc;
use models::errors::{LedgerError, LedgerResult};
use models::medical::{AccessResult, ConnectionStatus, ConsentStatus, ConsentType, Identity};
use serde::{Deserialize, Serialize};

use crate::storage_engine::{AccessLogStore, ConnectionStore, ConsentStore, Storage};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentStatistics {
    pub total: usize,
    /// Live right now, expiry evaluated at read time.
    pub active: usize,
    pub pending: usize,
    pub revoked: usize,
    /// Explicitly expired plus stored-active rows past their expiry.
    pub expired: usize,
    pub emergency: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatistics {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStatistics {
    pub total: usize,
    pub denied: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub consents: ConsentStatistics,
    pub connections: ConnectionStatistics,
    pub access: AccessStatistics,
}

/// Read-only aggregations for the administrative surface.
pub struct StatisticsService {
    connections: Arc<dyn ConnectionStore>,
    consents: Arc<dyn ConsentStore>,
    access_logs: Arc<dyn AccessLogStore>,
}

impl StatisticsService {
    pub fn new(storage: &Storage) -> Self {
        StatisticsService {
            connections: storage.connections.clone(),
            consents: storage.consents.clone(),
            access_logs: storage.access_logs.clone(),
        }
    }

    pub async fn collect(&self, caller: &Identity) -> LedgerResult<LedgerStatistics> {
        if !caller.is_admin() {
            return Err(LedgerError::Forbidden("Administrator role required".to_string()));
        }

        let now = Utc::now();
        let mut consents = ConsentStatistics::default();
        for consent in self.consents.all_consents().await? {
            consents.total += 1;
            if consent.consent_type == ConsentType::EmergencyAccess {
                consents.emergency += 1;
            }
            match consent.status {
                ConsentStatus::Pending => consents.pending += 1,
                ConsentStatus::Revoked => consents.revoked += 1,
                ConsentStatus::Expired => consents.expired += 1,
                ConsentStatus::Active if consent.is_active_at(now) => consents.active += 1,
                ConsentStatus::Active => consents.expired += 1,
            }
        }

        let mut connections = ConnectionStatistics::default();
        for connection in self.connections.all_connections().await? {
            connections.total += 1;
            match connection.status {
                ConnectionStatus::Pending => connections.pending += 1,
                ConnectionStatus::Accepted => connections.accepted += 1,
                ConnectionStatus::Rejected => connections.rejected += 1,
                ConnectionStatus::Blocked => connections.blocked += 1,
            }
        }

        let logs = self.access_logs.all_logs().await?;
        let access = AccessStatistics {
            total: logs.len(),
            denied: logs.iter().filter(|log| log.result == AccessResult::Denied).count(),
        };

        Ok(LedgerStatistics { consents, connections, access })
    }
}
