// lib/src/ledger/access_log.rs

use std::sync::Arc;

use log::{debug, error, warn};
use models::errors::{LedgerError, LedgerResult};
use models::events::LedgerEvent;
use models::identifiers::{ConsentId, RecordId, UserId};
use models::medical::{AccessLog, Identity};

use crate::events::EventSink;
use crate::storage_engine::AccessLogStore;

/// Append-only audit trail of access attempts.
pub struct AccessAuditLog {
    store: Arc<dyn AccessLogStore>,
    events: Arc<dyn EventSink>,
    default_limit: usize,
}

impl AccessAuditLog {
    pub fn new(store: Arc<dyn AccessLogStore>, events: Arc<dyn EventSink>, default_limit: usize) -> Self {
        AccessAuditLog { store, events, default_limit }
    }

    /// Writes `entry` and returns once the store has accepted it. Store
    /// failures propagate.
    pub async fn record(&self, entry: AccessLog) -> LedgerResult<AccessLog> {
        self.store.append(&entry).await?;
        debug!(
            "Logged {} {} by {} on record {}",
            entry.action.as_str(),
            entry.result.as_str(),
            entry.user_id,
            entry.record_id
        );
        self.events.publish(LedgerEvent::RecordAccessed {
            record_id: entry.record_id,
            user_id: entry.user_id,
            action: entry.action,
            result: entry.result,
            consent_id: entry.consent_id,
        });
        Ok(entry)
    }

    /// Writes `entry` with one retry; a second failure is logged and
    /// swallowed. Only for attempts that exposed no data.
    pub async fn record_best_effort(&self, entry: AccessLog) {
        let first = match self.record(entry.clone()).await {
            Ok(_) => return,
            Err(e) => e,
        };
        warn!("Access log write failed, retrying once: {}", first);
        if let Err(e) = self.record(entry.clone()).await {
            error!(
                "Dropping access log entry {} for user {} on record {}: {}",
                entry.id, entry.user_id, entry.record_id, e
            );
        }
    }

    fn limit(&self, limit: Option<usize>) -> usize {
        limit.filter(|limit| *limit > 0).unwrap_or(self.default_limit)
    }

    pub async fn list_for_user(&self, user_id: UserId, limit: Option<usize>) -> LedgerResult<Vec<AccessLog>> {
        self.store.list_for_user(&user_id, self.limit(limit)).await
    }

    pub async fn list_for_record(&self, record_id: RecordId, limit: Option<usize>) -> LedgerResult<Vec<AccessLog>> {
        self.store.list_for_record(&record_id, self.limit(limit)).await
    }

    pub async fn list_for_consent(&self, consent_id: ConsentId) -> LedgerResult<Vec<AccessLog>> {
        self.store.list_for_consent(&consent_id).await
    }

    /// Audit rows for a record, readable by the patient recorded as its
    /// owner and by administrators. A record with no rows yields an empty
    /// list for anyone.
    pub async fn logs_for_record(
        &self,
        record_id: RecordId,
        caller: &Identity,
        limit: Option<usize>,
    ) -> LedgerResult<Vec<AccessLog>> {
        let logs = self.list_for_record(record_id, limit).await?;
        if !caller.is_admin() && logs.iter().any(|log| log.patient_id != caller.id) {
            warn!("User {} denied the audit trail of record {}", caller.id, record_id);
            return Err(LedgerError::Forbidden("Access denied".to_string()));
        }
        Ok(logs)
    }

    /// A user's own access history; administrators may read anyone's.
    pub async fn logs_for_user(&self, user_id: UserId, caller: &Identity, limit: Option<usize>) -> LedgerResult<Vec<AccessLog>> {
        if !caller.is_self_or_admin(&user_id) {
            return Err(LedgerError::Forbidden("Access denied".to_string()));
        }
        self.list_for_user(user_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventSink;
    use crate::storage_engine::storage_engine::MockAccessLogStore;
    use crate::storage_engine::InMemoryStorage;
    use models::medical::{AccessAction, AccessResult, UserRole};

    fn entry() -> AccessLog {
        AccessLog::new(UserId::new(), UserId::new(), RecordId::new(), AccessAction::View, AccessResult::Denied)
    }

    #[tokio::test]
    async fn best_effort_retries_once_then_gives_up() {
        let mut store = MockAccessLogStore::new();
        store
            .expect_append()
            .times(2)
            .returning(|_| Err(LedgerError::StorageUnavailable("disk full".to_string())));
        let log = AccessAuditLog::new(Arc::new(store), Arc::new(NoopEventSink), 50);
        log.record_best_effort(entry()).await;
    }

    #[tokio::test]
    async fn best_effort_stops_after_success() {
        let mut store = MockAccessLogStore::new();
        let mut calls = 0;
        store.expect_append().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(LedgerError::StorageUnavailable("transient".to_string()))
            } else {
                Ok(())
            }
        });
        let log = AccessAuditLog::new(Arc::new(store), Arc::new(NoopEventSink), 50);
        log.record_best_effort(entry()).await;
    }

    #[tokio::test]
    async fn record_propagates_store_failure() {
        let mut store = MockAccessLogStore::new();
        store
            .expect_append()
            .returning(|_| Err(LedgerError::StorageUnavailable("offline".to_string())));
        let log = AccessAuditLog::new(Arc::new(store), Arc::new(NoopEventSink), 50);
        assert!(matches!(log.record(entry()).await, Err(LedgerError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn default_limit_applies() {
        let store = Arc::new(InMemoryStorage::default());
        let log = AccessAuditLog::new(store, Arc::new(NoopEventSink), 2);
        let user = UserId::new();
        for _ in 0..3 {
            log.record(AccessLog::new(user, UserId::new(), RecordId::new(), AccessAction::View, AccessResult::Success))
                .await
                .unwrap();
        }
        assert_eq!(log.list_for_user(user, None).await.unwrap().len(), 2);
        assert_eq!(log.list_for_user(user, Some(10)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn record_logs_are_owner_or_admin_only() {
        let store = Arc::new(InMemoryStorage::default());
        let log = AccessAuditLog::new(store, Arc::new(NoopEventSink), 50);
        let owner = Identity::new(UserId::new(), UserRole::Patient, "owner@example.com");
        let other = Identity::new(UserId::new(), UserRole::Patient, "other@example.com");
        let doctor = Identity::new(UserId::new(), UserRole::Doctor, "doc@example.com");
        let admin = Identity::new(UserId::new(), UserRole::Admin, "admin@example.com");
        let record = RecordId::new();
        assert!(log.logs_for_record(record, &other, None).await.unwrap().is_empty());

        log.record(AccessLog::new(doctor.id, owner.id, record, AccessAction::View, AccessResult::Denied))
            .await
            .unwrap();
        assert_eq!(log.logs_for_record(record, &owner, None).await.unwrap().len(), 1);
        assert_eq!(log.logs_for_record(record, &admin, None).await.unwrap().len(), 1);
        for outsider in [&other, &doctor] {
            assert!(matches!(
                log.logs_for_record(record, outsider, None).await,
                Err(LedgerError::Forbidden(_))
            ));
        }
        assert!(matches!(log.logs_for_user(owner.id, &doctor, None).await, Err(LedgerError::Forbidden(_))));
    }
}
