// lib/src/storage_engine/inmemory_storage.rs
use super::config::StorageConfig;
use super::storage_engine::{AccessLogStore, ConnectionStore, ConsentStore, UserDirectory};
use super::storage_utils::unordered_pair;
use async_trait::async_trait;
use chrono::Utc;
use models::errors::{LedgerError, LedgerResult};
use models::identifiers::{ConnectionId, ConsentId, RecordId, UserId};
use models::medical::{AccessLog, Connection, Consent, ConsentStatus, User};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    connections: HashMap<ConnectionId, Connection>,
    connection_pairs: HashMap<(UserId, UserId), ConnectionId>,
    consents: HashMap<ConsentId, Consent>,
    active_consents: HashMap<(UserId, UserId), ConsentId>,
    access_logs: Vec<AccessLog>,
}

impl Tables {
    /// Points the (patient, doctor) slot at `consent`. A live holder is a
    /// conflict; a holder past its expiry is moved to `expired`.
    fn claim_active_slot(&mut self, consent: &Consent) -> LedgerResult<()> {
        let slot = (consent.patient_id, consent.doctor_id);
        let now = Utc::now();
        if let Some(holder_id) = self.active_consents.get(&slot).copied() {
            if holder_id != consent.id {
                if let Some(holder) = self.consents.get_mut(&holder_id) {
                    if holder.is_active_at(now) {
                        return Err(LedgerError::Conflict(
                            "An active consent already exists for this doctor".to_string(),
                        ));
                    }
                    if holder.status == ConsentStatus::Active {
                        holder.expire(now);
                    }
                }
            }
        }
        self.active_consents.insert(slot, consent.id);
        Ok(())
    }

    fn release_active_slot(&mut self, consent: &Consent) {
        let slot = (consent.patient_id, consent.doctor_id);
        if self.active_consents.get(&slot) == Some(&consent.id) {
            self.active_consents.remove(&slot);
        }
    }
}

/// Process-local engine. All tables sit behind a single lock so that every
/// multi-table change is atomic.
#[derive(Debug, Clone)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
    config: StorageConfig,
}

impl InMemoryStorage {
    pub fn new(config: StorageConfig) -> Self {
        InMemoryStorage {
            tables: Arc::new(RwLock::new(Tables::default())),
            config,
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        InMemoryStorage::new(StorageConfig::in_memory())
    }
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> chrono::DateTime<Utc>) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(created_at(row)));
    rows
}

#[async_trait]
impl UserDirectory for InMemoryStorage {
    async fn upsert_user(&self, user: &User) -> LedgerResult<()> {
        self.tables.write().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> LedgerResult<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStorage {
    async fn insert_connection(&self, connection: &Connection) -> LedgerResult<()> {
        let mut tables = self.tables.write().await;
        let pair = unordered_pair(connection.requester_id, connection.target_id);
        if tables.connection_pairs.contains_key(&pair) {
            return Err(LedgerError::Conflict("Connection already exists".to_string()));
        }
        tables.connection_pairs.insert(pair, connection.id);
        tables.connections.insert(connection.id, connection.clone());
        Ok(())
    }

    async fn get_connection(&self, id: &ConnectionId) -> LedgerResult<Option<Connection>> {
        Ok(self.tables.read().await.connections.get(id).cloned())
    }

    async fn find_connection_between(&self, a: &UserId, b: &UserId) -> LedgerResult<Option<Connection>> {
        let tables = self.tables.read().await;
        Ok(tables
            .connection_pairs
            .get(&unordered_pair(*a, *b))
            .and_then(|id| tables.connections.get(id))
            .cloned())
    }

    async fn save_connection(&self, updated: &Connection, previous: &Connection) -> LedgerResult<()> {
        let mut tables = self.tables.write().await;
        match tables.connections.get(&updated.id) {
            None => return Err(LedgerError::NotFound("Connection not found".to_string())),
            Some(current) if current != previous => {
                return Err(LedgerError::Conflict("Connection was modified concurrently".to_string()));
            }
            Some(_) => {}
        }
        tables.connections.insert(updated.id, updated.clone());
        Ok(())
    }

    async fn list_connections_for_user(&self, user_id: &UserId) -> LedgerResult<Vec<Connection>> {
        let tables = self.tables.read().await;
        let rows: Vec<Connection> = tables
            .connections
            .values()
            .filter(|connection| connection.involves(user_id))
            .cloned()
            .collect();
        Ok(newest_first(rows, |connection| connection.created_at))
    }

    async fn delete_connection(&self, id: &ConnectionId) -> LedgerResult<Option<Connection>> {
        let mut tables = self.tables.write().await;
        let removed = tables.connections.remove(id);
        if let Some(connection) = &removed {
            tables
                .connection_pairs
                .remove(&unordered_pair(connection.requester_id, connection.target_id));
        }
        Ok(removed)
    }

    async fn all_connections(&self) -> LedgerResult<Vec<Connection>> {
        Ok(self.tables.read().await.connections.values().cloned().collect())
    }
}

#[async_trait]
impl ConsentStore for InMemoryStorage {
    async fn insert_consent(&self, consent: &Consent) -> LedgerResult<()> {
        let mut tables = self.tables.write().await;
        if tables.consents.contains_key(&consent.id) {
            return Err(LedgerError::Conflict(format!("Consent {} already exists", consent.id)));
        }
        if consent.status == ConsentStatus::Active {
            tables.claim_active_slot(consent)?;
        }
        tables.consents.insert(consent.id, consent.clone());
        Ok(())
    }

    async fn get_consent(&self, id: &ConsentId) -> LedgerResult<Option<Consent>> {
        Ok(self.tables.read().await.consents.get(id).cloned())
    }

    async fn find_active_consent(&self, patient_id: &UserId, doctor_id: &UserId) -> LedgerResult<Option<Consent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .active_consents
            .get(&(*patient_id, *doctor_id))
            .and_then(|id| tables.consents.get(id))
            .cloned())
    }

    async fn save_consent(&self, updated: &Consent, previous: &Consent) -> LedgerResult<()> {
        let mut tables = self.tables.write().await;
        match tables.consents.get(&updated.id) {
            None => return Err(LedgerError::NotFound("Consent not found".to_string())),
            Some(current) if current != previous => {
                return Err(LedgerError::Conflict("Consent was modified concurrently".to_string()));
            }
            Some(_) => {}
        }
        let was_active = previous.status == ConsentStatus::Active;
        let is_active = updated.status == ConsentStatus::Active;
        if is_active && !was_active {
            tables.claim_active_slot(updated)?;
        } else if was_active && !is_active {
            tables.release_active_slot(updated);
        }
        tables.consents.insert(updated.id, updated.clone());
        Ok(())
    }

    async fn list_consents_for_patient(&self, patient_id: &UserId) -> LedgerResult<Vec<Consent>> {
        let tables = self.tables.read().await;
        let rows: Vec<Consent> = tables
            .consents
            .values()
            .filter(|consent| consent.patient_id == *patient_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |consent| consent.created_at))
    }

    async fn list_consents_for_doctor(&self, doctor_id: &UserId) -> LedgerResult<Vec<Consent>> {
        let tables = self.tables.read().await;
        let rows: Vec<Consent> = tables
            .consents
            .values()
            .filter(|consent| consent.doctor_id == *doctor_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |consent| consent.created_at))
    }

    async fn all_consents(&self) -> LedgerResult<Vec<Consent>> {
        Ok(self.tables.read().await.consents.values().cloned().collect())
    }
}

#[async_trait]
impl AccessLogStore for InMemoryStorage {
    async fn append(&self, log: &AccessLog) -> LedgerResult<()> {
        self.tables.write().await.access_logs.push(log.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId, limit: usize) -> LedgerResult<Vec<AccessLog>> {
        let tables = self.tables.read().await;
        let rows: Vec<AccessLog> = tables.access_logs.iter().rev().filter(|log| log.user_id == *user_id).cloned().collect();
        let mut rows = newest_first(rows, |log| log.accessed_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_for_record(&self, record_id: &RecordId, limit: usize) -> LedgerResult<Vec<AccessLog>> {
        let tables = self.tables.read().await;
        let rows: Vec<AccessLog> = tables.access_logs.iter().rev().filter(|log| log.record_id == *record_id).cloned().collect();
        let mut rows = newest_first(rows, |log| log.accessed_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn list_for_consent(&self, consent_id: &ConsentId) -> LedgerResult<Vec<AccessLog>> {
        let tables = self.tables.read().await;
        let rows: Vec<AccessLog> = tables
            .access_logs
            .iter()
            .rev()
            .filter(|log| log.consent_id == Some(*consent_id))
            .cloned()
            .collect();
        Ok(newest_first(rows, |log| log.accessed_at))
    }

    async fn all_logs(&self) -> LedgerResult<Vec<AccessLog>> {
        Ok(self.tables.read().await.access_logs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use models::medical::{AccessAction, AccessResult, ConnectionType, ConsentPermission, ConsentType};

    fn consent(patient: UserId, doctor: UserId) -> Consent {
        Consent::new(patient, doctor, ConsentType::RecordAccess, ConsentPermission::View, None, None)
    }

    fn active(patient: UserId, doctor: UserId) -> Consent {
        let mut consent = consent(patient, doctor);
        consent.grant(patient, Utc::now());
        consent
    }

    #[tokio::test]
    async fn connection_pairs_are_unordered() {
        let storage = InMemoryStorage::default();
        let (a, b) = (UserId::new(), UserId::new());
        storage
            .insert_connection(&Connection::new(a, b, ConnectionType::DoctorPatient, None))
            .await
            .unwrap();
        let reverse = Connection::new(b, a, ConnectionType::DoctorPatient, None);
        assert!(matches!(storage.insert_connection(&reverse).await, Err(LedgerError::Conflict(_))));
        assert!(storage.find_connection_between(&b, &a).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_frees_the_pair() {
        let storage = InMemoryStorage::default();
        let (a, b) = (UserId::new(), UserId::new());
        let connection = Connection::new(a, b, ConnectionType::Caretaker, None);
        storage.insert_connection(&connection).await.unwrap();
        assert_eq!(storage.delete_connection(&connection.id).await.unwrap(), Some(connection.clone()));
        assert!(storage.find_connection_between(&a, &b).await.unwrap().is_none());
        storage
            .insert_connection(&Connection::new(b, a, ConnectionType::Caretaker, None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stale_save_is_rejected() {
        let storage = InMemoryStorage::default();
        let connection = Connection::new(UserId::new(), UserId::new(), ConnectionType::DoctorPatient, None);
        storage.insert_connection(&connection).await.unwrap();

        let mut first = connection.clone();
        first.accept(connection.target_id, None, Utc::now());
        storage.save_connection(&first, &connection).await.unwrap();

        let mut second = connection.clone();
        second.reject(connection.target_id, None, Utc::now());
        assert!(matches!(storage.save_connection(&second, &connection).await, Err(LedgerError::Conflict(_))));
    }

    #[tokio::test]
    async fn second_active_consent_conflicts() {
        let storage = InMemoryStorage::default();
        let (patient, doctor) = (UserId::new(), UserId::new());
        storage.insert_consent(&active(patient, doctor)).await.unwrap();
        assert!(matches!(
            storage.insert_consent(&active(patient, doctor)).await,
            Err(LedgerError::Conflict(_))
        ));
        // The slot is directional.
        storage.insert_consent(&active(doctor, patient)).await.unwrap();
    }

    #[tokio::test]
    async fn expired_holder_is_displaced() {
        let storage = InMemoryStorage::default();
        let (patient, doctor) = (UserId::new(), UserId::new());
        let mut stale = active(patient, doctor);
        stale.expires_at = Some(Utc::now() - Duration::hours(1));
        storage.insert_consent(&stale).await.unwrap();

        let fresh = active(patient, doctor);
        storage.insert_consent(&fresh).await.unwrap();

        let displaced = storage.get_consent(&stale.id).await.unwrap().unwrap();
        assert_eq!(displaced.status, ConsentStatus::Expired);
        let holder = storage.find_active_consent(&patient, &doctor).await.unwrap().unwrap();
        assert_eq!(holder.id, fresh.id);
    }

    #[tokio::test]
    async fn revoking_releases_the_slot() {
        let storage = InMemoryStorage::default();
        let (patient, doctor) = (UserId::new(), UserId::new());
        let granted = active(patient, doctor);
        storage.insert_consent(&granted).await.unwrap();

        let mut revoked = granted.clone();
        revoked.revoke(patient, Some("no longer needed".to_string()), Utc::now());
        storage.save_consent(&revoked, &granted).await.unwrap();
        assert!(storage.find_active_consent(&patient, &doctor).await.unwrap().is_none());

        let pending = consent(patient, doctor);
        storage.insert_consent(&pending).await.unwrap();
        let mut granted_again = pending.clone();
        granted_again.grant(patient, Utc::now());
        storage.save_consent(&granted_again, &pending).await.unwrap();
        assert_eq!(
            storage.find_active_consent(&patient, &doctor).await.unwrap().map(|c| c.id),
            Some(pending.id)
        );
    }

    #[tokio::test]
    async fn logs_are_listed_newest_first_with_limit() {
        let storage = InMemoryStorage::default();
        let user = UserId::new();
        let record = RecordId::new();
        let base = Utc::now();
        for minutes in 0..5 {
            let mut log = AccessLog::new(user, UserId::new(), record, AccessAction::View, AccessResult::Success);
            log.accessed_at = base + Duration::minutes(minutes);
            storage.append(&log).await.unwrap();
        }
        let logs = storage.list_for_user(&user, 3).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert!(logs.windows(2).all(|pair| pair[0].accessed_at >= pair[1].accessed_at));
        assert_eq!(logs[0].accessed_at, base + Duration::minutes(4));
        assert_eq!(storage.list_for_record(&record, 10).await.unwrap().len(), 5);
    }
}
