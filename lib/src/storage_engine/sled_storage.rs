// lib/src/storage_engine/sled_storage.rs

use super::config::StorageConfig;
use super::storage_engine::{AccessLogStore, ConnectionStore, ConsentStore, UserDirectory};
use super::storage_utils::{deserialize, index_key, ordered_pair_key, pair_key, serialize};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info};
use models::errors::{LedgerError, LedgerResult};
use models::identifiers::{ConnectionId, ConsentId, RecordId, UserId};
use models::medical::{AccessLog, Connection, Consent, ConsentStatus, User};
use serde::de::DeserializeOwned;
use sled::transaction::{ConflictableTransactionError, TransactionalTree, Transactional};
use sled::{CompareAndSwapError, Db, Tree};

type TxResult<T> = Result<T, ConflictableTransactionError<LedgerError>>;

fn abort(err: LedgerError) -> ConflictableTransactionError<LedgerError> {
    ConflictableTransactionError::Abort(err)
}

fn tx_decode<T: DeserializeOwned>(bytes: &[u8]) -> TxResult<T> {
    deserialize(bytes).map_err(abort)
}

/// Opens (creating if needed) the sled database at the configured path.
pub fn open_sled_db(config: &StorageConfig) -> LedgerResult<Db> {
    std::fs::create_dir_all(&config.data_path).map_err(|e| {
        error!("Failed to create sled directory at {:?}: {}", config.data_path, e);
        LedgerError::StorageUnavailable(format!(
            "Cannot create data directory {}: {}",
            config.data_path.display(),
            e
        ))
    })?;
    let db = sled::Config::new()
        .path(&config.data_path)
        .cache_capacity(config.cache_capacity)
        .open()?;
    info!("Opened sled database at {:?}", config.data_path);
    Ok(db)
}

/// Durable engine. Each table is a sled tree; secondary indexes map
/// `owner ‖ time ‖ row id` to the row id so prefix scans list by owner in
/// time order. Multi-tree writes run inside sled transactions.
pub struct SledStorage {
    db: Db,
    users: Tree,
    connections: Tree,
    connection_pairs: Tree,
    connections_by_user: Tree,
    consents: Tree,
    consent_active: Tree,
    consents_by_patient: Tree,
    consents_by_doctor: Tree,
    access_logs: Tree,
    access_logs_by_user: Tree,
    access_logs_by_record: Tree,
    access_logs_by_consent: Tree,
    flush_on_audit: bool,
}

impl SledStorage {
    pub fn new(db: Db, flush_on_audit: bool) -> LedgerResult<Self> {
        Ok(SledStorage {
            users: db.open_tree("users")?,
            connections: db.open_tree("connections")?,
            connection_pairs: db.open_tree("connection_pairs")?,
            connections_by_user: db.open_tree("connections_by_user")?,
            consents: db.open_tree("consents")?,
            consent_active: db.open_tree("consent_active")?,
            consents_by_patient: db.open_tree("consents_by_patient")?,
            consents_by_doctor: db.open_tree("consents_by_doctor")?,
            access_logs: db.open_tree("access_logs")?,
            access_logs_by_user: db.open_tree("access_logs_by_user")?,
            access_logs_by_record: db.open_tree("access_logs_by_record")?,
            access_logs_by_consent: db.open_tree("access_logs_by_consent")?,
            flush_on_audit,
            db,
        })
    }

    pub fn open(config: &StorageConfig) -> LedgerResult<Self> {
        let db = open_sled_db(config)?;
        SledStorage::new(db, config.flush_on_audit)
    }

    pub async fn flush(&self) -> LedgerResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn get_row<T: DeserializeOwned>(tree: &Tree, id: &[u8]) -> LedgerResult<Option<T>> {
        tree.get(id)?.map(|bytes| deserialize(&bytes)).transpose()
    }

    fn all_rows<T: DeserializeOwned>(tree: &Tree) -> LedgerResult<Vec<T>> {
        tree.iter()
            .values()
            .map(|bytes| deserialize(&bytes?))
            .collect()
    }

    /// Walks an index newest first and resolves each entry in `primary`.
    fn scan_index<T: DeserializeOwned>(
        index: &Tree,
        primary: &Tree,
        owner: &[u8],
        limit: Option<usize>,
    ) -> LedgerResult<Vec<T>> {
        let mut rows = Vec::new();
        for entry in index.scan_prefix(owner).rev() {
            if limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
            let (_, row_id) = entry?;
            match primary.get(&row_id)? {
                Some(bytes) => rows.push(deserialize(&bytes)?),
                None => debug!("Index entry points at missing row {:?}", row_id),
            }
        }
        Ok(rows)
    }

    /// Points the (patient, doctor) slot at `claimant`, inside a transaction
    /// over the consents and slot trees.
    fn claim_slot(
        consents: &TransactionalTree,
        active: &TransactionalTree,
        slot: &[u8],
        claimant: &ConsentId,
    ) -> TxResult<()> {
        if let Some(holder_id) = active.get(slot)? {
            if &holder_id[..] != claimant.as_bytes().as_slice() {
                if let Some(bytes) = consents.get(holder_id.clone())? {
                    let mut holder: Consent = tx_decode(&bytes)?;
                    let now = Utc::now();
                    if holder.is_active_at(now) {
                        return Err(abort(LedgerError::Conflict(
                            "An active consent already exists for this doctor".to_string(),
                        )));
                    }
                    if holder.status == ConsentStatus::Active {
                        holder.expire(now);
                        consents.insert(holder_id, serialize(&holder).map_err(abort)?)?;
                    }
                }
            }
        }
        active.insert(slot, claimant.as_bytes().as_slice())?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for SledStorage {
    async fn upsert_user(&self, user: &User) -> LedgerResult<()> {
        self.users.insert(user.id.as_bytes(), serialize(user)?)?;
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> LedgerResult<Option<User>> {
        Self::get_row(&self.users, id.as_bytes())
    }
}

#[async_trait]
impl ConnectionStore for SledStorage {
    async fn insert_connection(&self, connection: &Connection) -> LedgerResult<()> {
        let value = serialize(connection)?;
        let id = connection.id.as_bytes().as_slice();
        let pair = pair_key(&connection.requester_id, &connection.target_id);
        let by_requester = index_key(connection.requester_id.as_bytes(), &connection.created_at, connection.id.as_bytes());
        let by_target = index_key(connection.target_id.as_bytes(), &connection.created_at, connection.id.as_bytes());

        (&self.connections, &self.connection_pairs, &self.connections_by_user).transaction(
            |(connections, pairs, by_user)| -> TxResult<()> {
                if pairs.get(pair.as_slice())?.is_some() {
                    return Err(abort(LedgerError::Conflict("Connection already exists".to_string())));
                }
                pairs.insert(pair.as_slice(), id)?;
                connections.insert(id, value.as_slice())?;
                by_user.insert(by_requester.as_slice(), id)?;
                by_user.insert(by_target.as_slice(), id)?;
                Ok(())
            },
        )?;
        Ok(())
    }

    async fn get_connection(&self, id: &ConnectionId) -> LedgerResult<Option<Connection>> {
        Self::get_row(&self.connections, id.as_bytes())
    }

    async fn find_connection_between(&self, a: &UserId, b: &UserId) -> LedgerResult<Option<Connection>> {
        match self.connection_pairs.get(pair_key(a, b))? {
            Some(id) => Self::get_row(&self.connections, &id),
            None => Ok(None),
        }
    }

    async fn save_connection(&self, updated: &Connection, previous: &Connection) -> LedgerResult<()> {
        let expected = serialize(previous)?;
        let value = serialize(updated)?;
        match self
            .connections
            .compare_and_swap(updated.id.as_bytes(), Some(expected), Some(value))?
        {
            Ok(()) => Ok(()),
            Err(CompareAndSwapError { current: None, .. }) => {
                Err(LedgerError::NotFound("Connection not found".to_string()))
            }
            Err(_) => Err(LedgerError::Conflict("Connection was modified concurrently".to_string())),
        }
    }

    async fn list_connections_for_user(&self, user_id: &UserId) -> LedgerResult<Vec<Connection>> {
        Self::scan_index(&self.connections_by_user, &self.connections, user_id.as_bytes(), None)
    }

    async fn delete_connection(&self, id: &ConnectionId) -> LedgerResult<Option<Connection>> {
        let key = id.as_bytes().as_slice();
        let removed = (&self.connections, &self.connection_pairs, &self.connections_by_user).transaction(
            |(connections, pairs, by_user)| -> TxResult<Option<Connection>> {
                let Some(bytes) = connections.remove(key)? else {
                    return Ok(None);
                };
                let connection: Connection = tx_decode(&bytes)?;
                pairs.remove(pair_key(&connection.requester_id, &connection.target_id))?;
                by_user.remove(index_key(connection.requester_id.as_bytes(), &connection.created_at, id.as_bytes()))?;
                by_user.remove(index_key(connection.target_id.as_bytes(), &connection.created_at, id.as_bytes()))?;
                Ok(Some(connection))
            },
        )?;
        Ok(removed)
    }

    async fn all_connections(&self) -> LedgerResult<Vec<Connection>> {
        Self::all_rows(&self.connections)
    }
}

#[async_trait]
impl ConsentStore for SledStorage {
    async fn insert_consent(&self, consent: &Consent) -> LedgerResult<()> {
        let value = serialize(consent)?;
        let id = consent.id.as_bytes().as_slice();
        let slot = ordered_pair_key(&consent.patient_id, &consent.doctor_id);
        let patient_key = index_key(consent.patient_id.as_bytes(), &consent.created_at, consent.id.as_bytes());
        let doctor_key = index_key(consent.doctor_id.as_bytes(), &consent.created_at, consent.id.as_bytes());
        let claims_slot = consent.status == ConsentStatus::Active;

        (&self.consents, &self.consent_active, &self.consents_by_patient, &self.consents_by_doctor).transaction(
            |(consents, active, by_patient, by_doctor)| -> TxResult<()> {
                if consents.get(id)?.is_some() {
                    return Err(abort(LedgerError::Conflict(format!("Consent {} already exists", consent.id))));
                }
                if claims_slot {
                    Self::claim_slot(consents, active, &slot, &consent.id)?;
                }
                consents.insert(id, value.as_slice())?;
                by_patient.insert(patient_key.as_slice(), id)?;
                by_doctor.insert(doctor_key.as_slice(), id)?;
                Ok(())
            },
        )?;
        Ok(())
    }

    async fn get_consent(&self, id: &ConsentId) -> LedgerResult<Option<Consent>> {
        Self::get_row(&self.consents, id.as_bytes())
    }

    async fn find_active_consent(&self, patient_id: &UserId, doctor_id: &UserId) -> LedgerResult<Option<Consent>> {
        match self.consent_active.get(ordered_pair_key(patient_id, doctor_id))? {
            Some(id) => Self::get_row(&self.consents, &id),
            None => Ok(None),
        }
    }

    async fn save_consent(&self, updated: &Consent, previous: &Consent) -> LedgerResult<()> {
        let expected = serialize(previous)?;
        let value = serialize(updated)?;
        let id = updated.id.as_bytes().as_slice();
        let slot = ordered_pair_key(&updated.patient_id, &updated.doctor_id);
        let was_active = previous.status == ConsentStatus::Active;
        let is_active = updated.status == ConsentStatus::Active;

        (&self.consents, &self.consent_active).transaction(|(consents, active)| -> TxResult<()> {
            match consents.get(id)? {
                None => return Err(abort(LedgerError::NotFound("Consent not found".to_string()))),
                Some(current) if &current[..] != expected.as_slice() => {
                    return Err(abort(LedgerError::Conflict("Consent was modified concurrently".to_string())));
                }
                Some(_) => {}
            }
            if is_active && !was_active {
                Self::claim_slot(consents, active, &slot, &updated.id)?;
            } else if was_active && !is_active {
                if active.get(slot.as_slice())?.is_some_and(|holder| &holder[..] == id) {
                    active.remove(slot.as_slice())?;
                }
            }
            consents.insert(id, value.as_slice())?;
            Ok(())
        })?;
        Ok(())
    }

    async fn list_consents_for_patient(&self, patient_id: &UserId) -> LedgerResult<Vec<Consent>> {
        Self::scan_index(&self.consents_by_patient, &self.consents, patient_id.as_bytes(), None)
    }

    async fn list_consents_for_doctor(&self, doctor_id: &UserId) -> LedgerResult<Vec<Consent>> {
        Self::scan_index(&self.consents_by_doctor, &self.consents, doctor_id.as_bytes(), None)
    }

    async fn all_consents(&self) -> LedgerResult<Vec<Consent>> {
        Self::all_rows(&self.consents)
    }
}

#[async_trait]
impl AccessLogStore for SledStorage {
    async fn append(&self, log: &AccessLog) -> LedgerResult<()> {
        let value = serialize(log)?;
        let id = log.id.as_bytes().as_slice();
        let user_key = index_key(log.user_id.as_bytes(), &log.accessed_at, log.id.as_bytes());
        let record_key = index_key(log.record_id.as_bytes(), &log.accessed_at, log.id.as_bytes());
        let consent_key = log
            .consent_id
            .map(|consent_id| index_key(consent_id.as_bytes(), &log.accessed_at, log.id.as_bytes()));

        (
            &self.access_logs,
            &self.access_logs_by_user,
            &self.access_logs_by_record,
            &self.access_logs_by_consent,
        )
            .transaction(|(logs, by_user, by_record, by_consent)| -> TxResult<()> {
                logs.insert(id, value.as_slice())?;
                by_user.insert(user_key.as_slice(), id)?;
                by_record.insert(record_key.as_slice(), id)?;
                if let Some(key) = &consent_key {
                    by_consent.insert(key.as_slice(), id)?;
                }
                Ok(())
            })?;

        if self.flush_on_audit {
            self.db.flush_async().await?;
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: &UserId, limit: usize) -> LedgerResult<Vec<AccessLog>> {
        Self::scan_index(&self.access_logs_by_user, &self.access_logs, user_id.as_bytes(), Some(limit))
    }

    async fn list_for_record(&self, record_id: &RecordId, limit: usize) -> LedgerResult<Vec<AccessLog>> {
        Self::scan_index(&self.access_logs_by_record, &self.access_logs, record_id.as_bytes(), Some(limit))
    }

    async fn list_for_consent(&self, consent_id: &ConsentId) -> LedgerResult<Vec<AccessLog>> {
        Self::scan_index(&self.access_logs_by_consent, &self.access_logs, consent_id.as_bytes(), None)
    }

    async fn all_logs(&self) -> LedgerResult<Vec<AccessLog>> {
        Self::all_rows(&self.access_logs)
    }
}
