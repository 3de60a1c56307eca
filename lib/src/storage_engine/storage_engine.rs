// lib/src/storage_engine/storage_engine.rs

use async_trait::async_trait;
use models::errors::LedgerResult;
use models::identifiers::{ConnectionId, ConsentId, RecordId, UserId};
use models::medical::{AccessLog, Connection, Consent, User};

/// Read access to the identity provider's user records, plus the upsert the
/// provider uses to sync them in.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn upsert_user(&self, user: &User) -> LedgerResult<()>;
    async fn get_user(&self, id: &UserId) -> LedgerResult<Option<User>>;
}

#[async_trait]
pub trait ConnectionStore: Send + Sync + 'static {
    /// Inserts a new connection. Fails with `Conflict` if any connection
    /// already exists for the unordered pair of participants.
    async fn insert_connection(&self, connection: &Connection) -> LedgerResult<()>;
    async fn get_connection(&self, id: &ConnectionId) -> LedgerResult<Option<Connection>>;
    async fn find_connection_between(&self, a: &UserId, b: &UserId) -> LedgerResult<Option<Connection>>;
    /// Replaces `previous` with `updated`. Fails with `Conflict` when the
    /// stored row no longer equals `previous`.
    async fn save_connection(&self, updated: &Connection, previous: &Connection) -> LedgerResult<()>;
    /// Newest first.
    async fn list_connections_for_user(&self, user_id: &UserId) -> LedgerResult<Vec<Connection>>;
    async fn delete_connection(&self, id: &ConnectionId) -> LedgerResult<Option<Connection>>;
    async fn all_connections(&self) -> LedgerResult<Vec<Connection>>;
}

/// Consent persistence. Every engine keeps an active slot per
/// (patient, doctor) pair; a row entering `active` claims it atomically.
#[async_trait]
pub trait ConsentStore: Send + Sync + 'static {
    /// Inserts a consent. When the consent is active it claims the pair's
    /// slot: a slot held by a live consent yields `Conflict`, a slot held by
    /// one past its expiry is taken over and that row is marked expired.
    async fn insert_consent(&self, consent: &Consent) -> LedgerResult<()>;
    async fn get_consent(&self, id: &ConsentId) -> LedgerResult<Option<Consent>>;
    /// The consent holding the pair's active slot, whether or not its expiry
    /// has passed.
    async fn find_active_consent(&self, patient_id: &UserId, doctor_id: &UserId) -> LedgerResult<Option<Consent>>;
    /// Compare-and-swap update that claims or releases the active slot as
    /// the status moves into or out of `active`.
    async fn save_consent(&self, updated: &Consent, previous: &Consent) -> LedgerResult<()>;
    /// Newest first.
    async fn list_consents_for_patient(&self, patient_id: &UserId) -> LedgerResult<Vec<Consent>>;
    /// Newest first.
    async fn list_consents_for_doctor(&self, doctor_id: &UserId) -> LedgerResult<Vec<Consent>>;
    async fn all_consents(&self) -> LedgerResult<Vec<Consent>>;
}

/// Append-only audit trail. There is no update or delete.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccessLogStore: Send + Sync + 'static {
    async fn append(&self, log: &AccessLog) -> LedgerResult<()>;
    async fn list_for_user(&self, user_id: &UserId, limit: usize) -> LedgerResult<Vec<AccessLog>>;
    async fn list_for_record(&self, record_id: &RecordId, limit: usize) -> LedgerResult<Vec<AccessLog>>;
    async fn list_for_consent(&self, consent_id: &ConsentId) -> LedgerResult<Vec<AccessLog>>;
    async fn all_logs(&self) -> LedgerResult<Vec<AccessLog>>;
}
