// lib/src/ledger/connection_registry.rs

use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};
use models::errors::{LedgerError, LedgerResult};
use models::events::LedgerEvent;
use models::identifiers::{ConnectionId, UserId};
use models::medical::{Connection, ConnectionStatus, ConnectionType, Identity};

use crate::config::PolicyConfig;
use crate::events::EventSink;
use crate::ledger::validation::{distinct_parties, optional_text};
use crate::storage_engine::{ConnectionStore, Storage, UserDirectory};

/// Relationship requests between two users. One row per unordered pair.
pub struct ConnectionRegistry {
    users: Arc<dyn UserDirectory>,
    connections: Arc<dyn ConnectionStore>,
    events: Arc<dyn EventSink>,
    policy: Arc<PolicyConfig>,
}

impl ConnectionRegistry {
    pub fn new(storage: &Storage, events: Arc<dyn EventSink>, policy: Arc<PolicyConfig>) -> Self {
        ConnectionRegistry {
            users: storage.users.clone(),
            connections: storage.connections.clone(),
            events,
            policy,
        }
    }

    async fn load(&self, connection_id: &ConnectionId) -> LedgerResult<Connection> {
        self.connections
            .get_connection(connection_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("Connection not found".to_string()))
    }

    async fn require_user(&self, user_id: &UserId) -> LedgerResult<()> {
        match self.users.get_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::NotFound("User not found".to_string())),
        }
    }

    /// Opens a pending request from `requester_id` to `target_id`. Any
    /// existing row for the pair, in either direction and in any status,
    /// makes this a `Conflict`.
    pub async fn request_connection(
        &self,
        requester_id: UserId,
        target_id: UserId,
        connection_type: ConnectionType,
        message: Option<String>,
    ) -> LedgerResult<Connection> {
        distinct_parties(&requester_id, &target_id)?;
        let message = optional_text("message", message, self.policy.connection_message_min_len)?;
        self.require_user(&requester_id).await?;
        self.require_user(&target_id).await?;

        if self.connections.find_connection_between(&requester_id, &target_id).await?.is_some() {
            return Err(LedgerError::Conflict("Connection already exists".to_string()));
        }

        let connection = Connection::new(requester_id, target_id, connection_type, message);
        self.connections.insert_connection(&connection).await?;
        info!(
            "Connection {} requested by {} for {} ({})",
            connection.id,
            requester_id,
            target_id,
            connection_type.as_str()
        );

        self.events.publish(LedgerEvent::ConnectionRequested {
            connection_id: connection.id,
            requester_id,
            target_id,
            connection_type,
            message: connection.message.clone(),
        });
        Ok(connection)
    }

    /// Loads a pending connection the acting user is the target of.
    async fn load_for_response(&self, connection_id: &ConnectionId, acting_user_id: &UserId) -> LedgerResult<Connection> {
        let connection = self.load(connection_id).await?;
        if connection.target_id != *acting_user_id {
            warn!("User {} tried to respond to connection {} addressed to someone else", acting_user_id, connection_id);
            return Err(LedgerError::Forbidden("Only the target can respond to a connection request".to_string()));
        }
        if !connection.is_pending() {
            return Err(LedgerError::Conflict(format!(
                "Connection is {}, not pending",
                connection.status.as_str()
            )));
        }
        Ok(connection)
    }

    pub async fn accept(
        &self,
        connection_id: ConnectionId,
        acting_user_id: UserId,
        message: Option<String>,
    ) -> LedgerResult<Connection> {
        let current = self.load_for_response(&connection_id, &acting_user_id).await?;
        let message = optional_text("message", message, self.policy.accept_message_min_len)?;

        let mut updated = current.clone();
        updated.accept(acting_user_id, message, Utc::now());
        self.connections.save_connection(&updated, &current).await?;
        info!("Connection {} accepted by {}", connection_id, acting_user_id);
        Ok(updated)
    }

    pub async fn reject(
        &self,
        connection_id: ConnectionId,
        acting_user_id: UserId,
        reason: Option<String>,
    ) -> LedgerResult<Connection> {
        let current = self.load_for_response(&connection_id, &acting_user_id).await?;
        let reason = optional_text("reason", reason, self.policy.reject_reason_min_len)?;

        let mut updated = current.clone();
        updated.reject(acting_user_id, reason, Utc::now());
        self.connections.save_connection(&updated, &current).await?;
        info!("Connection {} rejected by {}", connection_id, acting_user_id);
        Ok(updated)
    }

    /// Either participant or an administrator may block, from any status
    /// other than blocked.
    pub async fn block(
        &self,
        connection_id: ConnectionId,
        caller: &Identity,
        reason: Option<String>,
    ) -> LedgerResult<Connection> {
        let current = self.load(&connection_id).await?;
        if !current.involves(&caller.id) && !caller.is_admin() {
            return Err(LedgerError::Forbidden("Only a participant can block a connection".to_string()));
        }
        if current.status == ConnectionStatus::Blocked {
            return Err(LedgerError::Conflict("Connection is already blocked".to_string()));
        }
        let reason = optional_text("reason", reason, self.policy.block_reason_min_len)?;

        let mut updated = current.clone();
        updated.block(caller.id, reason, Utc::now());
        self.connections.save_connection(&updated, &current).await?;
        info!("Connection {} blocked by {}", connection_id, caller.id);
        Ok(updated)
    }

    /// Administrative removal of a connection row, which frees the pair for
    /// a fresh request.
    pub async fn clear(&self, connection_id: ConnectionId, caller: &Identity) -> LedgerResult<Connection> {
        if !caller.is_admin() {
            return Err(LedgerError::Forbidden("Only administrators can clear connections".to_string()));
        }
        let removed = self
            .connections
            .delete_connection(&connection_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("Connection not found".to_string()))?;
        warn!(
            "Connection {} between {} and {} cleared by administrator {}",
            connection_id, removed.requester_id, removed.target_id, caller.id
        );
        Ok(removed)
    }

    /// Newest first, both directions.
    pub async fn list_for_user(&self, user_id: UserId) -> LedgerResult<Vec<Connection>> {
        self.connections.list_connections_for_user(&user_id).await
    }

    /// A single connection, visible to its participants and administrators.
    pub async fn get(&self, connection_id: ConnectionId, caller: &Identity) -> LedgerResult<Connection> {
        let connection = self.load(&connection_id).await?;
        if !connection.involves(&caller.id) && !caller.is_admin() {
            return Err(LedgerError::Forbidden("Access denied".to_string()));
        }
        Ok(connection)
    }

    /// The connection between two users, if any, in either direction.
    pub async fn between(&self, a: UserId, b: UserId) -> LedgerResult<Option<Connection>> {
        self.connections.find_connection_between(&a, &b).await
    }
}
