// models/src/medical/connection.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{ConnectionId, UserId};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    #[default]
    DoctorPatient,
    FamilyMember,
    Caretaker,
    EmergencyContact,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::DoctorPatient => "doctor_patient",
            ConnectionType::FamilyMember => "family_member",
            ConnectionType::Caretaker => "caretaker",
            ConnectionType::EmergencyContact => "emergency_contact",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Rejected => "rejected",
            ConnectionStatus::Blocked => "blocked",
        }
    }
}

/// A relationship request between two users. One row per unordered pair;
/// both participants see the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub requester_id: UserId,
    pub target_id: UserId,
    #[serde(rename = "type")]
    pub connection_type: ConnectionType,
    pub status: ConnectionStatus,
    pub message: Option<String>,
    pub response_message: Option<String>,
    pub accepted_by: Option<UserId>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub blocked_by: Option<UserId>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub block_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Creates a pending request from `requester_id` to `target_id`.
    pub fn new(
        requester_id: UserId,
        target_id: UserId,
        connection_type: ConnectionType,
        message: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Connection {
            id: ConnectionId::new(),
            requester_id,
            target_id,
            connection_type,
            status: ConnectionStatus::Pending,
            message,
            response_message: None,
            accepted_by: None,
            accepted_at: None,
            rejected_by: None,
            rejected_at: None,
            reject_reason: None,
            blocked_by: None,
            blocked_at: None,
            block_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived: an accepted connection is the only active one.
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Accepted
    }

    pub fn is_pending(&self) -> bool {
        self.status == ConnectionStatus::Pending
    }

    pub fn involves(&self, user_id: &UserId) -> bool {
        self.requester_id == *user_id || self.target_id == *user_id
    }

    /// The participant that is not `user_id`, if `user_id` takes part at all.
    pub fn other_party(&self, user_id: &UserId) -> Option<UserId> {
        if self.requester_id == *user_id {
            Some(self.target_id)
        } else if self.target_id == *user_id {
            Some(self.requester_id)
        } else {
            None
        }
    }

    pub fn accept(&mut self, by: UserId, message: Option<String>, now: DateTime<Utc>) {
        self.status = ConnectionStatus::Accepted;
        self.accepted_by = Some(by);
        self.accepted_at = Some(now);
        self.response_message = message;
        self.updated_at = now;
    }

    pub fn reject(&mut self, by: UserId, reason: Option<String>, now: DateTime<Utc>) {
        self.status = ConnectionStatus::Rejected;
        self.rejected_by = Some(by);
        self.rejected_at = Some(now);
        self.reject_reason = reason;
        self.updated_at = now;
    }

    pub fn block(&mut self, by: UserId, reason: Option<String>, now: DateTime<Utc>) {
        self.status = ConnectionStatus::Blocked;
        self.blocked_by = Some(by);
        self.blocked_at = Some(now);
        self.block_reason = reason;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_is_pending_and_inactive() {
        let conn = Connection::new(UserId::new(), UserId::new(), ConnectionType::DoctorPatient, None);
        assert!(conn.is_pending());
        assert!(!conn.is_active());
    }

    #[test]
    fn other_party_is_symmetric() {
        let a = UserId::new();
        let b = UserId::new();
        let conn = Connection::new(a, b, ConnectionType::Caretaker, None);
        assert_eq!(conn.other_party(&a), Some(b));
        assert_eq!(conn.other_party(&b), Some(a));
        assert_eq!(conn.other_party(&UserId::new()), None);
    }

    #[test]
    fn accept_stamps_actor_and_time() {
        let a = UserId::new();
        let b = UserId::new();
        let mut conn = Connection::new(a, b, ConnectionType::DoctorPatient, None);
        let now = Utc::now();
        conn.accept(b, Some("Happy to help".into()), now);
        assert!(conn.is_active());
        assert_eq!(conn.accepted_by, Some(b));
        assert_eq!(conn.accepted_at, Some(now));
    }

    #[test]
    fn serializes_type_field_under_its_wire_name() {
        let conn = Connection::new(UserId::new(), UserId::new(), ConnectionType::FamilyMember, None);
        let json = serde_json::to_value(&conn).unwrap();
        assert_eq!(json["type"], "family_member");
        assert_eq!(json["status"], "pending");
    }
}
