// models/src/events.rs

use serde::{Deserialize, Serialize};

use crate::identifiers::{ConnectionId, ConsentId, RecordId, UserId};
use crate::medical::{AccessAction, AccessResult, ConnectionType, ConsentPermission};

/// Notifications the core emits for downstream subsystems. Delivery is
/// at-most-once; a lost event never rolls back the change that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    ConnectionRequested {
        connection_id: ConnectionId,
        requester_id: UserId,
        target_id: UserId,
        connection_type: ConnectionType,
        message: Option<String>,
    },
    ConsentGranted {
        consent_id: ConsentId,
        patient_id: UserId,
        doctor_id: UserId,
        permission: ConsentPermission,
        granted_by: UserId,
    },
    ConsentRevoked {
        consent_id: ConsentId,
        patient_id: UserId,
        doctor_id: UserId,
        revoked_by: UserId,
        reason: Option<String>,
    },
    RecordAccessed {
        record_id: RecordId,
        user_id: UserId,
        action: AccessAction,
        result: AccessResult,
        consent_id: Option<ConsentId>,
    },
}

impl LedgerEvent {
    /// Routing key consumers subscribe to.
    pub fn routing_key(&self) -> &'static str {
        match self {
            LedgerEvent::ConnectionRequested { .. } => "connection.requested",
            LedgerEvent::ConsentGranted { .. } => "consent.granted",
            LedgerEvent::ConsentRevoked { .. } => "consent.revoked",
            LedgerEvent::RecordAccessed { .. } => "record.accessed",
        }
    }

    /// The user whose action produced the event.
    pub fn actor(&self) -> UserId {
        match self {
            LedgerEvent::ConnectionRequested { requester_id, .. } => *requester_id,
            LedgerEvent::ConsentGranted { granted_by, .. } => *granted_by,
            LedgerEvent::ConsentRevoked { revoked_by, .. } => *revoked_by,
            LedgerEvent::RecordAccessed { user_id, .. } => *user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keys_match_subscriber_names() {
        let revoked = LedgerEvent::ConsentRevoked {
            consent_id: ConsentId::new(),
            patient_id: UserId::new(),
            doctor_id: UserId::new(),
            revoked_by: UserId::new(),
            reason: None,
        };
        assert_eq!(revoked.routing_key(), "consent.revoked");

        let json = serde_json::to_value(&revoked).unwrap();
        assert_eq!(json["event"], "consent_revoked");
    }
}
