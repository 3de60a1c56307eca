// models/src/medical/consent.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{ConsentId, UserId};
use crate::medical::access_log::AccessAction;

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentType {
    #[default]
    RecordAccess,
    EmergencyAccess,
    TemporaryAccess,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    #[default]
    Pending,
    Active,
    Revoked,
    Expired,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Pending => "pending",
            ConsentStatus::Active => "active",
            ConsentStatus::Revoked => "revoked",
            ConsentStatus::Expired => "expired",
        }
    }

    /// Revoked and expired consents never come back; a fresh consent is needed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsentStatus::Revoked | ConsentStatus::Expired)
    }

    /// Whether the stored status may move from `self` to `next`.
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(&self, next: ConsentStatus) -> bool {
        use ConsentStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Pending, Active) | (Pending, Revoked) | (Pending, Expired) | (Active, Revoked) | (Active, Expired)
        )
    }
}

/// How much a grantee may do with the patient's records.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentPermission {
    #[default]
    View,
    Download,
    FullAccess,
}

impl ConsentPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentPermission::View => "view",
            ConsentPermission::Download => "download",
            ConsentPermission::FullAccess => "full_access",
        }
    }

    /// Whether this level covers `action`. Deletion is never delegated.
    pub fn allows(&self, action: AccessAction) -> bool {
        match action {
            AccessAction::View => true,
            AccessAction::Download => matches!(self, ConsentPermission::Download | ConsentPermission::FullAccess),
            AccessAction::Share | AccessAction::Modify => *self == ConsentPermission::FullAccess,
            AccessAction::Delete => false,
        }
    }
}

/// A patient's authorization for one doctor to access their records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consent {
    pub id: ConsentId,
    pub patient_id: UserId,
    pub doctor_id: UserId,
    #[serde(rename = "type")]
    pub consent_type: ConsentType,
    pub status: ConsentStatus,
    pub permission: ConsentPermission,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub granted_by: Option<UserId>,
    pub granted_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<UserId>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoke_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Consent {
    /// Creates a pending consent.
    pub fn new(
        patient_id: UserId,
        doctor_id: UserId,
        consent_type: ConsentType,
        permission: ConsentPermission,
        description: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Consent {
            id: ConsentId::new(),
            patient_id,
            doctor_id,
            consent_type,
            status: ConsentStatus::Pending,
            permission,
            description,
            expires_at,
            granted_by: None,
            granted_at: None,
            revoked_by: None,
            revoked_at: None,
            revoke_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived: stored status is active and the expiry, if any, lies ahead of `now`.
    /// Never persisted.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Active && self.expires_at.is_none_or(|expires| expires > now)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires| expires <= now)
    }

    /// Stored as active but past its expiry: looks active in storage, is not.
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Active && self.is_expired_at(now)
    }

    pub fn grant(&mut self, by: UserId, now: DateTime<Utc>) {
        self.status = ConsentStatus::Active;
        self.granted_by = Some(by);
        self.granted_at = Some(now);
        self.updated_at = now;
    }

    pub fn revoke(&mut self, by: UserId, reason: Option<String>, now: DateTime<Utc>) {
        self.status = ConsentStatus::Revoked;
        self.revoked_by = Some(by);
        self.revoked_at = Some(now);
        self.revoke_reason = reason;
        self.updated_at = now;
    }

    pub fn expire(&mut self, now: DateTime<Utc>) {
        self.status = ConsentStatus::Expired;
        self.updated_at = now;
    }
}

/// Partial update applied through the ledger's update operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsentPatch {
    pub status: Option<ConsentStatus>,
    pub permission: Option<ConsentPermission>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Required when the patch revokes an active consent.
    pub reason: Option<String>,
}

impl ConsentPatch {
    pub fn revoke(reason: impl Into<String>) -> Self {
        ConsentPatch { status: Some(ConsentStatus::Revoked), reason: Some(reason.into()), ..Default::default() }
    }

    pub fn grant() -> Self {
        ConsentPatch { status: Some(ConsentStatus::Active), ..Default::default() }
    }

    /// True when the patch touches anything besides status and reason.
    pub fn changes_terms(&self) -> bool {
        self.permission.is_some() || self.description.is_some() || self.expires_at.is_some()
    }
}
