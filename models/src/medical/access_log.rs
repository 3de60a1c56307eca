// models/src/medical/access_log.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identifiers::{AccessLogId, ConsentId, RecordId, UserId};

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    #[default]
    View,
    Download,
    Share,
    Modify,
    Delete,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::View => "view",
            AccessAction::Download => "download",
            AccessAction::Share => "share",
            AccessAction::Modify => "modify",
            AccessAction::Delete => "delete",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessResult {
    Success,
    Denied,
    Error,
}

impl AccessResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessResult::Success => "success",
            AccessResult::Denied => "denied",
            AccessResult::Error => "error",
        }
    }
}

/// Request context captured alongside an access attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
    pub location: Option<String>,
}

/// One access attempt. Append-only: never updated, never deleted in normal flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLog {
    pub id: AccessLogId,
    pub user_id: UserId,
    /// Patient owning the accessed data.
    pub patient_id: UserId,
    pub record_id: RecordId,
    pub consent_id: Option<ConsentId>,
    pub action: AccessAction,
    pub result: AccessResult,
    pub details: Option<String>,
    pub metadata: AccessMetadata,
    pub accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AccessLog {
    pub fn new(
        user_id: UserId,
        patient_id: UserId,
        record_id: RecordId,
        action: AccessAction,
        result: AccessResult,
    ) -> Self {
        let now = Utc::now();
        AccessLog {
            id: AccessLogId::new(),
            user_id,
            patient_id,
            record_id,
            consent_id: None,
            action,
            result,
            details: None,
            metadata: AccessMetadata::default(),
            accessed_at: now,
            created_at: now,
        }
    }

    pub fn with_consent(mut self, consent_id: Option<ConsentId>) -> Self {
        self.consent_id = consent_id;
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_metadata(mut self, metadata: AccessMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
