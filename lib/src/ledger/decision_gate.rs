// lib/src/ledger/decision_gate.rs

use std::sync::Arc;

use log::{info, warn};
use models::errors::{LedgerError, LedgerResult};
use models::identifiers::{AccessLogId, RecordId, UserId};
use models::medical::{AccessAction, AccessLog, AccessMetadata, AccessResult, Consent, Identity, UserRole};
use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::ledger::access_log::AccessAuditLog;
use crate::ledger::consent_ledger::ConsentLedger;

/// The protected resource kinds. Each names the patient that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessTarget {
    MedicalRecord { record_id: RecordId, patient_id: UserId },
    PatientData { patient_id: UserId },
}

impl AccessTarget {
    pub fn owner(&self) -> UserId {
        match self {
            AccessTarget::MedicalRecord { patient_id, .. } | AccessTarget::PatientData { patient_id } => *patient_id,
        }
    }

    /// Id written to the audit trail. Patient-level data is logged under
    /// the patient's own id.
    pub fn audit_id(&self) -> RecordId {
        match self {
            AccessTarget::MedicalRecord { record_id, .. } => *record_id,
            AccessTarget::PatientData { patient_id } => RecordId::from(*patient_id.as_uuid()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub requester: Identity,
    pub target: AccessTarget,
    pub action: AccessAction,
    pub metadata: AccessMetadata,
}

impl AccessRequest {
    pub fn new(requester: Identity, target: AccessTarget, action: AccessAction) -> Self {
        AccessRequest { requester, target, action, metadata: AccessMetadata::default() }
    }

    pub fn with_metadata(mut self, metadata: AccessMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn log_entry(&self, result: AccessResult, consent: Option<&Consent>) -> AccessLog {
        AccessLog::new(self.requester.id, self.target.owner(), self.target.audit_id(), self.action, result)
            .with_consent(consent.map(|consent| consent.id))
            .with_metadata(self.metadata.clone())
    }
}

/// Why an access was allowed.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessBasis {
    Owner,
    Administrative,
    Consent(Consent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    pub basis: AccessBasis,
    /// The audit row written for this decision; owners are not logged.
    pub log_id: Option<AccessLogId>,
}

/// Turns "may X do Y to Z" into allow or deny. Every allow for someone other
/// than the owner returns only after its audit row is stored; every deny
/// raises `Forbidden` with the same message whatever the cause.
pub struct DecisionGate {
    ledger: Arc<ConsentLedger>,
    audit: Arc<AccessAuditLog>,
    policy: Arc<PolicyConfig>,
}

impl DecisionGate {
    pub fn new(ledger: Arc<ConsentLedger>, audit: Arc<AccessAuditLog>, policy: Arc<PolicyConfig>) -> Self {
        DecisionGate { ledger, audit, policy }
    }

    pub async fn authorize(&self, request: AccessRequest) -> LedgerResult<AccessDecision> {
        let requester = &request.requester;
        let owner = request.target.owner();

        // Only patients own records; anyone else naming themselves as the
        // owner falls through to the consent check and is logged.
        if requester.id == owner && requester.role == UserRole::Patient {
            return Ok(AccessDecision { basis: AccessBasis::Owner, log_id: None });
        }

        if requester.is_admin() {
            let log_id = if self.policy.audit_admin_access {
                let entry = request
                    .log_entry(AccessResult::Success, None)
                    .with_details("administrative access");
                Some(self.audit.record(entry).await?.id)
            } else {
                None
            };
            info!(
                "Administrator {} granted {} on data of patient {}",
                requester.id,
                request.action.as_str(),
                owner
            );
            return Ok(AccessDecision { basis: AccessBasis::Administrative, log_id });
        }

        match self.ledger.matching_consent(owner, requester.id).await? {
            Some(consent) if consent.permission.allows(request.action) => {
                let entry = request.log_entry(AccessResult::Success, Some(&consent));
                let logged = self.audit.record(entry).await?;
                Ok(AccessDecision { basis: AccessBasis::Consent(consent), log_id: Some(logged.id) })
            }
            Some(consent) => {
                warn!(
                    "User {} denied {}: consent {} only grants {}",
                    requester.id,
                    request.action.as_str(),
                    consent.id,
                    consent.permission.as_str()
                );
                let entry = request
                    .log_entry(AccessResult::Denied, Some(&consent))
                    .with_details(format!("permission {} does not cover {}", consent.permission.as_str(), request.action.as_str()));
                self.audit.record_best_effort(entry).await;
                Err(denied())
            }
            None => {
                warn!("User {} denied {}: no active consent", requester.id, request.action.as_str());
                self.audit.record_best_effort(request.log_entry(AccessResult::Denied, None)).await;
                Err(denied())
            }
        }
    }

    /// Convenience for callers that only need a yes or no. Denials come back
    /// as `Ok(false)`; other failures propagate.
    pub async fn is_allowed(&self, request: AccessRequest) -> LedgerResult<bool> {
        match self.authorize(request).await {
            Ok(_) => Ok(true),
            Err(LedgerError::Forbidden(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn denied() -> LedgerError {
    LedgerError::Forbidden("Access denied".to_string())
}
