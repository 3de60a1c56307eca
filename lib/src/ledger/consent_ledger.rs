// lib/src/ledger/consent_ledger.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use models::errors::{LedgerError, LedgerResult, ValidationError};
use models::events::LedgerEvent;
use models::identifiers::{ConsentId, UserId};
use models::medical::{Consent, ConsentPatch, ConsentPermission, ConsentStatus, ConsentType, Identity, UserRole};
use serde::{Deserialize, Serialize};

use crate::config::PolicyConfig;
use crate::events::EventSink;
use crate::ledger::validation::{distinct_parties, future_expiry, normalize_text, optional_text, required_text};
use crate::storage_engine::{ConsentStore, Storage, UserDirectory};

/// Input for [`ConsentLedger::create_consent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewConsent {
    pub patient_id: UserId,
    pub doctor_id: UserId,
    pub consent_type: ConsentType,
    pub permission: ConsentPermission,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Create the consent already active, granted by the patient.
    pub grant_immediately: bool,
}

impl NewConsent {
    pub fn new(patient_id: UserId, doctor_id: UserId, permission: ConsentPermission) -> Self {
        NewConsent {
            patient_id,
            doctor_id,
            consent_type: ConsentType::default(),
            permission,
            description: None,
            expires_at: None,
            grant_immediately: false,
        }
    }

    pub fn granted(mut self) -> Self {
        self.grant_immediately = true;
        self
    }
}

/// Patient-owned permission grants. The single source of truth for who may
/// read whose records.
///
/// Mutation rights: the patient (or an administrator) grants, edits terms
/// and expires; the patient, the doctor or an administrator may revoke an
/// active consent or turn down a pending one.
pub struct ConsentLedger {
    users: Arc<dyn UserDirectory>,
    consents: Arc<dyn ConsentStore>,
    events: Arc<dyn EventSink>,
    policy: Arc<PolicyConfig>,
}

impl ConsentLedger {
    pub fn new(storage: &Storage, events: Arc<dyn EventSink>, policy: Arc<PolicyConfig>) -> Self {
        ConsentLedger {
            users: storage.users.clone(),
            consents: storage.consents.clone(),
            events,
            policy,
        }
    }

    pub async fn create_consent(&self, request: NewConsent) -> LedgerResult<Consent> {
        let now = Utc::now();
        distinct_parties(&request.patient_id, &request.doctor_id)?;
        future_expiry(request.expires_at, now)?;

        if self.users.get_user(&request.patient_id).await?.is_none() {
            return Err(LedgerError::NotFound("Patient not found".to_string()));
        }
        match self.users.get_user(&request.doctor_id).await? {
            Some(doctor) if doctor.role == UserRole::Doctor => {}
            _ => return Err(LedgerError::NotFound("Doctor not found".to_string())),
        }

        if let Some(existing) = self.consents.find_active_consent(&request.patient_id, &request.doctor_id).await? {
            if existing.is_active_at(now) {
                return Err(LedgerError::Conflict(
                    "An active consent already exists for this doctor".to_string(),
                ));
            }
        }

        let mut consent = Consent::new(
            request.patient_id,
            request.doctor_id,
            request.consent_type,
            request.permission,
            normalize_text(request.description),
            request.expires_at,
        );
        if request.grant_immediately {
            consent.grant(request.patient_id, now);
        }
        // The store claims the active slot atomically with the insert.
        self.consents.insert_consent(&consent).await?;
        info!(
            "Consent {} created for patient {} and doctor {} ({})",
            consent.id,
            consent.patient_id,
            consent.doctor_id,
            consent.status.as_str()
        );

        if consent.status == ConsentStatus::Active {
            self.publish_granted(&consent, request.patient_id);
        }
        Ok(consent)
    }

    /// Applies `patch` on behalf of `caller`. Callers outside the consent
    /// get `Forbidden` whether or not the id exists.
    pub async fn update_consent(
        &self,
        consent_id: ConsentId,
        caller: &Identity,
        patch: ConsentPatch,
    ) -> LedgerResult<Consent> {
        let current = match self.consents.get_consent(&consent_id).await? {
            Some(consent) => consent,
            None if caller.is_admin() => return Err(LedgerError::NotFound("Consent not found".to_string())),
            None => return Err(LedgerError::Forbidden("Access denied".to_string())),
        };

        let is_patient = caller.id == current.patient_id;
        let is_doctor = caller.id == current.doctor_id;
        if !is_patient && !is_doctor && !caller.is_admin() {
            warn!("User {} tried to modify consent {} without rights", caller.id, consent_id);
            return Err(LedgerError::Forbidden("Access denied".to_string()));
        }
        let manages = is_patient || caller.is_admin();
        if !manages {
            if patch.changes_terms() {
                return Err(LedgerError::Forbidden("Only the patient can change consent terms".to_string()));
            }
            if matches!(patch.status, Some(status) if status != ConsentStatus::Revoked && status != current.status) {
                return Err(LedgerError::Forbidden("Doctors can only revoke a consent".to_string()));
            }
        }

        let now = Utc::now();
        let mut updated = current.clone();

        if patch.changes_terms() {
            // A lapsed active row counts as expired; extending it would revive
            // access without a grant.
            if current.status.is_terminal() || current.is_stale_at(now) {
                let status = if current.is_stale_at(now) { ConsentStatus::Expired } else { current.status };
                return Err(LedgerError::Conflict(format!(
                    "Consent is {}; its terms can no longer change",
                    status.as_str()
                )));
            }
            if let Some(permission) = patch.permission {
                updated.permission = permission;
            }
            if patch.description.is_some() {
                updated.description = normalize_text(patch.description.clone());
            }
            if let Some(expires_at) = patch.expires_at {
                future_expiry(Some(expires_at), now)?;
                updated.expires_at = Some(expires_at);
            }
            updated.updated_at = now;
        }

        let mut event = None;
        if let Some(next) = patch.status.filter(|next| *next != current.status) {
            if !current.status.can_transition_to(next) {
                return Err(LedgerError::Conflict(format!(
                    "Cannot move consent from {} to {}",
                    current.status.as_str(),
                    next.as_str()
                )));
            }
            match next {
                ConsentStatus::Active => {
                    if updated.is_expired_at(now) {
                        return Err(ValidationError::ExpiryInPast.into());
                    }
                    updated.grant(caller.id, now);
                    event = Some(StatusEvent::Granted);
                }
                ConsentStatus::Revoked if current.status == ConsentStatus::Active => {
                    let reason = required_text("reason", patch.reason, self.policy.revoke_reason_min_len)?;
                    updated.revoke(caller.id, Some(reason), now);
                    event = Some(StatusEvent::Revoked);
                }
                ConsentStatus::Revoked => {
                    // Turning down a request that was never granted.
                    let reason = optional_text("reason", patch.reason, self.policy.revoke_reason_min_len)?;
                    updated.revoke(caller.id, reason, now);
                }
                ConsentStatus::Expired => updated.expire(now),
                ConsentStatus::Pending => {}
            }
        }

        if updated == current {
            debug!("Consent {} unchanged", consent_id);
            return Ok(current);
        }
        self.consents.save_consent(&updated, &current).await?;
        info!(
            "Consent {} updated by {}: {} -> {}",
            consent_id,
            caller.id,
            current.status.as_str(),
            updated.status.as_str()
        );

        match event {
            Some(StatusEvent::Granted) => self.publish_granted(&updated, caller.id),
            Some(StatusEvent::Revoked) => self.events.publish(LedgerEvent::ConsentRevoked {
                consent_id: updated.id,
                patient_id: updated.patient_id,
                doctor_id: updated.doctor_id,
                revoked_by: caller.id,
                reason: updated.revoke_reason.clone(),
            }),
            None => {}
        }
        Ok(updated)
    }

    /// The consent authorizing `requesting_user_id` over the patient's
    /// records right now, if any. Expiry is evaluated here, at read time.
    pub async fn matching_consent(&self, patient_id: UserId, requesting_user_id: UserId) -> LedgerResult<Option<Consent>> {
        let consent = self.consents.find_active_consent(&patient_id, &requesting_user_id).await?;
        Ok(consent.filter(|consent| consent.is_active_at(Utc::now())))
    }

    /// Owners always pass; anyone else needs a live consent.
    pub async fn check_access(&self, patient_id: UserId, requesting_user_id: UserId) -> LedgerResult<bool> {
        if patient_id == requesting_user_id {
            return Ok(true);
        }
        Ok(self.matching_consent(patient_id, requesting_user_id).await?.is_some())
    }

    pub async fn get_consent(&self, consent_id: ConsentId, caller: &Identity) -> LedgerResult<Consent> {
        match self.consents.get_consent(&consent_id).await? {
            Some(consent) if caller.is_admin() || caller.id == consent.patient_id || caller.id == consent.doctor_id => {
                Ok(consent)
            }
            None if caller.is_admin() => Err(LedgerError::NotFound("Consent not found".to_string())),
            _ => Err(LedgerError::Forbidden("Access denied".to_string())),
        }
    }

    pub async fn list_for_patient(&self, patient_id: UserId, caller: &Identity) -> LedgerResult<Vec<Consent>> {
        if !caller.is_self_or_admin(&patient_id) {
            return Err(LedgerError::Forbidden("Access denied".to_string()));
        }
        self.consents.list_consents_for_patient(&patient_id).await
    }

    pub async fn list_for_doctor(&self, doctor_id: UserId, caller: &Identity) -> LedgerResult<Vec<Consent>> {
        if !caller.is_self_or_admin(&doctor_id) {
            return Err(LedgerError::Forbidden("Access denied".to_string()));
        }
        self.consents.list_consents_for_doctor(&doctor_id).await
    }

    /// One-step grant from the patient: an active view consent for the doctor.
    pub async fn grant_access(&self, patient: &Identity, doctor_id: UserId, message: Option<String>) -> LedgerResult<Consent> {
        let mut request = NewConsent::new(patient.id, doctor_id, ConsentPermission::View).granted();
        request.description = message;
        self.create_consent(request).await
    }

    /// One-step revoke from the patient of whatever consent is live for the doctor.
    pub async fn revoke_access(&self, patient: &Identity, doctor_id: UserId, reason: Option<String>) -> LedgerResult<Consent> {
        let consent = self
            .matching_consent(patient.id, doctor_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound("No active consent found for this doctor".to_string()))?;
        let patch = ConsentPatch {
            status: Some(ConsentStatus::Revoked),
            reason,
            ..ConsentPatch::default()
        };
        self.update_consent(consent.id, patient, patch).await
    }

    fn publish_granted(&self, consent: &Consent, granted_by: UserId) {
        self.events.publish(LedgerEvent::ConsentGranted {
            consent_id: consent.id,
            patient_id: consent.patient_id,
            doctor_id: consent.doctor_id,
            permission: consent.permission,
            granted_by,
        });
    }
}

enum StatusEvent {
    Granted,
    Revoked,
}
