// rest_api/src/handlers.rs

use axum::extract::{Path, Query, State};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use consent_core::{AccessBasis, AccessRequest, AccessTarget, NewConsent};
use models::identifiers::{ConnectionId, ConsentId, RecordId, UserId};
use models::medical::{
    AccessAction, AccessMetadata, ConnectionType, ConsentPatch, ConsentPermission, ConsentType, User, UserRole,
};
use security::roles::permissions::*;
use security::Authenticated;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::{AppState, RestApiError};

type ApiResult<T> = Result<T, RestApiError>;

fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({
        "status": "success",
        "data": data,
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Consent API is healthy",
    }))
}

// ---- consents ----

#[derive(Debug, Deserialize)]
pub struct CreateConsentRequest {
    pub doctor_id: UserId,
    #[serde(alias = "type")]
    pub consent_type: Option<ConsentType>,
    pub permission: Option<ConsentPermission>,
    pub description: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grant_immediately: bool,
}

pub async fn create_consent(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(body): Json<CreateConsentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    auth.require(&state.auth.roles, CONSENT_CREATE)?;
    let patient = auth.identity();

    let mut request = NewConsent::new(patient.id, body.doctor_id, body.permission.unwrap_or_default());
    request.consent_type = body.consent_type.unwrap_or_default();
    request.description = body.description;
    request.expires_at = body.expires_at;
    request.grant_immediately = body.grant_immediately;

    let consent = state.core.consents.create_consent(request).await?;
    Ok((StatusCode::CREATED, success(consent)))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConsentListQuery {
    #[serde(alias = "patientId")]
    pub patient_id: Option<UserId>,
}

/// Without `patient_id`, doctors see the consents naming them and
/// everyone else sees their own.
pub async fn list_consents(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<ConsentListQuery>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONSENT_READ)?;
    let caller = auth.identity();
    let ledger = &state.core.consents;

    let consents = match query.patient_id {
        Some(patient_id) => ledger.list_for_patient(patient_id, caller).await?,
        None if caller.role == UserRole::Doctor => ledger.list_for_doctor(caller.id, caller).await?,
        None => ledger.list_for_patient(caller.id, caller).await?,
    };
    Ok(success(consents))
}

pub async fn list_doctor_consents(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(doctor_id): Path<UserId>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONSENT_READ)?;
    let consents = state.core.consents.list_for_doctor(doctor_id, auth.identity()).await?;
    Ok(success(consents))
}

pub async fn get_consent(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(consent_id): Path<ConsentId>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONSENT_READ)?;
    let consent = state.core.consents.get_consent(consent_id, auth.identity()).await?;
    Ok(success(consent))
}

pub async fn update_consent(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(consent_id): Path<ConsentId>,
    Json(patch): Json<ConsentPatch>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONSENT_UPDATE)?;
    let consent = state.core.consents.update_consent(consent_id, auth.identity(), patch).await?;
    Ok(success(consent))
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageBody {
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

pub async fn grant_access(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(doctor_id): Path<UserId>,
    Json(body): Json<MessageBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    auth.require(&state.auth.roles, CONSENT_CREATE)?;
    let consent = state.core.consents.grant_access(auth.identity(), doctor_id, body.message).await?;
    Ok((StatusCode::CREATED, success(consent)))
}

pub async fn revoke_access(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(doctor_id): Path<UserId>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONSENT_UPDATE)?;
    let consent = state.core.consents.revoke_access(auth.identity(), doctor_id, body.reason).await?;
    Ok(success(consent))
}

// ---- connections ----

#[derive(Debug, Deserialize)]
pub struct ConnectionRequestBody {
    pub target_id: UserId,
    #[serde(default, alias = "type")]
    pub connection_type: ConnectionType,
    pub message: Option<String>,
}

pub async fn request_connection(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(body): Json<ConnectionRequestBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    auth.require(&state.auth.roles, CONNECTION_CREATE)?;
    let connection = state
        .core
        .connections
        .request_connection(auth.identity().id, body.target_id, body.connection_type, body.message)
        .await?;
    Ok((StatusCode::CREATED, success(connection)))
}

pub async fn get_connection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(connection_id): Path<ConnectionId>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONSENT_READ)?;
    let connection = state.core.connections.get(connection_id, auth.identity()).await?;
    Ok(success(connection))
}

pub async fn accept_connection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(connection_id): Path<ConnectionId>,
    Json(body): Json<MessageBody>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONNECTION_RESPOND)?;
    let connection = state
        .core
        .connections
        .accept(connection_id, auth.identity().id, body.message)
        .await?;
    Ok(success(connection))
}

pub async fn reject_connection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(connection_id): Path<ConnectionId>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONNECTION_RESPOND)?;
    let connection = state
        .core
        .connections
        .reject(connection_id, auth.identity().id, body.reason)
        .await?;
    Ok(success(connection))
}

pub async fn block_connection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(connection_id): Path<ConnectionId>,
    Json(body): Json<ReasonBody>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONNECTION_RESPOND)?;
    let connection = state
        .core
        .connections
        .block(connection_id, auth.identity(), body.reason)
        .await?;
    Ok(success(connection))
}

pub async fn list_connections(State(state): State<AppState>, auth: Authenticated) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, CONSENT_READ)?;
    let connections = state.core.connections.list_for_user(auth.identity().id).await?;
    Ok(success(connections))
}

// ---- access ----

#[derive(Debug, Default, Deserialize)]
pub struct AccessLogQuery {
    pub limit: Option<usize>,
}

/// Audit trail for one record, for its owning patient or an administrator.
pub async fn record_access_logs(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(record_id): Path<RecordId>,
    Query(query): Query<AccessLogQuery>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, AUDIT_READ)?;
    let logs = state
        .core
        .audit
        .logs_for_record(record_id, auth.identity(), query.limit)
        .await?;
    Ok(success(logs))
}

#[derive(Debug, Deserialize)]
pub struct RecordAccessBody {
    pub patient_id: UserId,
    #[serde(default)]
    pub action: AccessAction,
    pub device_info: Option<String>,
    pub location: Option<String>,
}

/// Decision point for the records service: answers 200 when the caller may
/// perform `action` on the record, 403 otherwise. `patient_id` is the
/// record's owner as the records service knows it; only a patient caller
/// matching it passes as the owner.
pub async fn record_access(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(record_id): Path<RecordId>,
    headers: HeaderMap,
    Json(body): Json<RecordAccessBody>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, RECORDS_ACCESS)?;

    let metadata = AccessMetadata {
        ip_address: forwarded_for(&headers),
        user_agent: headers.get(USER_AGENT).and_then(|v| v.to_str().ok()).map(String::from),
        device_info: body.device_info,
        location: body.location,
    };
    let target = AccessTarget::MedicalRecord { record_id, patient_id: body.patient_id };
    let request = AccessRequest::new(auth.identity().clone(), target, body.action).with_metadata(metadata);
    let decision = state.core.gate.authorize(request).await?;

    let (basis, consent_id) = match &decision.basis {
        AccessBasis::Owner => ("owner", None),
        AccessBasis::Administrative => ("administrative", None),
        AccessBasis::Consent(consent) => ("consent", Some(consent.id)),
    };
    debug!("Record {} {} allowed via {}", record_id, body.action.as_str(), basis);
    Ok(success(json!({
        "allowed": true,
        "basis": basis,
        "consent_id": consent_id,
        "log_id": decision.log_id,
    })))
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---- admin ----

pub async fn admin_stats(State(state): State<AppState>, auth: Authenticated) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, ADMIN_STATS)?;
    let stats = state.core.statistics.collect(auth.identity()).await?;
    Ok(success(stats))
}

pub async fn admin_clear_connection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(connection_id): Path<ConnectionId>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, ADMIN_CONNECTIONS)?;
    let removed = state.core.connections.clear(connection_id, auth.identity()).await?;
    Ok(success(removed))
}

#[derive(Debug, Deserialize)]
pub struct SyncUserBody {
    pub id: UserId,
    pub first: String,
    pub last: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default = "verified_by_default")]
    pub is_verified: bool,
}

fn verified_by_default() -> bool {
    true
}

/// Identity-provider sync hook: stores or refreshes the local user mirror.
pub async fn admin_sync_user(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(body): Json<SyncUserBody>,
) -> ApiResult<Json<Value>> {
    auth.require(&state.auth.roles, ADMIN_USERS)?;
    if body.email.trim().is_empty() {
        return Err(RestApiError::InvalidInput("email is required".to_string()));
    }

    let mut user = User::new(body.first.trim(), body.last.trim(), body.email.trim(), body.role);
    user.id = body.id;
    user.is_verified = body.is_verified;
    state.core.register_user(&user).await?;
    info!("User {} ({}) synced by {}", user.id, user.role.as_str(), auth.identity().id);
    Ok(success(user))
}
