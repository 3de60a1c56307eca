// rest_api/src/tests.rs

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use consent_core::{LedgerCore, NoopEventSink, PolicyConfig, Storage};
use models::medical::{User, UserRole};
use security::{generate_jwt_token, AuthState, RolesConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{build_router, AppState};

const SECRET: &[u8] = b"rest-api-test-secret";

struct Fixture {
    app: Router,
    patient: User,
    doctor: User,
    patient_token: String,
    doctor_token: String,
    admin_token: String,
}

async fn fixture() -> Fixture {
    let core = LedgerCore::new(Storage::in_memory(), Arc::new(NoopEventSink), PolicyConfig::default());
    let patient = User::new("Pat", "Ient", "patient@example.com", UserRole::Patient);
    let doctor = User::new("Doc", "Tor", "doctor@example.com", UserRole::Doctor);
    let admin = User::new("Ad", "Min", "admin@example.com", UserRole::Admin);
    for user in [&patient, &doctor, &admin] {
        core.register_user(user).await.unwrap();
    }

    let token = |user: &User| generate_jwt_token(&user.identity(), SECRET, 1).unwrap();
    let (patient_token, doctor_token, admin_token) = (token(&patient), token(&doctor), token(&admin));
    let state = AppState::new(core, AuthState::new(SECRET.to_vec(), RolesConfig::default()));

    Fixture { app: build_router(state), patient, doctor, patient_token, doctor_token, admin_token }
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    (status, value)
}

#[tokio::test]
async fn health_needs_no_token() {
    let f = fixture().await;
    let (status, body) = send(&f.app, Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let f = fixture().await;
    let (status, body) = send(&f.app, Method::GET, "/api/v1/consent", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let (status, _) = send(&f.app, Method::GET, "/api/v1/consent", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn consent_lifecycle_drives_record_access() {
    let f = fixture().await;
    let record_uri = format!("/api/v1/records/{}/access", models::RecordId::new());
    let access_body = json!({ "patient_id": f.patient.id, "action": "view" });

    let (status, body) = send(
        &f.app,
        Method::POST,
        "/api/v1/consent",
        Some(&f.patient_token),
        Some(json!({ "doctor_id": f.doctor.id, "permission": "download", "description": "  annual review  " })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["description"], "annual review");
    let consent_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&f.app, Method::GET, "/api/v1/consent", Some(&f.doctor_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    // Pending consents do not authorize.
    let (status, body) =
        send(&f.app, Method::POST, &record_uri, Some(&f.doctor_token), Some(access_body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let (status, body) = send(
        &f.app,
        Method::PUT,
        &format!("/api/v1/consent/{consent_id}"),
        Some(&f.patient_token),
        Some(json!({ "status": "active" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "active");

    let (status, body) =
        send(&f.app, Method::POST, &record_uri, Some(&f.doctor_token), Some(access_body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["basis"], "consent");
    assert_eq!(body["data"]["consent_id"], consent_id.as_str());
    assert!(body["data"]["log_id"].is_string());

    // Download is covered, modify is not.
    let (status, _) = send(
        &f.app,
        Method::POST,
        &record_uri,
        Some(&f.doctor_token),
        Some(json!({ "patient_id": f.patient.id, "action": "modify" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let record_id = record_uri.trim_start_matches("/api/v1/records/").trim_end_matches("/access");
    let (status, body) = send(
        &f.app,
        Method::GET,
        &format!("/api/v1/consent/access-logs/{record_id}"),
        Some(&f.patient_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let logs = body["data"].as_array().unwrap();
    assert_eq!(logs.len(), 3);
    assert_eq!(logs[0]["result"], "denied");
    assert_eq!(logs[0]["action"], "modify");
    assert_eq!(logs[1]["result"], "success");
    assert_eq!(logs[2]["consent_id"], Value::Null);

    // The doctor may not read the patient's audit trail.
    let (status, _) = send(
        &f.app,
        Method::GET,
        &format!("/api/v1/consent/access-logs/{record_id}"),
        Some(&f.doctor_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn record_audit_trail_is_hidden_from_other_patients() {
    let f = fixture().await;
    let record_id = models::RecordId::new();
    let (status, _) = send(
        &f.app,
        Method::POST,
        &format!("/api/v1/records/{record_id}/access"),
        Some(&f.doctor_token),
        Some(json!({ "patient_id": f.patient.id, "action": "view" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let eve = User::new("Eve", "Other", "eve@example.com", UserRole::Patient);
    let eve_token = generate_jwt_token(&eve.identity(), SECRET, 1).unwrap();
    let logs_uri = format!("/api/v1/consent/access-logs/{record_id}");
    let (status, body) = send(&f.app, Method::GET, &logs_uri, Some(&eve_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let (status, body) = send(&f.app, Method::GET, &logs_uri, Some(&f.patient_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["result"], "denied");
    assert_eq!(body["data"][0]["patient_id"], json!(f.patient.id));
}

#[tokio::test]
async fn doctor_cannot_claim_to_own_a_record() {
    let f = fixture().await;
    let record_id = models::RecordId::new();
    let (status, _) = send(
        &f.app,
        Method::POST,
        &format!("/api/v1/records/{record_id}/access"),
        Some(&f.doctor_token),
        Some(json!({ "patient_id": f.doctor.id, "action": "view" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &f.app,
        Method::GET,
        &format!("/api/v1/consent/access-logs/{record_id}"),
        Some(&f.admin_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn revoking_an_active_consent_requires_a_reason() {
    let f = fixture().await;
    let grant_uri = format!("/api/v1/consent/grant-access/{}", f.doctor.id);
    let revoke_uri = format!("/api/v1/consent/revoke-access/{}", f.doctor.id);

    let (status, _) = send(&f.app, Method::POST, &grant_uri, Some(&f.patient_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&f.app, Method::POST, &grant_uri, Some(&f.patient_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&f.app, Method::POST, &revoke_uri, Some(&f.patient_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &f.app,
        Method::POST,
        &revoke_uri,
        Some(&f.patient_token),
        Some(json!({ "reason": "changed providers last month" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "revoked");

    let (status, _) = send(
        &f.app,
        Method::POST,
        &revoke_uri,
        Some(&f.patient_token),
        Some(json!({ "reason": "changed providers last month" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn role_permissions_gate_routes() {
    let f = fixture().await;
    let (status, _) = send(
        &f.app,
        Method::POST,
        "/api/v1/consent",
        Some(&f.doctor_token),
        Some(json!({ "doctor_id": f.patient.id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&f.app, Method::GET, "/api/v1/admin/stats", Some(&f.patient_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&f.app, Method::GET, "/api/v1/admin/stats", Some(&f.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["consents"]["total"], 0);
}

#[tokio::test]
async fn unknown_consent_does_not_leak_existence() {
    let f = fixture().await;
    let uri = format!("/api/v1/consent/{}", models::ConsentId::new());

    let (status, body) =
        send(&f.app, Method::PUT, &uri, Some(&f.patient_token), Some(json!({ "status": "active" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "Access denied");

    let (status, _) = send(&f.app, Method::GET, &uri, Some(&f.admin_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn connection_flow_and_admin_clear() {
    let f = fixture().await;
    let request = json!({ "target_id": f.doctor.id, "message": "Please add me as your patient" });

    let (status, body) =
        send(&f.app, Method::POST, "/api/v1/consent/connection", Some(&f.patient_token), Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "pending");
    let connection_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) =
        send(&f.app, Method::POST, "/api/v1/consent/connection", Some(&f.doctor_token), Some(json!({ "target_id": f.patient.id }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let accept_uri = format!("/api/v1/consent/connection/{connection_id}/accept");
    let (status, _) = send(&f.app, Method::POST, &accept_uri, Some(&f.patient_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&f.app, Method::POST, &accept_uri, Some(&f.doctor_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "accepted");
    let (status, _) = send(&f.app, Method::POST, &accept_uri, Some(&f.doctor_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&f.app, Method::GET, "/api/v1/consent/connections", Some(&f.patient_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let clear_uri = format!("/api/v1/admin/connections/{connection_id}");
    let (status, _) = send(&f.app, Method::DELETE, &clear_uri, Some(&f.patient_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&f.app, Method::DELETE, &clear_uri, Some(&f.admin_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        send(&f.app, Method::POST, "/api/v1/consent/connection", Some(&f.patient_token), Some(request)).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn synced_doctor_can_receive_consent() {
    let f = fixture().await;
    let new_doctor = models::UserId::new();
    let sync = json!({
        "id": new_doctor,
        "first": "New",
        "last": "Doctor",
        "email": "new.doctor@example.com",
        "role": "doctor",
    });

    let (status, _) = send(&f.app, Method::POST, "/api/v1/admin/users", Some(&f.patient_token), Some(sync.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let grant_uri = format!("/api/v1/consent/grant-access/{new_doctor}");
    let (status, body) = send(&f.app, Method::POST, &grant_uri, Some(&f.patient_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Doctor not found");

    let (status, body) = send(&f.app, Method::POST, "/api/v1/admin/users", Some(&f.admin_token), Some(sync)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_verified"], true);

    let (status, body) = send(&f.app, Method::POST, &grant_uri, Some(&f.patient_token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["permission"], "view");
}
