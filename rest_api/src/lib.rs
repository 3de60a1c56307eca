// rest_api/src/lib.rs

//! HTTP surface of the consent service. Every route under `/api/v1` except
//! `/health` takes its caller from a bearer token; the handlers check the
//! coarse role permission and leave ownership decisions to the ledger.

use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use consent_core::{EventSink, LedgerCore, LedgerError};
use security::{AuthError, AuthState};
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

pub mod config;
mod handlers;

pub use crate::config::{load_settings, ApiSettings, Overrides};

#[derive(Debug, Error)]
pub enum RestApiError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl IntoResponse for RestApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            RestApiError::Auth(e) => return e.into_response(),
            RestApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            RestApiError::Ledger(e) => match e {
                LedgerError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                LedgerError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
                LedgerError::Conflict(msg) => (StatusCode::CONFLICT, msg),
                LedgerError::InvalidData(msg) => (StatusCode::BAD_REQUEST, msg),
                LedgerError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),
                LedgerError::StorageUnavailable(msg) => {
                    error!("Storage unavailable: {}", msg);
                    (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string())
                }
                other => {
                    error!("Request failed: {}", other);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
                }
            },
        };

        let body = Json(json!({
            "status": "error",
            "message": message,
        }));

        (status, body).into_response()
    }
}

/// Shared state for the axum application.
#[derive(Clone)]
pub struct AppState {
    pub core: LedgerCore,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(core: LedgerCore, auth: AuthState) -> Self {
        AppState { core, auth }
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/consent", post(handlers::create_consent).get(handlers::list_consents))
        .route("/consent/doctor/:doctor_id", get(handlers::list_doctor_consents))
        .route("/consent/:consent_id", put(handlers::update_consent).get(handlers::get_consent))
        .route("/consent/connection", post(handlers::request_connection))
        .route("/consent/connection/:connection_id", get(handlers::get_connection))
        .route("/consent/connection/:connection_id/accept", post(handlers::accept_connection))
        .route("/consent/connection/:connection_id/reject", post(handlers::reject_connection))
        .route("/consent/connection/:connection_id/block", post(handlers::block_connection))
        .route("/consent/connections", get(handlers::list_connections))
        .route("/consent/access-logs/:record_id", get(handlers::record_access_logs))
        .route("/consent/grant-access/:doctor_id", post(handlers::grant_access))
        .route("/consent/revoke-access/:doctor_id", post(handlers::revoke_access))
        .route("/records/:record_id/access", post(handlers::record_access))
        .route("/admin/stats", get(handlers::admin_stats))
        .route("/admin/connections/:connection_id", delete(handlers::admin_clear_connection))
        .route("/admin/users", post(handlers::admin_sync_user));

    Router::new().nest("/api/v1", api).with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(Any)
        .allow_headers(Any)
}

/// Builds the core from `settings`, binds and serves until ctrl-c.
pub async fn start_server(settings: ApiSettings, events: Arc<dyn EventSink>) -> anyhow::Result<()> {
    let core = LedgerCore::from_config(&settings.app, events)?;
    let auth = AuthState::new(settings.app.server.jwt_secret.as_bytes().to_vec(), settings.roles);
    let app = build_router(AppState::new(core, auth)).layer(cors_layer());

    let addr = settings.app.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Consent API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;
    info!("Consent API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests;
