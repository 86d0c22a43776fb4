//! HTTP surface: manual trigger and health endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::ingest::IngestionStatus;
use crate::pipeline::orchestrator::NotificationOrchestrator;
use crate::pipeline::types::Event;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "notify-bridge";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<NotificationOrchestrator>,
    /// Stream ingestion state. Reported as disconnected when ingestion is off.
    pub ingestion: Arc<IngestionStatus>,
    /// Whether a workflow engine API key is configured.
    pub novu_configured: bool,
}

/// Build the Axum router with the bridge routes.
pub fn bridge_routes(state: AppState) -> Router {
    Router::new()
        .route("/novu-bridge/v1/_trigger", post(trigger))
        .route("/novu-bridge/health", get(health))
        .route("/novu-bridge/actuator/health", get(actuator_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// ── Trigger ─────────────────────────────────────────────────────────────

async fn trigger(
    State(state): State<AppState>,
    body: Result<Json<Event>, JsonRejection>,
) -> impl IntoResponse {
    let Json(event) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected trigger request");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "responseInfo": { "status": "failed" },
                    "errors": [{ "code": "TRIGGER_FAILED", "message": rejection.body_text() }]
                })),
            );
        }
    };

    info!(event_type = %event.event_type, tenant_id = %event.tenant_id, "Manual trigger");
    let outcome = state.orchestrator.process(event).await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "responseInfo": { "status": "successful" },
            "result": outcome
        })),
    )
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = state.orchestrator.dispatcher();
    let mut body = serde_json::json!({
        "status": "UP",
        "service": SERVICE_NAME,
        "kafka": state.ingestion.label(),
        "novu": if state.novu_configured { "configured" } else { "not configured" },
        "mode": dispatcher.mode_label(),
    });

    if let Some(transport) = dispatcher.transport() {
        let connected = match transport.status().await {
            Ok(status) => status.connected,
            Err(e) => {
                warn!(error = %e, "Transport status check failed");
                false
            }
        };
        body["transport"] = serde_json::json!({
            "name": transport.name(),
            "connected": connected,
        });
    }

    Json(body)
}

async fn actuator_health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "UP" }))
}
