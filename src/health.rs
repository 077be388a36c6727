use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::transport::TransportMode;
use crate::AppState;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub transport: TransportMode,
    pub policy: PolicySummary,
    pub upstream_streams_active: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
}

#[derive(Debug, Serialize)]
pub struct PolicySummary {
    pub whitelist_entries: usize,
    pub blacklist_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<u64>,
}

// ---------------------------------------------------------------------------
// Axum handler
// ---------------------------------------------------------------------------

/// `GET /healthz`.  The proxy keeps no upstream state of its own, so being
/// able to answer is the health signal; the body reports the loaded setup.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = HealthResponse {
        status: HealthStatus::Ok,
        transport: TransportMode::from_config(&state.config),
        policy: PolicySummary {
            whitelist_entries: state.policy.whitelist_len(),
            blacklist_entries: state.policy.blacklist_len(),
            size_limit: state.config.size_limit(),
        },
        upstream_streams_active: state.metrics.metrics.upstream_streams_active.get(),
    };

    (StatusCode::OK, Json(body))
}
