//! Main axum router and the proxy pipeline.
//!
//! Routes:
//! - `GET  /favicon.ico` - Static icon
//! - `GET  /healthz`     - Health report
//! - `GET  /metrics`     - Prometheus metrics
//! - `*    /`            - Landing page
//! - `*    /<url>`       - Proxy `<url>` if it is a recognised GitHub resource

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tracing::{debug, error, info, instrument, warn};

use super::{assets, dispatch};
use crate::metrics::Outcome;
use crate::target::{self, normalize, Target};
use crate::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the axum [`Router`] with all HTTP routes and shared state.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/favicon.ico", get(assets::handle_favicon))
        .route("/healthz", get(crate::health::health_handler))
        .route("/metrics", get(handle_metrics))
        // Everything else is a target URL.
        .fallback(handle_proxy)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Run one request through normalize → classify → authorize → dispatch.
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, AppError> {
    let raw = request.uri().path();
    let raw = raw.strip_prefix('/').unwrap_or(raw);
    let repaired = normalize::repair_scheme(raw);

    if repaired.is_empty() {
        return Ok(assets::serve_index(&state).await);
    }

    let result = proxy_target(&state, &repaired, request).await;
    if let Err(ref err) = result {
        state.metrics.metrics.record(err.outcome());
    }
    result
}

async fn proxy_target(
    state: &AppState,
    repaired: &str,
    request: Request,
) -> Result<Response, AppError> {
    let decoded = normalize::decode(repaired).map_err(|e| {
        warn!(error = %e, "failed to decode target URL");
        AppError::DecodeFailure
    })?;
    info!(url = %decoded, "received URL");

    // Classify the URL that will actually be requested, not the inbound text.
    let Some(target) = Target::parse(&decoded) else {
        debug!(url = %decoded, "URL does not parse");
        return Err(AppError::InvalidInput);
    };
    let checked = target.classification_url();
    let Some(classified) = target::classify(&checked) else {
        debug!(url = %checked, "URL matches no GitHub rule");
        return Err(AppError::InvalidInput);
    };
    state.metrics.metrics.record_rule(classified.rule);

    let repo = classified.repo.without_git_suffix();
    let decision = state.policy.evaluate(&repo.author, &repo.repo);
    info!(
        rule = classified.rule,
        repo = %repo.slug(),
        ?decision,
        "classified URL"
    );
    if !decision.is_allowed() {
        return Err(AppError::PolicyDenied);
    }

    dispatch::forward(state, &target, request).await
}

/// `GET /metrics`
///
/// Returns Prometheus metrics collected by the proxy.
async fn handle_metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.encode() {
        Ok(buf) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            buf,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Request-level failure, mapped onto an HTTP status.
#[derive(Debug)]
pub enum AppError {
    /// The path is not one of the recognised GitHub URL shapes.
    InvalidInput,
    /// The author or repository is refused by the access policy.
    PolicyDenied,
    /// The path did not percent-decode to UTF-8.
    DecodeFailure,
    /// Connecting to or talking with the upstream host failed.
    Upstream(anyhow::Error),
}

impl AppError {
    pub fn outcome(&self) -> Outcome {
        match self {
            AppError::InvalidInput => Outcome::InvalidInput,
            AppError::PolicyDenied => Outcome::Denied,
            AppError::DecodeFailure => Outcome::DecodeFailure,
            AppError::Upstream(_) => Outcome::UpstreamFailure,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::InvalidInput => (StatusCode::FORBIDDEN, "Invalid input.").into_response(),
            AppError::PolicyDenied => {
                (StatusCode::FORBIDDEN, "Download not allowed.").into_response()
            }
            AppError::DecodeFailure => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to decode URL.",
            )
                .into_response(),
            AppError::Upstream(err) => {
                error!(error = %format!("{err:#}"), "upstream request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Upstream request failed: {err:#}"),
                )
                    .into_response()
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Upstream(err)
    }
}
