//! Landing page and favicon, served from the static directory.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::AppState;

pub const INDEX_FILE: &str = "index.html";
pub const FAVICON_FILE: &str = "favicon.ico";

/// Landing page, shown for an empty target path.
pub async fn serve_index(state: &AppState) -> Response {
    serve_file(
        &state.static_dir.join(INDEX_FILE),
        "text/html; charset=utf-8",
    )
    .await
}

/// `GET /favicon.ico`
pub async fn handle_favicon(State(state): State<Arc<AppState>>) -> Response {
    serve_file(&state.static_dir.join(FAVICON_FILE), "image/x-icon").await
}

/// Stream a file from disk.
async fn serve_file(path: &Path, content_type: &'static str) -> Response {
    let file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "404 page not found").into_response();
        }
        Err(e) => {
            warn!(error = %e, path = %path.display(), "failed to open static file");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let len = file.metadata().await.ok().map(|m| m.len());

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, header::HeaderValue::from(len));
    }
    response
}
