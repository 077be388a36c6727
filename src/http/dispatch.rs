//! Reverse-proxy dispatch of an accepted request onto its upstream host.
//!
//! The inbound method, headers and body are forwarded to the target URL over
//! the shared client; the upstream status, headers and body come back
//! unchanged apart from hop-by-hop headers.  Bodies are streamed in both
//! directions and never buffered whole.

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Instant;

use anyhow::Context as _;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use tracing::{debug, info, warn, Span};

use super::handler::AppError;
use crate::metrics::{Metrics, Outcome};
use crate::target::Target;
use crate::AppState;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Send `request` to `target` and stream the upstream response back.
pub async fn forward(
    state: &AppState,
    target: &Target,
    request: Request,
) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let url = target.url(parts.uri.query());
    let client_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let headers = upstream_request_headers(&parts.headers, client_addr);
    debug!(%url, method = %parts.method, "dispatching to upstream");

    let mut builder = state
        .http_client
        .request(parts.method.clone(), url.clone())
        .headers(headers);
    if carries_body(&parts.headers) {
        builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }

    let started = Instant::now();
    let upstream = builder
        .send()
        .await
        .with_context(|| format!("request to {} failed", target.origin()))?;
    state
        .metrics
        .metrics
        .upstream_duration_seconds
        .observe(started.elapsed().as_secs_f64());

    let status = upstream.status();
    if let (Some(limit), Some(len)) = (
        state.config.size_limit(),
        declared_length(upstream.headers()),
    ) {
        if len > limit {
            info!(%url, len, limit, "response exceeds size limit, redirecting client to origin");
            // Dropping the unread response releases the upstream connection.
            drop(upstream);
            let response = redirect_to(url.as_str())?;
            state.metrics.metrics.record(Outcome::Redirected);
            return Ok(response);
        }
    }

    info!(%status, "upstream responded");
    let headers = strip_hop_by_hop(upstream.headers());
    let stream = UpstreamStream::new(
        upstream.bytes_stream().boxed(),
        Arc::clone(&state.metrics.metrics),
    );

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    state.metrics.metrics.record(Outcome::Proxied);
    Ok(response)
}

// ---------------------------------------------------------------------------
// Header handling
// ---------------------------------------------------------------------------

/// Copy `headers` without hop-by-hop headers, including any named in
/// `Connection`.
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str) || listed.iter().any(|t| t == name_str) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Headers for the upstream request: hop-by-hop headers and `Host` are
/// dropped (the client derives `Host` from the upstream URL) and the client
/// address is appended to `X-Forwarded-For`.
fn upstream_request_headers(headers: &HeaderMap, client_addr: Option<SocketAddr>) -> HeaderMap {
    let mut out = strip_hop_by_hop(headers);
    out.remove(header::HOST);

    if let Some(addr) = client_addr {
        let prior: Vec<&str> = headers
            .get_all(&X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let ip = addr.ip().to_string();
        let value = if prior.is_empty() {
            ip
        } else {
            format!("{}, {ip}", prior.join(", "))
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            out.insert(X_FORWARDED_FOR, value);
        }
    }
    out
}

/// Whether the inbound request has a body worth forwarding.
fn carries_body(headers: &HeaderMap) -> bool {
    headers.contains_key(header::TRANSFER_ENCODING)
        || declared_length(headers).is_some_and(|len| len > 0)
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn redirect_to(url: &str) -> anyhow::Result<Response> {
    let location =
        HeaderValue::from_str(url).context("redirect target is not a valid Location header")?;
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    response.headers_mut().insert(header::LOCATION, location);
    Ok(response)
}

// ---------------------------------------------------------------------------
// Response body
// ---------------------------------------------------------------------------

/// Upstream response body handed to the client.
///
/// Counts streamed bytes and the number of bodies in flight.  Dropping it,
/// whether the body completed, failed, or the client went away, drops the
/// upstream response and with it the upstream connection.
struct UpstreamStream {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    metrics: Arc<Metrics>,
    span: Span,
    bytes: u64,
    finished: bool,
}

impl UpstreamStream {
    fn new(inner: BoxStream<'static, reqwest::Result<Bytes>>, metrics: Arc<Metrics>) -> Self {
        metrics.upstream_streams_active.inc();
        Self {
            inner,
            metrics,
            span: Span::current(),
            bytes: 0,
            finished: false,
        }
    }
}

impl Stream for UpstreamStream {
    type Item = reqwest::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let polled = this.inner.poll_next_unpin(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes += chunk.len() as u64;
                this.metrics.upstream_bytes_total.inc_by(chunk.len() as u64);
            }
            Poll::Ready(Some(Err(e))) => {
                let _entered = this.span.enter();
                warn!(error = %e, bytes = this.bytes, "upstream body read failed");
            }
            Poll::Ready(None) => this.finished = true,
            Poll::Pending => {}
        }
        polled
    }
}

impl Drop for UpstreamStream {
    fn drop(&mut self) {
        self.metrics.upstream_streams_active.dec();
        let _entered = self.span.enter();
        if self.finished {
            debug!(bytes = self.bytes, "upstream body complete");
        } else {
            info!(bytes = self.bytes, "upstream body released before completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let h = headers(&[
            ("connection", "keep-alive, x-trace"),
            ("keep-alive", "timeout=5"),
            ("transfer-encoding", "chunked"),
            ("x-trace", "1"),
            ("content-type", "application/zip"),
        ]);
        let out = strip_hop_by_hop(&h);
        assert_eq!(out.len(), 1);
        assert_eq!(out[header::CONTENT_TYPE], "application/zip");
    }

    #[test]
    fn repeated_headers_are_kept() {
        let h = headers(&[("accept", "a"), ("accept", "b")]);
        let out = strip_hop_by_hop(&h);
        assert_eq!(out.get_all(header::ACCEPT).iter().count(), 2);
    }

    #[test]
    fn host_is_not_forwarded() {
        let h = headers(&[("host", "proxy.local:5340"), ("user-agent", "git/2.40")]);
        let out = upstream_request_headers(&h, None);
        assert!(out.get(header::HOST).is_none());
        assert_eq!(out[header::USER_AGENT], "git/2.40");
    }

    #[test]
    fn forwarded_for_is_appended() {
        let addr: SocketAddr = "10.0.0.7:40000".parse().unwrap();
        let out = upstream_request_headers(&HeaderMap::new(), Some(addr));
        assert_eq!(out[&X_FORWARDED_FOR], "10.0.0.7");

        let h = headers(&[("x-forwarded-for", "1.2.3.4")]);
        let out = upstream_request_headers(&h, Some(addr));
        assert_eq!(out[&X_FORWARDED_FOR], "1.2.3.4, 10.0.0.7");
    }

    #[test]
    fn body_detection() {
        assert!(!carries_body(&HeaderMap::new()));
        assert!(!carries_body(&headers(&[("content-length", "0")])));
        assert!(carries_body(&headers(&[("content-length", "12")])));
        assert!(carries_body(&headers(&[("transfer-encoding", "chunked")])));
    }

    #[test]
    fn redirect_sets_location() {
        let resp = redirect_to("https://github.com/a/b/releases/download/v1/big.bin").unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers()[header::LOCATION],
            "https://github.com/a/b/releases/download/v1/big.bin"
        );
    }

    #[tokio::test]
    async fn stream_counts_bytes_and_releases_on_drop() {
        let registry = crate::metrics::MetricsRegistry::new();
        let metrics = Arc::clone(&registry.metrics);
        let chunks: Vec<reqwest::Result<Bytes>> =
            vec![Ok(Bytes::from_static(b"abc")), Ok(Bytes::from_static(b"de"))];
        let mut stream = UpstreamStream::new(futures::stream::iter(chunks).boxed(), metrics);

        assert_eq!(registry.metrics.upstream_streams_active.get(), 1);
        assert_eq!(stream.next().await.unwrap().unwrap(), "abc");
        drop(stream);

        assert_eq!(registry.metrics.upstream_streams_active.get(), 0);
        assert_eq!(registry.metrics.upstream_bytes_total.get(), 3);
    }
}
