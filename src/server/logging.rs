use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

const LOG_TARGET: &str = "server::http";

/// Logs each request once it completes, keyed by its route template.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_owned())
        .unwrap_or_else(|| path.clone());

    let started = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::warn!(target = LOG_TARGET, %method, %path, %route, status = status.as_u16(), duration_ms, "request failed");
    } else {
        tracing::info!(target = LOG_TARGET, %method, %path, %route, status = status.as_u16(), duration_ms, "request completed");
    }
    response
}
