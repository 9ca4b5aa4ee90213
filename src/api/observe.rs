//! Request logging and metrics middleware

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use super::ApiState;

/// Route label for requests that matched no route
const UNMATCHED_ROUTE: &str = "unmatched";

/// Log `METHOD path -> status (elapsed)` and record request metrics
///
/// The metrics label is the route template, not the raw path, so device IDs
/// do not create new series.
pub async fn observe_requests(
    State(state): State<Arc<ApiState>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| UNMATCHED_ROUTE.to_string(), |m| m.as_str().to_string());

    let response = next.run(req).await;

    let elapsed = start.elapsed();
    let status = response.status();
    state
        .metrics
        .record_request(method.as_str(), &route, status.as_u16(), elapsed);

    tracing::info!(
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = elapsed.as_millis(),
        "{method} {path} -> {status}"
    );

    response
}
