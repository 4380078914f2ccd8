//! Per-route request counting.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use sluice_telemetry::Metrics;

/// Count every routed request under its route template and response status.
///
/// Runs as a route layer, so the matched template (`/api/stats`) is used
/// instead of the raw path; the raw path is the fallback.
pub(crate) async fn count_requests(
    State(metrics): State<Metrics>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |matched| matched.as_str().to_string());
    let response = next.run(request).await;
    metrics.inc_http_request(&route, response.status().as_u16());
    response
}
