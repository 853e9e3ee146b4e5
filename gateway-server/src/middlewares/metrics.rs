use std::time::Instant;

use axum::RequestExt;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use gateway_statsd::metric;

use crate::statsd::{GatewayCounters, GatewayTimers};

/// Route tag of requests that did not match a route and were forwarded.
const FORWARD_ROUTE: &str = "forward";

/// A middleware that counts and times every request by route and status.
///
/// Use this with [`axum::middleware::from_fn`].
pub async fn metrics(mut request: Request, next: Next) -> Response {
    let start = Instant::now();

    let matched_path = request.extract_parts::<MatchedPath>().await;
    let route = matched_path.as_ref().map_or(FORWARD_ROUTE, |m| m.as_str());

    let response = next.run(request).await;

    metric!(
        counter(GatewayCounters::Requests) += 1,
        route = route,
        status = response.status().as_str(),
    );
    metric!(
        timer(GatewayTimers::RequestsDuration) = start.elapsed(),
        route = route,
    );

    response
}
