//! Web server endpoints.
//!
//! This module contains the line protocol write endpoint, as well as a generic `forward`
//! endpoint that sends all other requests to the backend.

use axum::Router;
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use crate::service::ServiceState;

mod forward;
mod influx;

pub use self::influx::WRITE_PATH;

/// Builds the router with all endpoints.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route(WRITE_PATH, influx::route())
        // `forward` must be the fallback as it proxies everything else
        .fallback(forward::forward)
}

/// Turns a backend response into a response for the caller.
fn relay_response(response: axum::http::Response<Bytes>) -> Response {
    response.map(Body::from).into_response()
}
