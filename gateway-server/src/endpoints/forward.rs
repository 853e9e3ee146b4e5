//! Server endpoint that proxies any request to the backend.
//!
//! The request is sent over the bridge unchanged, apart from hop-by-hop headers and the tenant.
//! The backend response is relayed verbatim, including error responses embedded in RPC errors.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gateway_httpgrpc::{TenancyError, TransportError};

use crate::body::{self, BodyError};
use crate::endpoints::relay_response;
use crate::service::ServiceState;

/// A request could not be forwarded.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The tenant of the request could not be determined.
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
    /// The request body could not be read.
    #[error(transparent)]
    Body(#[from] BodyError),
    /// The backend call failed without a response.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ForwardError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Tenancy(error) => error.status_code(),
            Self::Body(BodyError::TooLarge(_)) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::Transport(error) => error.status_code(),
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Implementation of the forward endpoint.
///
/// Passthrough calls carry no deadline of their own. They end when the backend answers or the
/// caller goes away.
pub async fn forward(
    State(state): State<ServiceState>,
    request: Request,
) -> Result<Response, ForwardError> {
    let (parts, body) = request.into_parts();

    let tenant = state.tenancy().resolve(&parts.headers)?;
    let limit = state.config().max_forward_size();
    let data = body::read_raw(&parts.headers, body, limit).await?;

    let mut request = axum::http::Request::from_parts(parts, data);
    if let Some(tenant) = tenant {
        gateway_httpgrpc::attach(&mut request, tenant);
    }

    let response = state.bridge().send(request, None).await.into_result()?;
    Ok(relay_response(response))
}
