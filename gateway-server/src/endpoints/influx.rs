//! Endpoint that accepts InfluxDB line protocol and writes it to the backend.
//!
//! A batch is decoded, converted into series and sent to the remote write endpoint of the
//! backend as a single call. The backend response is relayed to the caller.

use std::error::Error;

use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, post};
use bytes::Bytes;
use gateway_httpgrpc::{TenancyError, TransportError};
use gateway_influx::{ConversionError, EncodeError, InvalidPrecision, ParseError, Precision};
use gateway_statsd::metric;
use serde::Deserialize;

use crate::body::{self, BodyError};
use crate::endpoints::relay_response;
use crate::service::ServiceState;
use crate::statsd::{GatewayCounters, GatewayDistributions};

/// Path of the line protocol write endpoint.
pub const WRITE_PATH: &str = "/api/v1/push/influx/write";

/// Path of the remote write endpoint on the backend.
const PUSH_PATH: &str = "/api/v1/push";

const REMOTE_WRITE_VERSION_HEADER: &str = "x-prometheus-remote-write-version";

/// A line protocol batch was rejected or could not be written.
#[derive(Debug, thiserror::Error)]
pub enum BadWriteRequest {
    #[error(transparent)]
    Tenancy(#[from] TenancyError),
    #[error(transparent)]
    Precision(#[from] InvalidPrecision),
    #[error(transparent)]
    Body(#[from] BodyError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BadWriteRequest {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Tenancy(error) => error.status_code(),
            Self::Precision(_) | Self::Body(_) | Self::Parse(_) | Self::Conversion(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Transport(error) => error.status_code(),
        }
    }

    /// Returns the `reason` tag for batches rejected before forwarding.
    fn rejection_reason(&self) -> Option<&'static str> {
        Some(match self {
            Self::Tenancy(_) => "tenancy",
            Self::Precision(_) => "precision",
            Self::Body(BodyError::TooLarge(_)) => "too_large",
            Self::Body(BodyError::UnsupportedEncoding(_)) => "encoding",
            Self::Body(BodyError::Decompression(_)) => "decompression",
            Self::Body(BodyError::Read(_)) => "read",
            Self::Parse(_) => "parse",
            Self::Conversion(_) => "conversion",
            Self::Encode(_) | Self::Transport(_) => return None,
        })
    }
}

impl IntoResponse for BadWriteRequest {
    fn into_response(self) -> Response {
        match self {
            Self::Encode(ref error) => {
                gateway_log::error!(
                    error = error as &dyn Error,
                    "error encoding remote write request"
                );
            }
            // Logged by the bridge client.
            Self::Transport(_) => {}
            _ => {
                gateway_log::debug!(
                    error = &self as &dyn Error,
                    "error decoding line protocol data"
                );
            }
        }

        if let Some(reason) = self.rejection_reason() {
            metric!(counter(GatewayCounters::InfluxRejected) += 1, reason = reason);
        }

        (self.status_code(), self.to_string()).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct WriteQuery {
    precision: Option<String>,
}

/// Builds the remote write request for the backend.
fn push_request(
    payload: Vec<u8>,
    user_agent: Option<HeaderValue>,
) -> axum::http::Request<Bytes> {
    let mut request = axum::http::Request::new(Bytes::from(payload));
    *request.method_mut() = Method::POST;
    *request.uri_mut() = Uri::from_static(PUSH_PATH);

    let headers = request.headers_mut();
    headers.insert(
        header::CONTENT_ENCODING,
        HeaderValue::from_static(gateway_influx::CONTENT_ENCODING),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(gateway_influx::CONTENT_TYPE),
    );
    headers.insert(
        REMOTE_WRITE_VERSION_HEADER,
        HeaderValue::from_static(gateway_influx::REMOTE_WRITE_VERSION),
    );
    if let Some(user_agent) = user_agent {
        headers.insert(header::USER_AGENT, user_agent);
    }

    request
}

async fn handle(
    State(state): State<ServiceState>,
    Query(query): Query<WriteQuery>,
    request: Request,
) -> Result<Response, BadWriteRequest> {
    let (parts, body) = request.into_parts();

    // Both checks must fail before any byte of the body is read.
    let tenant = state.tenancy().resolve(&parts.headers)?;
    let precision = Precision::from_query(query.precision.as_deref())?;

    let config = state.config();
    let data = body::read_batch(&parts.headers, body, config.max_batch_size()).await?;
    let points = gateway_influx::decode(&data, precision)?;
    let batch = gateway_influx::convert(&points)?;

    metric!(counter(GatewayCounters::InfluxFieldsSkipped) += batch.skipped_fields as i64);
    if batch.skipped_fields > 0 {
        gateway_log::trace!(
            skipped = batch.skipped_fields,
            "skipped fields without a numeric value"
        );
    }

    let payload = gateway_influx::encode(&batch)?;
    metric!(distribution(GatewayDistributions::InfluxBatchSeries) = batch.series.len() as u64);
    metric!(distribution(GatewayDistributions::InfluxBatchBytes) = payload.len() as u64);

    let mut request = push_request(payload, parts.headers.get(header::USER_AGENT).cloned());
    if let Some(tenant) = tenant {
        gateway_httpgrpc::attach(&mut request, tenant);
    }

    let outcome = state
        .bridge()
        .send(request, Some(config.request_timeout()))
        .await;

    Ok(relay_response(outcome.into_result()?))
}

pub fn route() -> MethodRouter<ServiceState> {
    post(handle)
}
