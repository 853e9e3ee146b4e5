//! In-memory transport for tests.

use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use prost::Message;
use tonic::{Code, Status};

use crate::client::Transport;
use crate::proto::{HTTP_RESPONSE_TYPE, HttpRequest, HttpResponse, RpcStatus};
use crate::tenant::TenantId;

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, Status> + Send + Sync;

/// A call received by a [`MockTransport`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// The request envelope.
    pub request: HttpRequest,
    /// The tenant propagated with the call.
    pub tenant: Option<TenantId>,
    /// The raw `grpc-timeout` metadata of the call.
    pub timeout: Option<String>,
}

/// A transport that answers calls with a handler function and records them.
pub struct MockTransport {
    handler: Box<Handler>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Creates a transport that answers every call with the result of `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, Status> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Creates a transport that answers every call with a successful HTTP response.
    pub fn respond_with<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> http::Response<Bytes> + Send + Sync + 'static,
    {
        Self::new(move |request| Ok(HttpResponse::from_http(handler(request))))
    }

    /// Delays every response by the given duration.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns all calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn handle(&self, request: tonic::Request<HttpRequest>) -> Result<HttpResponse, Status> {
        let timeout = request
            .metadata()
            .get("grpc-timeout")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let tenant = request.extensions().get::<TenantId>().cloned();
        let request = request.into_inner();

        self.calls.lock().push(RecordedCall {
            request: request.clone(),
            tenant,
            timeout,
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.handler)(&request)
    }
}

/// Builds an RPC error that embeds an HTTP response, the way backends report HTTP errors.
pub fn embedded_error(response: http::Response<Bytes>) -> Status {
    let response = HttpResponse::from_http(response);
    let message = String::from_utf8_lossy(&response.body).into_owned();

    let details = RpcStatus {
        code: response.code,
        message: message.clone(),
        details: vec![prost_types::Any {
            type_url: format!("type.googleapis.com/{HTTP_RESPONSE_TYPE}"),
            value: response.encode_to_vec(),
        }],
    };

    Status::with_details(
        Code::Unknown,
        message,
        Bytes::from(details.encode_to_vec()),
    )
}
