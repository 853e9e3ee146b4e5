use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use gateway_statsd::metric;
use http::StatusCode;
use http::uri::PathAndQuery;
use prost::Message;
use tonic::codec::ProstCodec;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};

use crate::balance::{SubchannelId, Subchannels};
use crate::envelope::EnvelopeError;
use crate::proto::{HANDLE_PATH, HTTP_RESPONSE_TYPE, HttpRequest, HttpResponse, RpcStatus};
use crate::statsd::{BridgeCounters, BridgeTimers};
use crate::tenant::{TenantId, TenantInterceptor};

/// Connection parameters of the backend.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Host name or IP address of the backend.
    pub host: String,
    /// Port of the backend.
    pub port: u16,
    /// Interval between HTTP/2 keepalive pings.
    pub keepalive_interval: Duration,
    /// Time to wait for a keepalive ping to be acknowledged.
    pub keepalive_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Interval between lookups of the backend host. Zero resolves only once on connect.
    pub resolve_interval: Duration,
    /// Maximum size of an encoded message, in both directions.
    pub max_message_size: usize,
}

/// Failure to set up the connection to the backend.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The backend host could not be resolved.
    #[error("could not resolve backend address")]
    Resolve(#[source] io::Error),
    /// The backend host resolved to no addresses.
    #[error("backend address resolved to no hosts")]
    NoAddresses,
    /// A resolved address does not form a valid endpoint.
    #[error("invalid backend endpoint")]
    InvalidEndpoint(#[source] tonic::transport::Error),
}

/// A backend call failed and did not carry an HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The RPC failed.
    #[error("backend call failed ({:?}): {}", .0.code(), .0.message())]
    Status(Status),
    /// The call did not complete within the request timeout.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    /// The backend answered with an envelope that is not a valid HTTP response.
    #[error("backend returned an invalid response")]
    InvalidResponse(#[from] EnvelopeError),
}

impl TransportError {
    /// Returns the HTTP status code to respond with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Status(status) if status.code() == Code::DeadlineExceeded => {
                StatusCode::GATEWAY_TIMEOUT
            }
            Self::Status(_) | Self::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn metric_tag(&self) -> &'static str {
        match self {
            Self::Status(status) => code_name(status.code()),
            Self::Timeout(_) => "timeout",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }
}

fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "ok_status",
        Code::Cancelled => "cancelled",
        Code::Unknown => "unknown",
        Code::InvalidArgument => "invalid_argument",
        Code::DeadlineExceeded => "deadline_exceeded",
        Code::NotFound => "not_found",
        Code::AlreadyExists => "already_exists",
        Code::PermissionDenied => "permission_denied",
        Code::ResourceExhausted => "resource_exhausted",
        Code::FailedPrecondition => "failed_precondition",
        Code::Aborted => "aborted",
        Code::OutOfRange => "out_of_range",
        Code::Unimplemented => "unimplemented",
        Code::Internal => "internal",
        Code::Unavailable => "unavailable",
        Code::DataLoss => "data_loss",
        Code::Unauthenticated => "unauthenticated",
    }
}

/// The result of a backend call.
///
/// Backends report HTTP errors as RPC errors that embed the actual response. Those are
/// recovered into [`BridgeOutcome::Embedded`] and must be relayed like regular responses.
#[derive(Debug)]
pub enum BridgeOutcome {
    /// The backend answered normally.
    Response(http::Response<Bytes>),
    /// The backend answered with an RPC error carrying an HTTP response.
    Embedded(http::Response<Bytes>),
    /// The call failed without a response.
    Failed(TransportError),
}

impl BridgeOutcome {
    /// Returns the response to relay to the caller, or the transport failure.
    pub fn into_result(self) -> Result<http::Response<Bytes>, TransportError> {
        match self {
            Self::Response(response) | Self::Embedded(response) => Ok(response),
            Self::Failed(error) => Err(error),
        }
    }

    fn metric_tag(&self) -> &'static str {
        match self {
            Self::Response(_) => "ok",
            Self::Embedded(_) => "embedded",
            Self::Failed(error) => error.metric_tag(),
        }
    }
}

/// A channel that carries request envelopes to the backend.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Performs a single call of the `Handle` method.
    async fn handle(&self, request: tonic::Request<HttpRequest>) -> Result<HttpResponse, Status>;
}

/// Initial delay before reconnecting to a backend address that failed.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound of the reconnect delay.
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(120);

#[derive(Debug)]
struct Shared {
    config: BridgeConfig,
    subchannels: Subchannels<Channel>,
}

/// Transport over gRPC with round-robin balancing across the connected addresses of the backend.
///
/// Every resolved address is connected in the background and reconnected with backoff when its
/// connection fails. Calls are only sent to connected addresses. The backend host is resolved
/// again every [`BridgeConfig::resolve_interval`].
#[derive(Debug)]
pub struct GrpcTransport {
    shared: Arc<Shared>,
}

impl GrpcTransport {
    /// Resolves the backend and starts connecting to every address.
    ///
    /// This does not wait for connections. Calls issued before the first connection attempts
    /// finish wait for them.
    pub async fn connect(config: &BridgeConfig) -> Result<Self, ConnectError> {
        let addrs = resolve(config).await.map_err(ConnectError::Resolve)?;
        if addrs.is_empty() {
            return Err(ConnectError::NoAddresses);
        }

        for &addr in &addrs {
            endpoint(config, addr).map_err(ConnectError::InvalidEndpoint)?;
        }

        let shared = Arc::new(Shared {
            config: config.clone(),
            subchannels: Subchannels::new(),
        });

        for (id, addr) in shared.subchannels.update(&addrs) {
            spawn_connect(&shared, id, addr);
        }

        if !config.resolve_interval.is_zero() {
            tokio::spawn(resolve_loop(Arc::downgrade(&shared)));
        }

        Ok(Self { shared })
    }

    /// Returns the number of resolved backend addresses.
    pub fn channel_count(&self) -> usize {
        self.shared.subchannels.len()
    }

    fn mark_failed(&self, id: SubchannelId, addr: SocketAddr) {
        if self.shared.subchannels.set_failed(id) {
            gateway_log::debug!("lost connection to backend {addr}");
            spawn_connect(&self.shared, id, addr);
        }
    }
}

async fn resolve(config: &BridgeConfig) -> io::Result<Vec<SocketAddr>> {
    let addrs = tokio::net::lookup_host((config.host.as_str(), config.port)).await?;
    Ok(addrs.collect())
}

fn endpoint(config: &BridgeConfig, addr: SocketAddr) -> Result<Endpoint, tonic::transport::Error> {
    Ok(Endpoint::from_shared(format!("http://{addr}"))?
        .connect_timeout(config.connect_timeout)
        .http2_keep_alive_interval(config.keepalive_interval)
        .keep_alive_timeout(config.keepalive_timeout)
        .keep_alive_while_idle(true))
}

fn spawn_connect(shared: &Arc<Shared>, id: SubchannelId, addr: SocketAddr) {
    match endpoint(&shared.config, addr) {
        Ok(endpoint) => {
            tokio::spawn(connect_loop(Arc::downgrade(shared), id, addr, endpoint));
        }
        Err(error) => {
            gateway_log::error!(
                error = &error as &dyn Error,
                "invalid backend endpoint {addr}"
            );
            shared.subchannels.set_failed(id);
        }
    }
}

/// Connects to a single address until it succeeds or the address is removed.
async fn connect_loop(
    shared: Weak<Shared>,
    id: SubchannelId,
    addr: SocketAddr,
    endpoint: Endpoint,
) {
    let mut backoff = RECONNECT_BACKOFF;

    loop {
        let result = endpoint.connect().await;

        let Some(state) = shared.upgrade() else {
            return;
        };

        match result {
            Ok(channel) => {
                gateway_log::debug!("connected to backend {addr}");
                state.subchannels.set_ready(id, channel);
                return;
            }
            Err(error) => {
                gateway_log::warn!(
                    error = &error as &dyn Error,
                    "failed to connect to backend {addr}, retrying in {backoff:?}"
                );
                state.subchannels.set_failed(id);
            }
        }

        drop(state);
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_RECONNECT_BACKOFF);

        match shared.upgrade() {
            Some(state) if state.subchannels.contains(id) => {}
            _ => return,
        }
    }
}

/// Periodically resolves the backend host and applies address changes.
///
/// A failed or empty lookup keeps the current addresses.
async fn resolve_loop(shared: Weak<Shared>) {
    let Some(interval) = shared.upgrade().map(|state| state.config.resolve_interval) else {
        return;
    };

    loop {
        tokio::time::sleep(interval).await;

        let Some(state) = shared.upgrade() else {
            return;
        };

        match resolve(&state.config).await {
            Ok(addrs) if addrs.is_empty() => {
                gateway_log::warn!("backend address resolved to no hosts, keeping previous");
            }
            Ok(addrs) => {
                for (id, addr) in state.subchannels.update(&addrs) {
                    gateway_log::debug!("adding backend address {addr}");
                    spawn_connect(&state, id, addr);
                }
            }
            Err(error) => {
                gateway_log::warn!(
                    error = &error as &dyn Error,
                    "could not resolve backend address, keeping previous"
                );
            }
        }
    }
}

/// Returns `true` if the call failed because of the connection rather than the backend.
fn is_connection_failure(status: &Status) -> bool {
    matches!(status.code(), Code::Unavailable | Code::Unknown) && status.source().is_some()
}

#[async_trait::async_trait]
impl Transport for GrpcTransport {
    async fn handle(&self, request: tonic::Request<HttpRequest>) -> Result<HttpResponse, Status> {
        let Some(picked) = self.shared.subchannels.wait_ready().await else {
            return Err(Status::unavailable("no backend address is reachable"));
        };

        let max_message_size = self.shared.config.max_message_size;
        let service = InterceptedService::new(picked.channel, TenantInterceptor);
        let mut grpc = tonic::client::Grpc::new(service)
            .max_decoding_message_size(max_message_size)
            .max_encoding_message_size(max_message_size);

        if let Err(error) = grpc.ready().await {
            self.mark_failed(picked.id, picked.addr);
            return Err(Status::unavailable(format!("backend not ready: {error}")));
        }

        let result = grpc
            .unary(
                request,
                PathAndQuery::from_static(HANDLE_PATH),
                ProstCodec::default(),
            )
            .await;

        match result {
            Ok(response) => Ok(response.into_inner()),
            Err(status) => {
                if is_connection_failure(&status) {
                    self.mark_failed(picked.id, picked.addr);
                }
                Err(status)
            }
        }
    }
}

/// Recovers an HTTP response embedded in the details of an RPC status.
///
/// The details must be a `google.rpc.Status` with exactly one `HTTPResponse`.
fn unwrap_status(status: &Status) -> Option<HttpResponse> {
    if status.details().is_empty() {
        return None;
    }

    let rpc_status = RpcStatus::decode(status.details()).ok()?;
    let [detail] = rpc_status.details.as_slice() else {
        return None;
    };

    if !detail.type_url.ends_with(HTTP_RESPONSE_TYPE) {
        return None;
    }

    HttpResponse::decode(detail.value.as_slice()).ok()
}

/// Client for the HTTP over gRPC bridge.
///
/// The client is cheap to clone and shares the underlying channels.
#[derive(Clone)]
pub struct BridgeClient {
    transport: Arc<dyn Transport>,
}

impl BridgeClient {
    /// Connects to the backend over gRPC.
    pub async fn connect(config: &BridgeConfig) -> Result<Self, ConnectError> {
        let transport = GrpcTransport::connect(config).await?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Creates a client on top of an existing transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Sends an HTTP request to the backend and returns the outcome.
    ///
    /// A [`TenantId`] in the request extensions is propagated as call metadata. If a `timeout` is
    /// given, it is sent as deadline and the call is aborted when it elapses.
    pub async fn send(
        &self,
        request: http::Request<Bytes>,
        timeout: Option<Duration>,
    ) -> BridgeOutcome {
        let start = Instant::now();

        let (parts, body) = request.into_parts();
        let envelope = HttpRequest::from_parts(&parts.method, &parts.uri, &parts.headers, body);

        let mut call = tonic::Request::new(envelope);
        if let Some(tenant) = parts.extensions.get::<TenantId>() {
            call.extensions_mut().insert(tenant.clone());
        }

        let result = match timeout {
            Some(duration) => {
                call.set_timeout(duration);
                match tokio::time::timeout(duration, self.transport.handle(call)).await {
                    Ok(result) => result.map_err(TransportError::Status),
                    Err(_) => Err(TransportError::Timeout(duration)),
                }
            }
            None => self
                .transport
                .handle(call)
                .await
                .map_err(TransportError::Status),
        };

        let outcome = match result {
            Ok(response) => match response.into_http() {
                Ok(response) => BridgeOutcome::Response(response),
                Err(error) => BridgeOutcome::Failed(error.into()),
            },
            Err(TransportError::Status(status)) => match unwrap_status(&status) {
                Some(embedded) => match embedded.into_http() {
                    Ok(response) => BridgeOutcome::Embedded(response),
                    Err(error) => BridgeOutcome::Failed(error.into()),
                },
                None => BridgeOutcome::Failed(TransportError::Status(status)),
            },
            Err(error) => BridgeOutcome::Failed(error),
        };

        match outcome {
            BridgeOutcome::Response(_) => {}
            BridgeOutcome::Embedded(ref response) => {
                gateway_log::debug!(
                    status = response.status().as_u16(),
                    "backend responded with an error",
                );
            }
            BridgeOutcome::Failed(ref error) => {
                gateway_log::warn!(
                    error = error as &dyn Error,
                    path = parts.uri.path(),
                    "backend call failed",
                );
            }
        }

        let tag = outcome.metric_tag();
        metric!(counter(BridgeCounters::Requests) += 1, outcome = tag);
        metric!(timer(BridgeTimers::RequestDuration) = start.elapsed(), outcome = tag);

        outcome
    }
}

impl std::fmt::Debug for BridgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::*;
    use crate::testutils::{MockTransport, embedded_error};

    fn request() -> http::Request<Bytes> {
        http::Request::builder()
            .method(Method::POST)
            .uri("/api/v1/push")
            .header("content-type", "application/x-protobuf")
            .body(Bytes::from_static(b"payload"))
            .unwrap()
    }

    fn bridge_config(port: u16) -> BridgeConfig {
        BridgeConfig {
            host: "127.0.0.1".to_owned(),
            port,
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            resolve_interval: Duration::ZERO,
            max_message_size: 100 * 1024 * 1024,
        }
    }

    fn response(code: u16, body: &'static str) -> http::Response<Bytes> {
        http::Response::builder()
            .status(code)
            .header("content-type", "text/plain")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_response() {
        let transport = Arc::new(MockTransport::respond_with(|_| response(204, "")));
        let client = BridgeClient::with_transport(transport.clone());

        let mut request = request();
        request
            .extensions_mut()
            .insert(TenantId::new("team-a").unwrap());

        let outcome = client.send(request, Some(Duration::from_secs(3))).await;
        let BridgeOutcome::Response(response) = outcome else {
            panic!("expected a regular response, got {outcome:?}");
        };
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.method, "POST");
        assert_eq!(calls[0].request.url, "/api/v1/push");
        assert_eq!(
            calls[0].request.header("Content-Type"),
            Some("application/x-protobuf")
        );
        assert_eq!(calls[0].request.body, Bytes::from_static(b"payload"));
        assert_eq!(calls[0].tenant, Some(TenantId::new("team-a").unwrap()));
        assert!(calls[0].timeout.is_some());
    }

    #[tokio::test]
    async fn test_send_without_timeout() {
        let transport = Arc::new(MockTransport::respond_with(|_| response(200, "ok")));
        let client = BridgeClient::with_transport(transport.clone());

        let outcome = client.send(request(), None).await;
        assert!(matches!(outcome, BridgeOutcome::Response(_)));

        let calls = transport.calls();
        assert_eq!(calls[0].tenant, None);
        assert_eq!(calls[0].timeout, None);
    }

    #[tokio::test]
    async fn test_embedded_response() {
        let transport = Arc::new(MockTransport::new(|_| {
            Err(embedded_error(response(429, "slow down")))
        }));
        let client = BridgeClient::with_transport(transport);

        let outcome = client.send(request(), None).await;
        let BridgeOutcome::Embedded(response) = outcome else {
            panic!("expected an embedded response, got {outcome:?}");
        };
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.body(), &Bytes::from_static(b"slow down"));
    }

    #[tokio::test]
    async fn test_plain_status_fails() {
        let transport = Arc::new(MockTransport::new(|_| {
            Err(Status::unavailable("connection refused"))
        }));
        let client = BridgeClient::with_transport(transport);

        let error = client.send(request(), None).await.into_result().unwrap_err();
        assert!(matches!(error, TransportError::Status(_)));
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            error.to_string(),
            "backend call failed (Unavailable): connection refused"
        );
    }

    #[test]
    fn test_foreign_details_fail() {
        let details = RpcStatus {
            code: Code::Internal as i32,
            message: "boom".to_owned(),
            details: vec![prost_types::Any {
                type_url: "type.googleapis.com/google.rpc.DebugInfo".to_owned(),
                value: vec![],
            }],
        };
        let status = Status::with_details(
            Code::Internal,
            "boom",
            Bytes::from(details.encode_to_vec()),
        );
        assert!(unwrap_status(&status).is_none());

        let status = Status::with_details(Code::Internal, "boom", Bytes::from_static(b"\xff"));
        assert!(unwrap_status(&status).is_none());
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let transport = Arc::new(MockTransport::new(|_| {
            Err(Status::deadline_exceeded("too slow"))
        }));
        let client = BridgeClient::with_transport(transport);

        let error = client.send(request(), None).await.into_result().unwrap_err();
        assert_eq!(error.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_timeout() {
        let transport = Arc::new(
            MockTransport::respond_with(|_| response(204, ""))
                .with_delay(Duration::from_millis(500)),
        );
        let client = BridgeClient::with_transport(transport);

        let outcome = client.send(request(), Some(Duration::from_millis(10))).await;
        let error = outcome.into_result().unwrap_err();
        assert!(matches!(error, TransportError::Timeout(_)));
        assert_eq!(error.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_invalid_response() {
        let transport = Arc::new(MockTransport::new(|_| {
            Ok(HttpResponse {
                code: 1000,
                ..Default::default()
            })
        }));
        let client = BridgeClient::with_transport(transport);

        let error = client.send(request(), None).await.into_result().unwrap_err();
        assert!(matches!(error, TransportError::InvalidResponse(_)));
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_connect_ip_address() {
        let transport = GrpcTransport::connect(&bridge_config(9095)).await.unwrap();
        assert_eq!(transport.channel_count(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Nothing listens on port 1, so the only address fails to connect.
        let transport = GrpcTransport::connect(&bridge_config(1)).await.unwrap();

        let status = transport
            .handle(tonic::Request::new(HttpRequest::default()))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
        assert_eq!(status.message(), "no backend address is reachable");
    }

    #[test]
    fn test_connection_failure() {
        assert!(!is_connection_failure(&Status::unavailable("overloaded")));

        let mut status = Status::unavailable("connection refused");
        status.set_source(Arc::new(io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(is_connection_failure(&status));

        let mut status = Status::resource_exhausted("slow down");
        status.set_source(Arc::new(io::Error::other("limited")));
        assert!(!is_connection_failure(&status));
    }
}
