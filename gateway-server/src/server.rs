use std::io;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

use crate::middlewares::{self, CatchPanicLayer};
use crate::service::ServiceState;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[from] io::Error),
}

/// Builds the axum application with all routes and middleware.
pub fn make_app(state: ServiceState) -> Router {
    // Build the router middleware into a single service which runs _after_ routing. Service
    // builder order defines layers added first will be called first. This means:
    //  - Requests go from top to bottom
    //  - Responses go from bottom to top
    let middleware = ServiceBuilder::new()
        .layer(axum::middleware::from_fn(middlewares::metrics))
        .layer(CatchPanicLayer::custom(middlewares::handle_panic))
        .layer(middlewares::trace_http_layer());

    crate::endpoints::routes()
        .layer(middleware)
        .with_state(state)
}

/// HTTP server of the gateway.
///
/// Serves the line protocol endpoint and forwards all other requests to the backend.
#[derive(Debug)]
pub struct HttpServer {
    state: ServiceState,
    listener: TcpListener,
}

impl HttpServer {
    /// Binds to the listen address in the configuration of `state`.
    pub async fn bind(state: ServiceState) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(state.config().listen_addr()).await?;
        Ok(Self { state, listener })
    }

    /// Returns the address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves requests until `shutdown` resolves, then waits for in-flight requests.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self { state, listener } = self;

        axum::serve(listener, make_app(state))
            .with_graceful_shutdown(shutdown)
            .await?;

        gateway_log::info!("http server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Method, Request, Response, StatusCode, header};
    use bytes::Bytes;
    use gateway_config::Config;
    use gateway_httpgrpc::{
        BridgeClient, MockTransport, TenancyInjector, TenancyMode, TenantId, embedded_error,
    };
    use gateway_influx::remote_write::{Label, WriteRequest};
    use prost::Message;
    use tonic::Status;
    use tower::ServiceExt;

    use super::*;
    use crate::endpoints::WRITE_PATH;

    fn no_content() -> Response<Bytes> {
        Response::builder()
            .status(StatusCode::NO_CONTENT)
            .body(Bytes::new())
            .unwrap()
    }

    fn app_with(config: Config, mode: TenancyMode, transport: &Arc<MockTransport>) -> Router {
        let bridge = BridgeClient::with_transport(transport.clone());
        let state = ServiceState::new(Arc::new(config), bridge, TenancyInjector::new(mode));
        make_app(state)
    }

    fn app(transport: &Arc<MockTransport>) -> Router {
        app_with(Config::default(), TenancyMode::Disabled, transport)
    }

    fn write(query: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(format!("{WRITE_PATH}{query}"))
            .body(body.into())
            .unwrap()
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn test_write() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));

        let mut request = write("?precision=s", "cpu,host=a value=1 1000000000");
        request
            .headers_mut()
            .insert(header::USER_AGENT, "telegraf".parse().unwrap());

        let (status, _) = call(app(&transport), request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);

        let call = &calls[0];
        assert_eq!(call.request.method, "POST");
        assert_eq!(call.request.url, "/api/v1/push");
        assert_eq!(call.request.header("Content-Encoding"), Some("snappy"));
        assert_eq!(
            call.request.header("Content-Type"),
            Some("application/x-protobuf")
        );
        assert_eq!(
            call.request.header("X-Prometheus-Remote-Write-Version"),
            Some("0.1.0")
        );
        assert_eq!(call.request.header("User-Agent"), Some("telegraf"));
        assert!(call.timeout.is_some());
        assert!(call.tenant.is_none());

        let raw = snap::raw::Decoder::new()
            .decompress_vec(&call.request.body)
            .unwrap();
        let write_request = WriteRequest::decode(raw.as_slice()).unwrap();

        assert_eq!(write_request.timeseries.len(), 1);
        let series = &write_request.timeseries[0];
        assert_eq!(
            series.labels,
            vec![
                Label {
                    name: "__name__".to_owned(),
                    value: "cpu".to_owned(),
                },
                Label {
                    name: "host".to_owned(),
                    value: "a".to_owned(),
                },
            ]
        );
        assert_eq!(series.samples.len(), 1);
        assert_eq!(series.samples[0].value, 1.0);
        assert_eq!(series.samples[0].timestamp, 1_000_000_000_000);
    }

    #[tokio::test]
    async fn test_write_requires_post() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));

        let request = Request::builder()
            .method(Method::GET)
            .uri(WRITE_PATH)
            .body(Body::empty())
            .unwrap();

        let (status, _) = call(app(&transport), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_invalid_precision() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));

        let (status, body) = call(app(&transport), write("?precision=h", "cpu value=1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "precision supplied is not valid: h");
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_parse_error() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));

        let (status, body) = call(app(&transport), write("", "cpu")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_gzip_bomb() {
        use std::io::Write;

        use flate2::Compression;
        use flate2::write::GzEncoder;

        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&vec![b'a'; 1024 * 1024]).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut request = write("", compressed);
        request
            .headers_mut()
            .insert(header::CONTENT_ENCODING, "gzip".parse().unwrap());

        let (status, _) = call(app(&transport), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_write_embedded_response() {
        let transport = Arc::new(MockTransport::new(|_| {
            Err(embedded_error(
                Response::builder()
                    .status(StatusCode::TOO_MANY_REQUESTS)
                    .body(Bytes::from_static(b"ingestion rate limit exceeded"))
                    .unwrap(),
            ))
        }));

        let (status, body) = call(app(&transport), write("", "cpu value=1 0")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, "ingestion rate limit exceeded");
    }

    #[tokio::test]
    async fn test_write_transport_failure() {
        gateway_log::init_test!();

        let transport = Arc::new(MockTransport::new(|_| {
            Err(Status::unavailable("connection refused"))
        }));

        let (status, _) = call(app(&transport), write("", "cpu value=1 0")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_static_tenant() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));
        let mode = TenancyMode::Static(TenantId::new("team-a").unwrap());
        let app = app_with(Config::default(), mode, &transport);

        let (status, _) = call(app, write("", "cpu value=1 0")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let calls = transport.calls();
        assert_eq!(calls[0].request.header("X-Scope-OrgID"), Some("team-a"));
        assert_eq!(
            calls[0].tenant.as_ref().map(TenantId::as_str),
            Some("team-a")
        );
    }

    #[tokio::test]
    async fn test_static_tenant_conflict() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));
        let mode = TenancyMode::Static(TenantId::new("team-a").unwrap());
        let app = app_with(Config::default(), mode, &transport);

        let mut request = write("", "cpu value=1 0");
        request
            .headers_mut()
            .insert("x-scope-orgid", "team-b".parse().unwrap());

        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_per_request_tenant() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));

        let app = app_with(Config::default(), TenancyMode::PerRequest, &transport);
        let (status, _) = call(app, write("", "cpu value=1 0")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(transport.calls().is_empty());

        let mut request = write("", "cpu value=1 0");
        request
            .headers_mut()
            .insert("x-scope-orgid", "team-c".parse().unwrap());

        let app = app_with(Config::default(), TenancyMode::PerRequest, &transport);
        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(
            transport.calls()[0].tenant.as_ref().map(TenantId::as_str),
            Some("team-c")
        );
    }

    #[tokio::test]
    async fn test_forward() {
        let transport = Arc::new(MockTransport::respond_with(|_| {
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-backend", "ingester-1")
                .body(Bytes::from_static(b"{\"status\":\"success\"}"))
                .unwrap()
        }));

        let request = Request::builder()
            .method(Method::GET)
            .uri("/prometheus/api/v1/query?query=up")
            .header(header::ACCEPT, "application/json")
            .body(Body::empty())
            .unwrap();

        let response = app(&transport).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(response.headers()["x-backend"], "ingester-1");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body, Bytes::from_static(b"{\"status\":\"success\"}"));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].request.method, "GET");
        assert_eq!(calls[0].request.url, "/prometheus/api/v1/query?query=up");
        assert_eq!(calls[0].request.header("Accept"), Some("application/json"));
        assert_eq!(calls[0].timeout, None);
    }

    #[tokio::test]
    async fn test_forward_embedded_response() {
        let transport = Arc::new(MockTransport::new(|_| {
            Err(embedded_error(
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Bytes::from_static(b"404 page not found"))
                    .unwrap(),
            ))
        }));

        let request = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();

        let (status, body) = call(app(&transport), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found");
    }

    #[tokio::test]
    async fn test_forward_too_large() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));
        let config = Config::from_json_value(serde_json::json!({
            "limits": {"max_forward_size": 16}
        }))
        .unwrap();
        let app = app_with(config, TenancyMode::Disabled, &transport);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/rules/namespace")
            .body(Body::from(vec![b'a'; 32]))
            .unwrap();

        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_forward_static_tenant() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));
        let mode = TenancyMode::Static(TenantId::new("team-a").unwrap());
        let app = app_with(Config::default(), mode, &transport);

        let request = Request::builder()
            .uri("/api/v1/labels")
            .body(Body::empty())
            .unwrap();

        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(
            transport.calls()[0].request.header("X-Scope-OrgID"),
            Some("team-a")
        );
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        gateway_log::init_test!();

        let transport = Arc::new(MockTransport::new(|_| panic!("backend exploded")));

        let (status, body) = call(app(&transport), write("", "cpu value=1 0")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "internal server error");
    }

    #[test]
    fn test_metrics() {
        let transport = Arc::new(MockTransport::respond_with(|_| no_content()));

        let captures = gateway_statsd::with_capturing_test_client(|| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let body = "cpu,host=a value=1,text=\"x\" 0\nmem used=2 0";
                let (status, _) = call(app(&transport), write("", body)).await;
                assert_eq!(status, StatusCode::NO_CONTENT);

                let (status, _) = call(app(&transport), write("?precision=h", "")).await;
                assert_eq!(status, StatusCode::BAD_REQUEST);
            });
        });

        let has = |line: &str| captures.iter().any(|capture| capture == line);
        assert!(has("influx.fields.skipped:1|c"), "{captures:?}");
        assert!(has("influx.batch.series:2|d"), "{captures:?}");
        assert!(has("bridge.requests:1|c|#outcome:ok"), "{captures:?}");
        assert!(has("influx.rejected:1|c|#reason:precision"), "{captures:?}");
        assert!(
            has("requests:1|c|#route:/api/v1/push/influx/write,status:204"),
            "{captures:?}"
        );
        assert!(
            has("requests:1|c|#route:/api/v1/push/influx/write,status:400"),
            "{captures:?}"
        );
    }
}
