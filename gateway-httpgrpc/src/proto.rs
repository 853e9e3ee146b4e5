//! Protobuf messages of the `httpgrpc` service.
//!
//! The bridge exposes a single unary method, `/httpgrpc.HTTP/Handle`, that takes an HTTP request
//! envelope and returns an HTTP response envelope.

use bytes::Bytes;

/// Path of the unary handler method.
pub const HANDLE_PATH: &str = "/httpgrpc.HTTP/Handle";

/// Type URL suffix of an [`HttpResponse`] packed into a `google.protobuf.Any`.
pub const HTTP_RESPONSE_TYPE: &str = "httpgrpc.HTTPResponse";

/// An HTTP request carried over the bridge.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpRequest {
    /// The request method, such as `POST`.
    #[prost(string, tag = "1")]
    pub method: String,
    /// Path and query of the request.
    #[prost(string, tag = "2")]
    pub url: String,
    /// Request headers, one entry per distinct name.
    #[prost(message, repeated, tag = "3")]
    pub headers: Vec<Header>,
    /// The raw request body.
    #[prost(bytes = "bytes", tag = "4")]
    pub body: Bytes,
}

/// An HTTP response carried over the bridge.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpResponse {
    /// The HTTP status code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// Response headers, one entry per distinct name.
    #[prost(message, repeated, tag = "2")]
    pub headers: Vec<Header>,
    /// The raw response body.
    #[prost(bytes = "bytes", tag = "3")]
    pub body: Bytes,
}

/// A header name with all of its values.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Header {
    /// The header name in canonical form, such as `Content-Type`.
    #[prost(string, tag = "1")]
    pub key: String,
    /// All values of the header in order.
    #[prost(string, repeated, tag = "2")]
    pub values: Vec<String>,
}

/// The `google.rpc.Status` message sent in the `grpc-status-details-bin` trailer.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcStatus {
    /// The status code.
    #[prost(int32, tag = "1")]
    pub code: i32,
    /// A developer facing error message.
    #[prost(string, tag = "2")]
    pub message: String,
    /// Error details.
    #[prost(message, repeated, tag = "3")]
    pub details: Vec<prost_types::Any>,
}
