//! HTTP over gRPC bridge to the backend.
//!
//! The backend does not accept plain HTTP. Instead, every HTTP request is wrapped into an
//! [`HttpRequest`] envelope and sent through the unary `/httpgrpc.HTTP/Handle` method. The
//! backend answers with an [`HttpResponse`] envelope, or with an RPC error that embeds one.
//! [`BridgeClient::send`] hides both cases behind a [`BridgeOutcome`].
//!
//! # Tenancy
//!
//! With multi-tenancy enabled, each call carries the tenant in the `X-Scope-OrgID` header of the
//! envelope and in the `x-scope-orgid` call metadata. The [`TenancyInjector`] determines the
//! tenant of a request and attaches it, the [`TenantInterceptor`] moves it into the metadata.
//!
//! # Balancing
//!
//! The [`GrpcTransport`] connects to every address the backend host resolves to and sends calls
//! round-robin to the connected ones. Failed addresses are reconnected in the background, and the
//! host is resolved again periodically.
//!
//! # Testing
//!
//! The `test` feature exposes a [`MockTransport`] that answers calls in memory.

#![warn(missing_docs)]

mod balance;
mod client;
mod envelope;
mod proto;
mod statsd;
mod tenant;

#[cfg(any(test, feature = "test"))]
mod testutils;

pub use self::client::*;
pub use self::envelope::*;
pub use self::proto::*;
pub use self::tenant::*;

#[cfg(any(test, feature = "test"))]
pub use self::testutils::*;
