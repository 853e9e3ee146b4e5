//! The Influx gateway server.
//!
//! The server accepts batches of InfluxDB line protocol on `POST /api/v1/push/influx/write`,
//! converts them into a Prometheus remote write request, and writes them to the backend through
//! the HTTP over gRPC bridge. Every other request is forwarded to the backend unchanged, and the
//! backend response is relayed to the caller.
//!
//! # Line protocol path
//!
//! 1. The tenant of the request is resolved according to the tenancy configuration.
//! 2. The `precision` query parameter selects the timestamp resolution (`ns`, `us`, `ms`, `s`).
//! 3. The body is read and decompressed up to `limits.max_batch_size`.
//! 4. Points are decoded and converted into one series per numeric field.
//! 5. The series are encoded as snappy compressed protobuf and sent to `/api/v1/push`.
//!
//! Client errors are answered with `400` before anything is sent to the backend. Backend errors
//! that carry an HTTP response are relayed as-is.
//!
//! # Passthrough path
//!
//! Requests to any other path are sent to the backend with their method, path, query, headers
//! and body. Only the tenant header is added.

#![warn(missing_docs)]

mod body;
mod endpoints;
mod middlewares;
mod server;
mod service;
mod shutdown;
mod statsd;

use std::sync::Arc;

use anyhow::Context;
use gateway_config::Config;

pub use self::server::*;
pub use self::service::*;

/// Runs the gateway server until a shutdown signal is received.
///
/// This blocks the current thread. It connects to the backend, binds the listen address from
/// the `config`, and serves requests on a multi-threaded runtime. On shutdown, requests in flight
/// are completed before this function returns.
pub fn run(config: Config) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("gateway-worker")
        .enable_all()
        .build()
        .context("failed to create the runtime")?;

    runtime.block_on(async move {
        let config = Arc::new(config);
        let state = ServiceState::start(config.clone())
            .await
            .context("failed to start the gateway")?;

        let server = HttpServer::bind(state).await?;
        let addr = server.local_addr()?;

        gateway_log::info!("spawning http server");
        gateway_log::info!("  listening on http://{addr}/");
        if let Some(endpoint) = config.backend_endpoint() {
            gateway_log::info!("  forwarding to {endpoint}");
        }

        server.serve(shutdown::signal()).await?;
        Ok(())
    })
}
