//! Middlewares for the HTTP server.
//!
//! This module exposes tower [layers](tower::Layer) and related utilities to configure the
//! axum/hyper HTTP server. All of them are registered as a layer on the [`Router`](axum::Router)
//! in [`make_app`](crate::make_app).

mod handle_panic;
mod metrics;
mod trace;

pub use self::handle_panic::*;
pub use self::metrics::*;
pub use self::trace::*;
