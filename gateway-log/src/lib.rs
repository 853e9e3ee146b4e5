//! Logging facade for the gateway.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with a [`LogConfig`]. The configuration
//! implements `serde` traits, so it can be obtained from configuration files. This requires the
//! `init` feature.
//!
//! ```ignore
//! use gateway_log::LogConfig;
//!
//! let log_config = LogConfig {
//!     level: gateway_log::LogLevel::Debug,
//!     ..LogConfig::default()
//! };
//!
//! gateway_log::init(&log_config);
//! ```
//!
//! # Logging
//!
//! The basic use of the crate is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log
//! messages and `trace!` the lowest. Each of these macros accept format strings similarly to
//! [`println!`], as well as structured fields.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior.
//! - [`warn!`] for undesirable behavior, such as an unreachable backend.
//! - [`info!`] for messages relevant to the average operator.
//! - [`debug!`] for messages usually relevant to debugging, such as rejected batches.
//! - [`trace!`] for full auxiliary information.
//!
//! ## Logging Error Types
//!
//! To log errors with all their causes, use the [`LogError`] wrapper:
//!
//! ```
//! use std::io::{Error, ErrorKind};
//! use gateway_log::LogError;
//!
//! let custom_error = Error::new(ErrorKind::Other, "oh no!");
//! gateway_log::error!("operation failed: {}", LogError(&custom_error));
//! ```
//!
//! # Testing
//!
//! For unit testing, there is a separate initialization macro [`init_test!`] that should be
//! called at the beginning of a test. It logs into the test output and enables all levels for
//! the calling crate. This requires the `test` feature.

#![warn(missing_docs)]

#[cfg(feature = "init")]
mod setup;
#[cfg(feature = "init")]
pub use setup::*;

#[cfg(feature = "test")]
mod test;
#[cfg(feature = "test")]
pub use test::*;

mod utils;
pub use utils::*;

// Expose the minimal log facade.
#[doc(inline)]
pub use tracing::{Level, debug, error, info, trace, warn};
