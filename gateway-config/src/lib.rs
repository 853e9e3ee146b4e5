//! Configuration for the Influx gateway.
//!
//! The configuration is read from `config.yml` in a configuration directory and can be
//! overridden from the command line or the environment with [`OverridableConfig`]:
//!
//! ```yaml
//! gateway:
//!   port: 8080
//! backend:
//!   endpoint: dns:///distributor.cortex.svc:9095
//! tenancy:
//!   enabled: true
//! limits:
//!   max_batch_size: 100KiB
//! ```
#![warn(missing_docs)]

mod byte_size;
mod config;
mod endpoint;

pub use self::byte_size::*;
pub use self::config::*;
pub use self::endpoint::*;
