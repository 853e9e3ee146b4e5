//! The Influx gateway binary.
//!
//! Accepts InfluxDB line protocol over HTTP and writes it as Prometheus remote write requests to
//! a backend that is reachable over httpgrpc. See [`gateway_server`] for the request flow and
//! [`gateway_config`] for the configuration file.
//!
//! ```text
//! influx-gateway run --config ./config --backend-endpoint dns:///distributor:9095
//! ```

mod cli;
mod cliapp;
mod setup;

use std::process;

#[cfg(target_os = "linux")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub fn main() {
    let exit_code = match cli::execute() {
        Ok(()) => 0,
        Err(err) => {
            gateway_log::ensure_error(&err);
            1
        }
    };

    process::exit(exit_code);
}
