//! This module implements the definition of the command line app.

use std::path::PathBuf;

use clap::builder::ValueParser;
use clap::{Arg, Command};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Writes InfluxDB line protocol to a Prometheus remote write backend.";

pub fn make_app() -> Command {
    Command::new("influx-gateway")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .env("GATEWAY_CONFIG")
                .value_parser(ValueParser::path_buf())
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the gateway")
                .after_help(
                    "This runs the gateway in the foreground until it's shut down. It will \
                     bind to the address configured in the config file and forward all \
                     requests to the configured backend.",
                )
                .arg(
                    Arg::new("backend_endpoint")
                        .value_name("ADDR")
                        .long("backend-endpoint")
                        .env("GATEWAY_BACKEND_ENDPOINT")
                        .help(
                            "The httpgrpc address of the backend, such as \
                             dns:///distributor:9095.",
                        ),
                )
                .arg(
                    Arg::new("tenant_id")
                        .value_name("ID")
                        .long("tenant-id")
                        .env("GATEWAY_TENANT_ID")
                        .help("Enables multi-tenancy and sends all requests as this tenant."),
                )
                .arg(
                    Arg::new("listen_address")
                        .value_name("ADDR")
                        .long("listen-address")
                        .env("GATEWAY_LISTEN_ADDRESS")
                        .help("The address to listen on, such as 0.0.0.0:8080 or :8080."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the gateway config")
                .subcommand_required(true)
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values which \
                             are not in the config file but filled in from defaults.",
                        ),
                ),
        )
}

/// Returns the default config folder.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(".gateway")
}
