use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Crates of this workspace that log at the configured level.
///
/// All other crates log at `INFO` unless overridden with `RUST_LOG`.
const CRATE_NAMES: &[&str] = &[
    "influx_gateway",
    "gateway_config",
    "gateway_httpgrpc",
    "gateway_influx",
    "gateway_log",
    "gateway_server",
    "gateway_statsd",
];

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO  influx_gateway::setup > listening on http://0.0.0.0:8080/
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2020-12-04T12:10:32Z  INFO influx_gateway::setup: listening on http://0.0.0.0:8080/
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2020-12-04T12:11:08.729716Z","level":"INFO","fields":{"message":"listening on http://0.0.0.0:8080/"},"target":"influx_gateway::setup"}
    /// ```
    Json,
}

/// The maximum log level of the gateway's own crates.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only log errors.
    Error,
    /// Log errors and warnings.
    Warn,
    /// Log regular operational messages.
    Info,
    /// Log messages relevant to debugging.
    Debug,
    /// Log everything.
    Trace,
    /// Disable logging for the gateway's crates.
    Off,
}

impl LogLevel {
    /// Returns the `tracing` filter for this level.
    pub const fn level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
            Self::Off => LevelFilter::OFF,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.level_filter().fmt(f)
    }
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the gateway's crates.
    pub level: LogLevel,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Auto,
        }
    }
}

/// Builds the default filter directives if `RUST_LOG` is not set.
fn default_filter(level: LogLevel) -> EnvFilter {
    let mut directives = String::from("info");
    for name in CRATE_NAMES {
        directives.push_str(&format!(",{name}={}", level.level_filter()));
    }
    // The HTTP/2 stack of the RPC transport is very spammy on INFO.
    directives.push_str(",h2=warn,tower=warn");

    EnvFilter::new(directives)
}

/// Initialize the logging system.
///
/// Calling this more than once has no effect.
///
/// # Example
///
/// ```
/// let log_config = gateway_log::LogConfig {
///     format: gateway_log::LogFormat::Json,
///     ..Default::default()
/// };
///
/// gateway_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            fmt::layer().with_target(true).pretty().boxed()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            fmt::layer().with_ansi(false).compact().boxed()
        }
        (LogFormat::Json, _) => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(filter))
        .try_init()
        .ok();
}
