use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gateway_log::LogConfig;
use serde::{Deserialize, Serialize};

use crate::byte_size::ByteSize;
use crate::endpoint::BackendEndpoint;

/// The name of the configuration file inside the config directory.
const CONFIG_FILE_NAME: &str = "config.yml";

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: Some(Box::new(cause)),
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(path.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ConfigErrorSource::None => self.kind.fmt(f),
            ConfigErrorSource::File(file_name) => {
                write!(f, "{} (file {})", self.kind, file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, "{} (field {name})", self.kind),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to serialize the configuration.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

/// Configuration values that can be overridden from the command line or the environment.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The RPC backend address.
    pub backend_endpoint: Option<String>,
    /// A static tenant. A non-empty value enables tenancy.
    pub tenant_id: Option<String>,
    /// The address the HTTP server binds to, as `host:port` or `:port`.
    pub listen_address: Option<String>,
}

/// Settings of the inbound HTTP server.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Gateway {
    /// The host the gateway binds to.
    pub host: IpAddr,
    /// The port the gateway binds to.
    pub port: u16,
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
        }
    }
}

/// Settings of the RPC backend connection.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Backend {
    /// Address of the RPC backend.
    pub endpoint: Option<BackendEndpoint>,
    /// Interval of HTTP/2 keepalive pings, in seconds.
    pub keepalive_interval: u64,
    /// Time to wait for a keepalive acknowledgement, in seconds.
    pub keepalive_timeout: u64,
    /// Time to establish a connection, in seconds.
    pub connect_timeout: u64,
    /// Interval between DNS lookups of the backend host, in seconds.
    pub resolve_interval: u64,
    /// Deadline of a translated write, in seconds.
    pub request_timeout: u64,
    /// Maximum size of an RPC message in either direction.
    pub max_message_size: ByteSize,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            endpoint: None,
            keepalive_interval: 10,
            keepalive_timeout: 5,
            connect_timeout: 5,
            resolve_interval: 30,
            request_timeout: 3,
            max_message_size: ByteSize::mebibytes(100),
        }
    }
}

/// Multi-tenant isolation settings.
#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct Tenancy {
    /// Attach a tenant to every backend call.
    pub enabled: bool,
    /// A static tenant. If absent, the tenant is taken from each request.
    pub tenant_id: Option<String>,
}

/// Size limits of inbound requests.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Limits {
    /// Maximum decompressed size of a line protocol batch.
    pub max_batch_size: ByteSize,
    /// Maximum size of a forwarded request body.
    pub max_forward_size: ByteSize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_batch_size: ByteSize::kibibytes(100),
            max_forward_size: ByteSize::mebibytes(20),
        }
    }
}

/// Internal metrics settings.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct Metrics {
    /// Address of a statsd server. Metrics are disabled if not set.
    pub statsd: Option<String>,
    /// Prefix of all metric names.
    pub prefix: String,
    /// Tags added to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Tag name under which the hostname is reported.
    pub hostname_tag: Option<String>,
    /// Global sample rate.
    pub sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            statsd: None,
            prefix: "influx_gateway".to_owned(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            sample_rate: 1.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
struct ConfigValues {
    gateway: Gateway,
    backend: Backend,
    tenancy: Tenancy,
    limits: Limits,
    logging: LogConfig,
    metrics: Metrics,
}

impl ConfigValues {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(ConfigError::wrap(error, ConfigErrorKind::CouldNotOpenFile).file(path));
            }
        };

        serde_yaml::from_reader(io::BufReader::new(file))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(path))
    }
}

/// The gateway configuration.
///
/// Built once at startup and shared immutably afterwards.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// A missing `config.yml` yields the default configuration.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        Ok(Self {
            values: ConfigValues::load(&path.join(CONFIG_FILE_NAME))?,
            path,
        })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(Self {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Overrides configuration with values from the command line or environment.
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(endpoint) = overrides.backend_endpoint {
            self.values.backend.endpoint = Some(
                endpoint
                    .parse()
                    .map_err(|err| ConfigError::for_field(err, "backend_endpoint"))?,
            );
        }

        if let Some(tenant_id) = overrides.tenant_id.filter(|id| !id.is_empty()) {
            self.values.tenancy.enabled = true;
            self.values.tenancy.tenant_id = Some(tenant_id);
        }

        if let Some(address) = overrides.listen_address {
            let gateway = &mut self.values.gateway;
            match address.strip_prefix(':') {
                Some(port) => {
                    gateway.host = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
                    gateway.port = port
                        .parse()
                        .map_err(|err| ConfigError::for_field(err, "listen_address"))?;
                }
                None => {
                    let addr: SocketAddr = address
                        .parse()
                        .map_err(|err| ConfigError::for_field(err, "listen_address"))?;
                    gateway.host = addr.ip();
                    gateway.port = addr.port();
                }
            }
        }

        Ok(self)
    }

    /// Returns the config directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the socket address the HTTP server listens on.
    pub fn listen_addr(&self) -> SocketAddr {
        (self.values.gateway.host, self.values.gateway.port).into()
    }

    /// Returns the RPC backend, if configured.
    pub fn backend_endpoint(&self) -> Option<&BackendEndpoint> {
        self.values.backend.endpoint.as_ref()
    }

    /// Returns the interval of HTTP/2 keepalive pings to the backend.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.values.backend.keepalive_interval)
    }

    /// Returns how long to wait for a keepalive acknowledgement.
    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.values.backend.keepalive_timeout)
    }

    /// Returns the connect timeout for backend channels.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.values.backend.connect_timeout)
    }

    /// Returns the interval between DNS lookups of the backend host.
    pub fn resolve_interval(&self) -> Duration {
        Duration::from_secs(self.values.backend.resolve_interval)
    }

    /// Returns the deadline of a translated write.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.values.backend.request_timeout)
    }

    /// Returns the maximum RPC message size in bytes.
    pub fn max_message_size(&self) -> usize {
        self.values.backend.max_message_size.as_bytes() as usize
    }

    /// Returns `true` if backend calls carry a tenant.
    pub fn tenancy_enabled(&self) -> bool {
        self.values.tenancy.enabled
    }

    /// Returns the static tenant, if one is configured.
    pub fn static_tenant_id(&self) -> Option<&str> {
        self.values
            .tenancy
            .tenant_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Returns the maximum decompressed size of a line protocol batch in bytes.
    pub fn max_batch_size(&self) -> usize {
        self.values.limits.max_batch_size.as_bytes() as usize
    }

    /// Returns the maximum size of a forwarded request body in bytes.
    pub fn max_forward_size(&self) -> usize {
        self.values.limits.max_forward_size.as_bytes() as usize
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the statsd address, if metrics are enabled.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix of all metric names.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the tags added to every metric.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the tag name for the hostname, if enabled.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the global metrics sample rate.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use gateway_log::LogFormat;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.backend_endpoint(), None);
        assert_eq!(config.keepalive_interval(), Duration::from_secs(10));
        assert_eq!(config.keepalive_timeout(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.resolve_interval(), Duration::from_secs(30));
        assert_eq!(config.max_message_size(), 100 * 1024 * 1024);
        assert_eq!(config.max_batch_size(), 100 * 1024);
        assert_eq!(config.max_forward_size(), 20 * 1024 * 1024);
        assert!(!config.tenancy_enabled());
        assert_eq!(config.static_tenant_id(), None);
        assert_eq!(config.metrics_prefix(), "influx_gateway");
        assert_eq!(config.statsd_addr(), None);
    }

    #[test]
    fn test_from_json_value() {
        let config = Config::from_json_value(serde_json::json!({
            "backend": {"endpoint": "dns:///distributor:9095", "request_timeout": 10},
            "tenancy": {"enabled": true, "tenant_id": "team-a"},
            "limits": {"max_batch_size": "1MiB"},
            "logging": {"format": "json"},
        }))
        .unwrap();

        assert_eq!(config.backend_endpoint().unwrap().to_string(), "distributor:9095");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.tenancy_enabled());
        assert_eq!(config.static_tenant_id(), Some("team-a"));
        assert_eq!(config.max_batch_size(), 1024 * 1024);
        assert_eq!(config.logging().format, LogFormat::Json);
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = fs::File::create(dir.path().join("config.yml")).unwrap();
        writeln!(file, "gateway:\n  port: 9000\nbackend:\n  endpoint: cortex:9095").unwrap();

        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.listen_addr().port(), 9000);
        assert_eq!(config.backend_endpoint().unwrap().host(), "cortex");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_path(dir.path()).unwrap();
        assert_eq!(config.listen_addr().port(), 8080);
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yml"), "gateway: [").unwrap();

        let error = Config::from_path(dir.path()).unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadYaml);
        assert!(error.to_string().starts_with("could not parse yaml config file (file "));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                backend_endpoint: Some("cortex:9095".to_owned()),
                tenant_id: Some("team-b".to_owned()),
                listen_address: Some(":9999".to_owned()),
            })
            .unwrap();

        assert_eq!(config.backend_endpoint().unwrap().port(), 9095);
        assert!(config.tenancy_enabled());
        assert_eq!(config.static_tenant_id(), Some("team-b"));
        assert_eq!(config.listen_addr(), "0.0.0.0:9999".parse().unwrap());
    }

    #[test]
    fn test_empty_tenant_override_keeps_tenancy_off() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                tenant_id: Some(String::new()),
                ..Default::default()
            })
            .unwrap();
        assert!(!config.tenancy_enabled());
    }

    #[test]
    fn test_invalid_override_names_field() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                listen_address: Some("localhost".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field listen_address)");
        assert!(error.source().is_some());
    }

    #[test]
    fn test_yaml_dump() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                backend_endpoint: Some("cortex:9095".to_owned()),
                ..Default::default()
            })
            .unwrap();

        let yaml = config.to_yaml_string().unwrap();
        assert!(yaml.contains("max_message_size: 100MiB"));
        assert!(yaml.contains("max_batch_size: 100KiB"));

        let values: ConfigValues = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(values.backend.endpoint, config.values.backend.endpoint);
        assert_eq!(values.limits.max_forward_size, ByteSize::mebibytes(20));
        assert_eq!(values.gateway.port, 8080);
    }
}
