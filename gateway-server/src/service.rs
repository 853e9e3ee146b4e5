use std::fmt;
use std::sync::Arc;

use gateway_config::Config;
use gateway_httpgrpc::{
    BridgeClient, BridgeConfig, ConnectError, InvalidTenantId, TenancyInjector, TenancyMode,
};

/// Indicates the type of failure of the server state.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No backend endpoint is configured.
    #[error("no backend endpoint configured")]
    MissingBackend,

    /// The configured static tenant is not a valid tenant id.
    #[error("invalid tenant id in tenancy configuration")]
    InvalidTenant(#[from] InvalidTenantId),

    /// The connection to the backend could not be prepared.
    #[error("could not connect to the backend")]
    Connect(#[from] ConnectError),
}

struct StateInner {
    config: Arc<Config>,
    bridge: BridgeClient,
    tenancy: TenancyInjector,
}

/// Server state.
///
/// Shared by all request handlers. Cloning is cheap.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

impl ServiceState {
    /// Connects to the backend and builds the state for the given configuration.
    pub async fn start(config: Arc<Config>) -> Result<Self, ServiceError> {
        let endpoint = config
            .backend_endpoint()
            .ok_or(ServiceError::MissingBackend)?;

        let tenancy =
            TenancyInjector::from_config(config.tenancy_enabled(), config.static_tenant_id())?;

        let bridge = BridgeClient::connect(&BridgeConfig {
            host: endpoint.host().to_owned(),
            port: endpoint.port(),
            keepalive_interval: config.keepalive_interval(),
            keepalive_timeout: config.keepalive_timeout(),
            connect_timeout: config.connect_timeout(),
            resolve_interval: config.resolve_interval(),
            max_message_size: config.max_message_size(),
        })
        .await?;

        match tenancy.mode() {
            TenancyMode::Disabled => gateway_log::info!("tenancy disabled"),
            TenancyMode::Static(tenant) => gateway_log::info!("using static tenant {tenant}"),
            TenancyMode::PerRequest => gateway_log::info!("deriving tenant from each request"),
        }

        Ok(Self::new(config, bridge, tenancy))
    }

    /// Creates the state from its parts.
    pub fn new(config: Arc<Config>, bridge: BridgeClient, tenancy: TenancyInjector) -> Self {
        Self {
            inner: Arc::new(StateInner {
                config,
                bridge,
                tenancy,
            }),
        }
    }

    /// Returns the gateway configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the client for backend calls.
    pub fn bridge(&self) -> &BridgeClient {
        &self.inner.bridge
    }

    /// Returns the tenancy injector.
    pub fn tenancy(&self) -> &TenancyInjector {
        &self.inner.tenancy
    }
}

impl fmt::Debug for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceState")
            .field("config", &self.inner.config)
            .field("tenancy", &self.inner.tenancy)
            .finish_non_exhaustive()
    }
}
