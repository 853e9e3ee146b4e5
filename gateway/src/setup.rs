use anyhow::{Context, Result};
use gateway_config::Config;
use gateway_httpgrpc::TenantId;
use gateway_statsd::MetricsClientConfig;

/// Validates the parts of the configuration that are required to run the gateway.
pub fn check_config(config: &Config) -> Result<()> {
    if config.backend_endpoint().is_none() {
        anyhow::bail!(
            "no backend endpoint configured, set `backend.endpoint` in the config file \
             or pass --backend-endpoint"
        );
    }

    if config.max_batch_size() == 0 {
        anyhow::bail!("`limits.max_batch_size` must be greater than zero");
    }

    if config.request_timeout().is_zero() {
        anyhow::bail!("`backend.request_timeout` must be greater than zero");
    }

    if config.tenancy_enabled()
        && let Some(tenant_id) = config.static_tenant_id()
    {
        TenantId::new(tenant_id)
            .with_context(|| format!("invalid tenant id {tenant_id:?}"))?;
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        gateway_log::info!("launching gateway without config folder");
    } else {
        gateway_log::info!(
            "launching gateway from config folder {}",
            config.path().display()
        );
    }

    match config.backend_endpoint() {
        Some(endpoint) => gateway_log::info!("  backend: {endpoint}"),
        None => gateway_log::info!("  backend: -"),
    }

    match (config.tenancy_enabled(), config.static_tenant_id()) {
        (false, _) => gateway_log::info!("  tenancy: disabled"),
        (true, Some(tenant_id)) => gateway_log::info!("  tenancy: static ({tenant_id})"),
        (true, None) => gateway_log::info!("  tenancy: per request"),
    }

    gateway_log::info!("  log level: {}", config.logging().level);
}

/// Initialize the logging system.
pub fn init_logging(config: &Config) {
    gateway_log::init(config.logging());
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    gateway_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags,
        sample_rate: config.metrics_sample_rate(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(value: serde_json::Value) -> Config {
        Config::from_json_value(value).unwrap()
    }

    #[test]
    fn test_check_config() {
        let valid = config(serde_json::json!({
            "backend": {"endpoint": "distributor:9095"},
            "tenancy": {"enabled": true, "tenant_id": "team-a"},
        }));
        assert!(check_config(&valid).is_ok());
    }

    #[test]
    fn test_missing_backend() {
        let error = check_config(&Config::default()).unwrap_err();
        assert!(error.to_string().starts_with("no backend endpoint configured"));
    }

    #[test]
    fn test_invalid_limits() {
        let zero_batch = config(serde_json::json!({
            "backend": {"endpoint": "distributor:9095"},
            "limits": {"max_batch_size": 0},
        }));
        assert!(check_config(&zero_batch).is_err());

        let zero_timeout = config(serde_json::json!({
            "backend": {"endpoint": "distributor:9095", "request_timeout": 0},
        }));
        assert!(check_config(&zero_timeout).is_err());
    }

    #[test]
    fn test_invalid_tenant() {
        let invalid = config(serde_json::json!({
            "backend": {"endpoint": "distributor:9095"},
            "tenancy": {"enabled": true, "tenant_id": "team\na"},
        }));
        assert!(check_config(&invalid).is_err());
    }
}
