use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;
use gateway_config::{Config, OverridableConfig};

use crate::cliapp::{default_config_path, make_app};
use crate::setup;

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let matches = make_app().get_matches();

    let config_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(default_config_path);

    let mut config = Config::from_path(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    if let Some(("run", run_matches)) = matches.subcommand() {
        config.apply_override(extract_config_args(run_matches))?;
    }

    setup::init_logging(&config);

    match matches.subcommand() {
        Some(("run", _)) => run(config),
        Some(("config", config_matches)) => manage_config(&config, config_matches),
        _ => unreachable!(),
    }
}

/// Extracts config overrides from the arguments of the `run` command.
fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        backend_endpoint: matches.get_one::<String>("backend_endpoint").cloned(),
        tenant_id: matches.get_one::<String>("tenant_id").cloned(),
        listen_address: matches.get_one::<String>("listen_address").cloned(),
    }
}

fn manage_config(config: &Config, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("show", _)) => {
            let yaml = config.to_yaml_string()?;
            io::stdout().lock().write_all(yaml.as_bytes())?;
            Ok(())
        }
        _ => unreachable!(),
    }
}

fn run(config: Config) -> Result<()> {
    setup::check_config(&config)?;
    setup::dump_spawn_infos(&config);
    setup::init_metrics(&config)?;

    gateway_server::run(config)
}
