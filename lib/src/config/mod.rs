// lib/src/config/mod.rs

pub mod config_defaults;
pub mod config_structs;

pub use config_defaults::*;
pub use config_structs::{AppConfig, PolicyConfig, ServerConfig};

use std::path::Path;

use anyhow::{bail, Context, Result};
use ::config::{Config, Environment, File};
use log::{debug, info};

/// Loads the application configuration. Layers, lowest precedence first:
/// built-in defaults, the YAML file at `path` (required when given), then
/// `MEDCONNECT_*` environment variables with `__` between nested keys.
pub fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        info!("Loading configuration from {:?}", path);
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let settings = builder.build().context("Failed to build configuration")?;
    let app_config: AppConfig = settings
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    validate(&app_config)?;
    debug!("Loaded configuration: {:?}", app_config.storage);
    Ok(app_config)
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.policy.default_log_limit == 0 {
        bail!("policy.default_log_limit must be greater than zero");
    }
    if config.server.token_ttl_hours <= 0 {
        bail!("server.token_ttl_hours must be positive");
    }
    Ok(())
}
