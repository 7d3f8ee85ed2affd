use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Result, WrapErr};

use crate::config::{models::ProxyConfig, validation::ProxyConfigValidator};

/// Prefix for environment overrides, e.g. `SCATTER_LISTEN_ADDR` or
/// `SCATTER_TRANSPORT__CONNECT_TIMEOUT_SECS`.
const ENV_PREFIX: &str = "SCATTER";

/// Load and validate configuration from a file using the config crate.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<ProxyConfig> {
    let config = load_config_sync(config_path)?;
    ProxyConfigValidator::validate(&config)
        .wrap_err_with(|| format!("Invalid configuration in {config_path}"))?;
    Ok(config)
}

/// Load configuration synchronously, without validation
pub fn load_config_sync(config_path: &str) -> Result<ProxyConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Toml,
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .wrap_err_with(|| format!("Failed to build config from {}", config_path.display()))?;

    let proxy_config: ProxyConfig = settings.try_deserialize().wrap_err_with(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(proxy_config)
}

/// Load configuration without validation (used for validation command)
pub async fn load_config_unchecked(config_path: &str) -> Result<ProxyConfig> {
    load_config_sync(config_path)
}
