//! Configuration module for S2S
//!
//! Configuration is read once at startup: built-in defaults, then an
//! optional TOML file, then environment variables.

mod server;
mod transport;

pub use server::{
    split_ranges, AllowListConfig, Config, Credentials, ServerConfig, UpstreamConfig,
    ENV_ALLOWED_RANGES, ENV_INBOUND_PORT, ENV_PASSWORD, ENV_UPSTREAM_HOST, ENV_UPSTREAM_PORT,
    ENV_USERNAME,
};
pub use transport::TcpConfig;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}

/// Resolve the effective configuration
///
/// Starts from `path` when given (defaults otherwise), overlays the process
/// environment and validates the result.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    config
        .apply_env()
        .with_context(|| "Invalid environment configuration")?;
    config.validate()?;

    Ok(config)
}
