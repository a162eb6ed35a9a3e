//! Relay configuration types
//!
//! Defines the configuration structures for the S2S relay and the
//! environment variables that override them.

use super::TcpConfig;
use crate::allow_list::AllowList;
use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Inbound username
pub const ENV_USERNAME: &str = "SOCKS5_USERNAME";
/// Inbound password
pub const ENV_PASSWORD: &str = "SOCKS5_PASSWORD";
/// Inbound listen port
pub const ENV_INBOUND_PORT: &str = "INBOUND_PORT";
/// Upstream SOCKS5 host
pub const ENV_UPSTREAM_HOST: &str = "TS_SOCKS5_HOST";
/// Upstream SOCKS5 port
pub const ENV_UPSTREAM_PORT: &str = "TS_SOCKS5_PORT";
/// Semicolon-separated CIDR ranges
pub const ENV_ALLOWED_RANGES: &str = "ALLOWED_IP_RANGES";

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    45675
}

fn default_backlog() -> u32 {
    128
}

fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}

fn default_upstream_port() -> u16 {
    1055
}

fn default_upstream_connect_timeout() -> u64 {
    10
}

fn default_ranges() -> Vec<String> {
    vec!["0.0.0.0/0".to_string()]
}

/// Root configuration structure
///
/// Built once at startup and shared read-only with every session.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Inbound listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Expected client credentials
    #[serde(default)]
    pub auth: Credentials,

    /// Upstream SOCKS5 proxy
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Permitted destination ranges
    #[serde(default)]
    pub allow_list: AllowListConfig,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

/// Inbound listener configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, all interfaces by default
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            backlog: default_backlog(),
        }
    }
}

/// The single username/password pair clients must present
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Expected username
    #[serde(default)]
    pub username: String,

    /// Expected password
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Upstream SOCKS5 proxy configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Upstream host name or address
    #[serde(default = "default_upstream_host")]
    pub host: String,

    /// Upstream port
    #[serde(default = "default_upstream_port")]
    pub port: u16,

    /// TCP connect timeout toward the upstream, in seconds
    #[serde(default = "default_upstream_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            port: default_upstream_port(),
            connect_timeout_secs: default_upstream_connect_timeout(),
        }
    }
}

impl UpstreamConfig {
    /// `host:port`, bracketing IPv6 literals
    pub fn addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Allow-list configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AllowListConfig {
    /// CIDR ranges, IPv4 and IPv6 listed independently
    #[serde(default = "default_ranges")]
    pub ranges: Vec<String>,
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self {
            ranges: default_ranges(),
        }
    }
}

impl Config {
    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<(), RelayError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, keyed by environment variable name
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), RelayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup(ENV_USERNAME) {
            self.auth.username = username;
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.auth.password = password;
        }
        if let Some(port) = lookup(ENV_INBOUND_PORT) {
            self.server.port = parse_port(ENV_INBOUND_PORT, &port)?;
        }
        if let Some(host) = lookup(ENV_UPSTREAM_HOST) {
            self.upstream.host = host;
        }
        if let Some(port) = lookup(ENV_UPSTREAM_PORT) {
            self.upstream.port = parse_port(ENV_UPSTREAM_PORT, &port)?;
        }
        if let Some(ranges) = lookup(ENV_ALLOWED_RANGES) {
            self.allow_list.ranges = split_ranges(&ranges);
        }
        Ok(())
    }

    /// Socket address the listener binds to
    pub fn listen_addr(&self) -> Result<SocketAddr, RelayError> {
        let ip: IpAddr = self.server.bind_addr.parse().map_err(|_| {
            RelayError::Config(format!("invalid bind address: {}", self.server.bind_addr))
        })?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.auth.username.is_empty() || self.auth.password.is_empty() {
            return Err(RelayError::Config(format!(
                "both {} and {} must be set",
                ENV_USERNAME, ENV_PASSWORD
            )));
        }
        if self.server.port == 0 {
            return Err(RelayError::Config("listen port must not be 0".to_string()));
        }
        if self.upstream.port == 0 {
            return Err(RelayError::Config("upstream port must not be 0".to_string()));
        }
        if self.upstream.host.is_empty() {
            return Err(RelayError::Config("upstream host is empty".to_string()));
        }
        if self.upstream.connect_timeout_secs == 0 {
            return Err(RelayError::Config(
                "upstream connect timeout must not be 0".to_string(),
            ));
        }
        self.listen_addr()?;
        AllowList::from_ranges(&self.allow_list.ranges)?;
        Ok(())
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, RelayError> {
    value
        .trim()
        .parse()
        .map_err(|_| RelayError::Config(format!("{} is not a valid port: {}", key, value)))
}

/// Split a semicolon-separated range list, skipping blank entries
pub fn split_ranges(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
