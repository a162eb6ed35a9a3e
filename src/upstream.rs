//! Upstream connector
//!
//! Opens the outbound leg of a session: a TCP connection to the upstream
//! SOCKS5 proxy followed by an unauthenticated CONNECT to the validated
//! destination.

use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};
use crate::transport::SocketOpts;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Connects to destinations through the upstream SOCKS5 proxy
#[derive(Debug, Clone)]
pub struct UpstreamConnector {
    upstream: UpstreamConfig,
    socket_opts: SocketOpts,
    connect_timeout: Duration,
}

impl UpstreamConnector {
    /// Create a connector for the configured upstream
    pub fn new(config: &UpstreamConfig, socket_opts: SocketOpts) -> Self {
        UpstreamConnector {
            upstream: config.clone(),
            socket_opts,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    /// Set the TCP connect timeout toward the upstream
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// TCP connect timeout toward the upstream
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Upstream address as `host:port`
    pub fn upstream_addr(&self) -> String {
        self.upstream.addr()
    }

    /// Open a stream to `target` through the upstream proxy
    ///
    /// The destination is sent as a literal address and only the
    /// no-authentication method is offered.
    pub async fn connect(&self, target: SocketAddr) -> Result<TcpStream> {
        let failed = |reason: String| RelayError::UpstreamConnectFailed {
            upstream: self.upstream_addr(),
            target,
            reason,
        };

        let connect = TcpStream::connect((self.upstream.host.as_str(), self.upstream.port));
        let mut stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| failed("connection timed out".to_string()))?
            .map_err(|e| failed(e.to_string()))?;

        self.socket_opts.hint(&stream);

        async_socks5::connect(&mut stream, target, None)
            .await
            .map_err(|e| failed(e.to_string()))?;

        debug!("Upstream {} connected to {}", self.upstream_addr(), target);

        Ok(stream)
    }
}
