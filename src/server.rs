//! Relay server
//!
//! Owns the listening socket and spawns one task per accepted client. The
//! only state shared between sessions is the immutable [`RelayContext`].

use crate::allow_list::AllowList;
use crate::config::{Config, Credentials};
use crate::error::Result;
use crate::resolver::{DestinationResolver, Resolve};
use crate::socks::handle_session;
use crate::transport::{bind_listener, SocketOpts};
use crate::upstream::UpstreamConnector;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Pause after a failed `accept` so fd exhaustion does not spin the loop
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

async fn back_off_after_accept_error(e: &io::Error) {
    error!("Failed to accept connection: {}", e);
    tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
}

/// Read-only state shared by every session
///
/// Built once at startup from the validated configuration.
#[derive(Debug, Clone)]
pub struct RelayContext {
    credentials: Credentials,
    resolver: DestinationResolver,
    connector: UpstreamConnector,
    socket_opts: SocketOpts,
}

impl RelayContext {
    /// Build the context from configuration, using the system resolver
    pub fn from_config(config: &Config) -> Result<Self> {
        let allow_list = Arc::new(AllowList::from_ranges(&config.allow_list.ranges)?);
        let socket_opts = SocketOpts::from_tcp_config(&config.tcp);

        Ok(RelayContext {
            credentials: config.auth.clone(),
            resolver: DestinationResolver::new(allow_list),
            connector: UpstreamConnector::new(&config.upstream, socket_opts.clone()),
            socket_opts,
        })
    }

    /// Replace the DNS implementation used for domain targets
    pub fn with_dns(mut self, dns: Arc<dyn Resolve>) -> Self {
        let allow_list = Arc::new(self.resolver.allow_list().clone());
        self.resolver = DestinationResolver::with_dns(allow_list, dns);
        self
    }

    /// Expected client credentials
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Destination resolver
    pub fn resolver(&self) -> &DestinationResolver {
        &self.resolver
    }

    /// Upstream connector
    pub fn connector(&self) -> &UpstreamConnector {
        &self.connector
    }

    /// Options applied to accepted client sockets
    pub fn socket_opts(&self) -> &SocketOpts {
        &self.socket_opts
    }
}

/// SOCKS5 relay listener
pub struct RelayServer {
    listener: TcpListener,
    ctx: Arc<RelayContext>,
}

impl RelayServer {
    /// Bind the listening socket described by `config`
    pub async fn bind(config: &Config) -> Result<Self> {
        let ctx = RelayContext::from_config(config)?;
        Self::bind_with_context(config.listen_addr()?, config.server.backlog, ctx).await
    }

    /// Bind `addr` and serve sessions with a prepared context
    pub async fn bind_with_context(
        addr: SocketAddr,
        backlog: u32,
        ctx: RelayContext,
    ) -> Result<Self> {
        let listener = bind_listener(addr, backlog)?;
        Ok(RelayServer {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until shutdown
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("Listening on {}", self.local_addr()?);
        info!("Upstream SOCKS5 proxy: {}", self.ctx.connector().upstream_addr());
        info!(
            "Allow-list has {} range(s)",
            self.ctx.resolver().allow_list().len()
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!("Accepted connection from {}", peer);
                            self.ctx.socket_opts().hint(&stream);

                            let ctx = self.ctx.clone();
                            let span = info_span!("session", %peer);
                            tokio::spawn(
                                async move {
                                    if let Err(e) = handle_session(stream, peer, &ctx).await {
                                        warn!("Session failed: {}", e);
                                    }
                                    debug!("Connection closed");
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => back_off_after_accept_error(&e).await,
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        info!("Listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_config() -> Config {
        Config {
            auth: Credentials {
                username: "user".to_string(),
                password: "pass".to_string(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_context_from_config() {
        let ctx = RelayContext::from_config(&test_config()).unwrap();
        assert_eq!(ctx.credentials().username, "user");
        assert_eq!(ctx.connector().upstream_addr(), "127.0.0.1:1055");
        assert!(ctx.resolver().allow_list().contains_str("8.8.8.8"));
        assert!(!ctx.resolver().allow_list().contains_str("::1"));
    }

    #[test]
    fn test_context_rejects_bad_ranges() {
        let mut config = test_config();
        config.allow_list.ranges = vec!["bogus".to_string()];
        assert!(RelayContext::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_accept_error_backs_off() {
        let err = io::Error::from_raw_os_error(24); // EMFILE
        let start = std::time::Instant::now();
        back_off_after_accept_error(&err).await;
        let waited = start.elapsed();
        assert!(waited >= ACCEPT_ERROR_DELAY);
        assert!(waited < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_server_accepts_and_stops() {
        let mut config = test_config();
        config.server.bind_addr = "127.0.0.1".to_string();
        let ctx = RelayContext::from_config(&config).unwrap();
        let server = RelayServer::bind_with_context("127.0.0.1:0".parse().unwrap(), 16, ctx)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(server.run(shutdown_rx));

        // A greeting without username/password is answered with 0xFF
        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0xFF]);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
