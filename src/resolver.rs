//! Destination resolver
//!
//! Turns a requested target into one concrete, allow-listed socket address.
//! Domain names go through a [`Resolve`] implementation and the first
//! candidate inside the allow-list wins, in the order the resolver returned
//! them. A disallowed address is never picked just because it came first.

use crate::allow_list::AllowList;
use crate::error::{RelayError, Result};
use crate::socks::TargetAddr;
use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

/// DNS lookup seam
#[async_trait]
pub trait Resolve: Debug + Send + Sync {
    /// Candidate addresses for `host`, in resolver order
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, port)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Validates and resolves request targets against the allow-list
#[derive(Debug, Clone)]
pub struct DestinationResolver {
    allow_list: Arc<AllowList>,
    dns: Arc<dyn Resolve>,
}

impl DestinationResolver {
    /// Create a resolver using the system DNS
    pub fn new(allow_list: Arc<AllowList>) -> Self {
        Self::with_dns(allow_list, Arc::new(SystemResolver))
    }

    /// Create a resolver with a custom DNS implementation
    pub fn with_dns(allow_list: Arc<AllowList>, dns: Arc<dyn Resolve>) -> Self {
        Self { allow_list, dns }
    }

    /// The allow-list targets are checked against
    pub fn allow_list(&self) -> &AllowList {
        &self.allow_list
    }

    /// Resolve `target` into an allowed socket address
    ///
    /// Literal IPs outside the list fail with `DestinationDenied`. Domain
    /// lookups that fail, return nothing, or return only disallowed
    /// addresses fail with `ResolutionFailed`.
    pub async fn resolve(&self, target: &TargetAddr) -> Result<SocketAddr> {
        match target {
            TargetAddr::Ip(addr) => {
                if self.allow_list.contains(addr.ip()) {
                    Ok(*addr)
                } else {
                    Err(RelayError::DestinationDenied(addr.ip()))
                }
            }
            TargetAddr::Domain(host, port) => {
                let candidates = self.dns.lookup(host, *port).await.map_err(|e| {
                    RelayError::ResolutionFailed {
                        host: host.clone(),
                        reason: e.to_string(),
                    }
                })?;

                debug!("{} resolved to {:?}", host, candidates);

                if candidates.is_empty() {
                    return Err(RelayError::ResolutionFailed {
                        host: host.clone(),
                        reason: "no addresses returned".to_string(),
                    });
                }

                candidates
                    .into_iter()
                    .find(|ip| self.allow_list.contains(*ip))
                    .map(|ip| SocketAddr::new(ip, *port))
                    .ok_or_else(|| RelayError::ResolutionFailed {
                        host: host.clone(),
                        reason: "no resolved address is in the allow-list".to_string(),
                    })
            }
        }
    }
}
