//! # S2S - Authenticating SOCKS5 Relay
//!
//! S2S accepts SOCKS5 clients, authenticates them with a fixed
//! username/password pair, checks every requested destination against an
//! allow-list of CIDR ranges, and forwards permitted connections through an
//! unauthenticated upstream SOCKS5 proxy.
//!
//! ## Features
//!
//! - **Username/password only**: clients that do not offer RFC 1929 auth are turned away
//! - **Destination allow-list**: IPv4 and IPv6 ranges, checked after DNS resolution
//! - **Upstream chaining**: outbound connections go through a second SOCKS5 proxy
//! - **CONNECT only**: BIND and UDP ASSOCIATE are refused
//!
//! ## Usage
//!
//! ```rust,ignore
//! use s2s::config::resolve_config;
//! use s2s::RelayServer;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = resolve_config(None)?;
//!     let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
//!
//!     RelayServer::bind(&config).await?.run(shutdown_rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> S2S (auth, allow-list) -> Upstream SOCKS5 -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod allow_list;
pub mod config;
pub mod error;
pub mod resolver;
pub mod server;
pub mod socks;
pub mod transport;
pub mod upstream;

// Re-export commonly used items
pub use allow_list::AllowList;
pub use config::{load_config, resolve_config, Config};
pub use error::RelayError;
pub use resolver::{DestinationResolver, Resolve, SystemResolver};
pub use server::{RelayContext, RelayServer};
pub use upstream::UpstreamConnector;

/// Version of the S2S library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
