//! Error types for S2S
//!
//! Every failure a session can hit maps onto one [`RelayError`] variant.
//! All of them are terminal for the session that raised them and never
//! for the listener.

use crate::socks::ReplyCode;
use std::io;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Errors raised while serving a relay session or loading configuration
#[derive(Error, Debug)]
pub enum RelayError {
    /// Malformed, truncated or unsupported wire data
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Submitted credentials did not match the configured pair
    #[error("Authentication failed for user: {username}")]
    AuthFailed {
        /// Username the client submitted
        username: String,
    },

    /// Literal destination outside every allowed range
    #[error("Destination not allowed: {0}")]
    DestinationDenied(IpAddr),

    /// Domain lookup failed or produced no allowed candidate
    #[error("Failed to resolve {host}: {reason}")]
    ResolutionFailed {
        /// Domain name from the request
        host: String,
        /// Why resolution did not produce a usable address
        reason: String,
    },

    /// Upstream proxy unreachable or refused the CONNECT
    #[error("Upstream {upstream} failed to connect to {target}: {reason}")]
    UpstreamConnectFailed {
        /// Upstream proxy address
        upstream: String,
        /// Destination requested through the upstream
        target: SocketAddr,
        /// Network or SOCKS level failure description
        reason: String,
    },

    /// Read or write failure on either relay direction
    #[error("Relay IO error: {0}")]
    RelayIo(#[source] io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error outside the relay phase
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RelayError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        RelayError::Protocol(msg.into())
    }

    /// Map a read failure from the client into a protocol error
    ///
    /// Streams that close early surface as `short read`.
    pub fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            RelayError::protocol("short read")
        } else {
            RelayError::Protocol(format!("read failed: {}", err))
        }
    }

    /// Reply code sent to a client that already finished authentication
    ///
    /// Every failure is reported as `0x05`. The match has no wildcard so a
    /// new variant has to pick its code here.
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            RelayError::DestinationDenied(_)
            | RelayError::ResolutionFailed { .. }
            | RelayError::UpstreamConnectFailed { .. }
            | RelayError::Protocol(_)
            | RelayError::AuthFailed { .. }
            | RelayError::RelayIo(_)
            | RelayError::Config(_)
            | RelayError::Io(_) => ReplyCode::ConnectionRefused,
        }
    }
}

/// Result alias used across the library
pub type Result<T, E = RelayError> = std::result::Result<T, E>;
