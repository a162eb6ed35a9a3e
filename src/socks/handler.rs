//! Session handler
//!
//! Drives one client connection through the relay state machine:
//!
//! ```text
//! Greeting -> MethodSelected -> Authenticated -> RequestParsed
//!   -> DestinationValidated -> UpstreamConnected -> Relaying -> Closed
//! ```
//!
//! Any failure jumps straight to `Closed`. Once the client has
//! authenticated, exactly one reply is attempted before closing; earlier
//! failures close silently since no reply framing has been agreed yet.

use super::auth::{
    read_greeting, read_user_pass_auth, select_auth_method, verify_credentials,
    write_auth_result, write_method_selection, AuthMethod,
};
use super::command::{read_connect_request, write_reply};
use super::relay::{relay, RelayStats};
use super::types::{ReplyCode, TargetAddr};
use crate::error::{RelayError, Result};
use crate::server::RelayContext;
use std::fmt;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Protocol stage of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Waiting for the client greeting
    Greeting,
    /// Username/password method chosen
    MethodSelected,
    /// Credentials accepted
    Authenticated,
    /// CONNECT request read
    RequestParsed,
    /// Destination resolved and inside the allow-list
    DestinationValidated,
    /// Upstream CONNECT succeeded
    UpstreamConnected,
    /// Bytes flowing in both directions
    Relaying,
    /// Terminal state
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Per-connection session record
///
/// Owned by the task serving the connection and dropped with it.
#[derive(Debug, Clone)]
pub struct Session {
    peer: SocketAddr,
    state: SessionState,
    authenticated: bool,
    target: Option<TargetAddr>,
    destination: Option<SocketAddr>,
}

impl Session {
    /// New session for a freshly accepted client
    pub fn new(peer: SocketAddr) -> Self {
        Session {
            peer,
            state: SessionState::Greeting,
            authenticated: false,
            target: None,
            destination: None,
        }
    }

    /// Client address
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current stage
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the credential check passed
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Target as requested by the client
    pub fn target(&self) -> Option<&TargetAddr> {
        self.target.as_ref()
    }

    /// Validated destination the upstream was asked to reach
    pub fn destination(&self) -> Option<SocketAddr> {
        self.destination
    }

    /// Move forward; transitions never go backwards and `Closed` is final
    fn advance(&mut self, next: SessionState) {
        if self.state != SessionState::Closed && next > self.state {
            debug!("{} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

/// Serve one client connection until it closes
///
/// Returns the relay byte counts when the session reached the relay stage.
pub async fn handle_session<S>(
    mut client: S,
    peer: SocketAddr,
    ctx: &RelayContext,
) -> Result<RelayStats>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut session = Session::new(peer);

    let upstream = match establish(&mut client, &mut session, ctx).await {
        Ok(upstream) => upstream,
        Err(e) => {
            if session.is_authenticated() {
                let code = e.reply_code();
                if let Err(reply_err) = write_reply(&mut client, code).await {
                    debug!("Failed to send failure reply: {}", reply_err);
                }
            }
            session.close();
            return Err(e);
        }
    };

    if let Err(e) = write_reply(&mut client, ReplyCode::Succeeded).await {
        session.close();
        return Err(e);
    }
    session.advance(SessionState::Relaying);

    let result = relay(client, upstream).await;
    session.close();

    match (&result, session.destination()) {
        (Ok(stats), Some(destination)) => info!(
            "Closed {}: {} bytes sent, {} bytes received",
            destination, stats.client_to_upstream, stats.upstream_to_client
        ),
        (Err(e), _) => debug!("Relay ended with error: {}", e),
        _ => {}
    }

    result
}

/// Run every stage up to an established upstream connection
async fn establish<S>(
    client: &mut S,
    session: &mut Session,
    ctx: &RelayContext,
) -> Result<TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    // Greeting -> MethodSelected
    let greeting = read_greeting(client).await?;
    let method = select_auth_method(&greeting.methods);
    write_method_selection(client, method.to_byte()).await?;
    if method == AuthMethod::NotAcceptable {
        return Err(RelayError::protocol(format!(
            "no acceptable authentication method in {:?}",
            greeting.methods
        )));
    }
    session.advance(SessionState::MethodSelected);

    // MethodSelected -> Authenticated
    let user_pass = read_user_pass_auth(client).await?;
    if !verify_credentials(&user_pass, ctx.credentials()) {
        write_auth_result(client, false).await?;
        warn!("Authentication failed for user {:?}", user_pass.username);
        return Err(RelayError::AuthFailed {
            username: user_pass.username,
        });
    }
    write_auth_result(client, true).await?;
    session.authenticated = true;
    session.advance(SessionState::Authenticated);

    // Authenticated -> RequestParsed
    let request = read_connect_request(client).await?;
    debug!("CONNECT request to {}", request.target);
    session.target = Some(request.target.clone());
    session.advance(SessionState::RequestParsed);

    // RequestParsed -> DestinationValidated
    let destination = match ctx.resolver().resolve(&request.target).await {
        Ok(destination) => destination,
        Err(e) => {
            warn!("Rejected destination {}: {}", request.target, e);
            return Err(e);
        }
    };
    // Literal and resolved targets both pass through here
    if !ctx.resolver().allow_list().contains(destination.ip()) {
        warn!("Rejected destination {}: not in allow-list", destination);
        return Err(RelayError::DestinationDenied(destination.ip()));
    }
    session.destination = Some(destination);
    session.advance(SessionState::DestinationValidated);

    // DestinationValidated -> UpstreamConnected
    let upstream = ctx.connector().connect(destination).await?;
    session.advance(SessionState::UpstreamConnected);

    info!("Connected {} via upstream as {}", request.target, destination);

    Ok(upstream)
}
