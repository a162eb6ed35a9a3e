//! SOCKS5 module for S2S
//!
//! Client-facing SOCKS5: the wire codec for greeting, username/password
//! sub-negotiation, CONNECT requests and replies, the per-connection session
//! state machine, and the byte relay that runs once a session is connected.

mod auth;
mod command;
pub mod consts;
mod handler;
mod relay;
mod types;

pub use auth::{
    read_greeting, read_user_pass_auth, select_auth_method, verify_credentials,
    write_auth_result, write_method_selection, AuthMethod, Greeting, UserPass,
};
pub use command::{build_reply, read_connect_request, write_reply, ConnectRequest};
pub use handler::{handle_session, Session, SessionState};
pub use relay::{relay, RelayStats};
pub use types::{ReplyCode, SocksCommand, TargetAddr};
