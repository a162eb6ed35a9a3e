//! SOCKS5 command parsing module
//!
//! Handles parsing SOCKS5 requests and building replies.

mod parser;
mod reply;

pub use parser::{read_connect_request, ConnectRequest};
pub use reply::{build_reply, write_reply};
