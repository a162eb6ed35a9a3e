//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use crate::error::Result;
use crate::socks::consts::*;
use crate::socks::types::ReplyCode;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build the reply bytes for a reply code
///
/// The bound address is always reported as `0.0.0.0:0`; the upstream's
/// binding is not exposed to the client.
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   |    4     |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn build_reply(reply_code: ReplyCode) -> [u8; SOCKS5_REPLY_LEN] {
    [
        SOCKS5_VERSION,
        reply_code.into(),
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Send a SOCKS5 reply
pub async fn write_reply<S>(stream: &mut S, reply_code: ReplyCode) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&build_reply(reply_code)).await?;
    stream.flush().await?;

    Ok(())
}
