//! SOCKS5 command parser
//!
//! Parses SOCKS5 CONNECT requests from the client.

use crate::error::{RelayError, Result};
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, TargetAddr};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A parsed CONNECT request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Requested command, always CONNECT once parsed
    pub command: SocksCommand,
    /// Raw ATYP byte from the request
    pub addr_type: u8,
    /// Requested destination
    pub target: TargetAddr,
}

/// Read a CONNECT request from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Anything other than a version 5 CONNECT is a protocol error.
pub async fn read_connect_request<S>(stream: &mut S) -> Result<ConnectRequest>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; 4];
    read_exact(stream, &mut header).await?;

    let version = header[0];
    let cmd_byte = header[1];
    let _reserved = header[2];
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        return Err(RelayError::Protocol(format!(
            "Unsupported SOCKS version in request: {}",
            version
        )));
    }

    let command = match SocksCommand::from_byte(cmd_byte) {
        Some(SocksCommand::Connect) => SocksCommand::Connect,
        Some(other) => {
            return Err(RelayError::Protocol(format!(
                "Command not supported: {}",
                other
            )))
        }
        None => {
            return Err(RelayError::Protocol(format!(
                "Unknown command: {}",
                cmd_byte
            )))
        }
    };

    let target = read_target(stream, addr_type).await?;

    tracing::debug!("Parsed SOCKS5 command: {} to {}", command, target);

    Ok(ConnectRequest {
        command,
        addr_type,
        target,
    })
}

/// Parse the address and port portion of a request
async fn read_target<S>(stream: &mut S, addr_type: u8) -> Result<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            read_exact(stream, &mut addr).await?;
            let port = read_port(stream).await?;

            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            read_exact(stream, &mut len_buf).await?;
            let domain_len = len_buf[0] as usize;

            if domain_len == 0 {
                return Err(RelayError::protocol("Empty domain name"));
            }

            let mut domain_buf = vec![0u8; domain_len];
            read_exact(stream, &mut domain_buf).await?;
            let domain = String::from_utf8(domain_buf)
                .map_err(|_| RelayError::protocol("Invalid UTF-8 in domain name"))?;

            let port = read_port(stream).await?;

            Ok(TargetAddr::domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            read_exact(stream, &mut addr).await?;
            let port = read_port(stream).await?;

            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }

        _ => Err(RelayError::Protocol(format!(
            "Unsupported address type: {}",
            addr_type
        ))),
    }
}

async fn read_port<S>(stream: &mut S) -> Result<u16>
where
    S: AsyncRead + Unpin,
{
    let mut port_buf = [0u8; 2];
    read_exact(stream, &mut port_buf).await?;
    Ok(u16::from_be_bytes(port_buf))
}

async fn read_exact<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    stream
        .read_exact(buf)
        .await
        .map_err(RelayError::from_read)?;
    Ok(())
}
