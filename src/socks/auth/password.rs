//! Username/password authentication handler
//!
//! Implements RFC 1929 username/password authentication for SOCKS5.

use crate::config::Credentials;
use crate::error::{RelayError, Result};
use crate::socks::consts::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Credentials submitted by a client
#[derive(Clone, PartialEq, Eq)]
pub struct UserPass {
    /// Submitted username
    pub username: String,
    /// Submitted password
    pub password: String,
}

impl std::fmt::Debug for UserPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPass")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read the username/password sub-negotiation request
///
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Invalid UTF-8 in either field is replaced rather than rejected.
pub async fn read_user_pass_auth<S>(stream: &mut S) -> Result<UserPass>
where
    S: AsyncRead + Unpin,
{
    // Read version and username length
    let mut buf = [0u8; 2];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(RelayError::from_read)?;

    let version = buf[0];
    let username_len = buf[1] as usize;

    if version != SOCKS5_AUTH_VERSION {
        return Err(RelayError::Protocol(format!(
            "Invalid auth version: {}",
            version
        )));
    }

    let username = read_field(stream, username_len).await?;

    let mut buf = [0u8; 1];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(RelayError::from_read)?;
    let password = read_field(stream, buf[0] as usize).await?;

    Ok(UserPass { username, password })
}

async fn read_field<S>(stream: &mut S, len: usize) -> Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut field = vec![0u8; len];
    stream
        .read_exact(&mut field)
        .await
        .map_err(RelayError::from_read)?;
    Ok(String::from_utf8_lossy(&field).into_owned())
}

/// Write the sub-negotiation status: `[1, 0]` on success, `[1, 1]` otherwise
///
/// ```text
/// +----+--------+
/// |VER | STATUS |
/// +----+--------+
/// | 1  |   1    |
/// +----+--------+
/// ```
pub async fn write_auth_result<S>(stream: &mut S, success: bool) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let status = if success {
        SOCKS5_AUTH_SUCCESS
    } else {
        SOCKS5_AUTH_FAILURE
    };
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}

/// Exact match of submitted credentials against the configured pair
pub fn verify_credentials(submitted: &UserPass, expected: &Credentials) -> bool {
    submitted.username == expected.username && submitted.password == expected.password
}
