//! SOCKS5 authentication module
//!
//! Handles the method negotiation greeting and the RFC 1929
//! username/password sub-negotiation.

mod password;

pub use password::{read_user_pass_auth, verify_credentials, write_auth_result, UserPass};

use super::consts::*;
use crate::error::{RelayError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Username/password authentication, the only method served
    Password,
    /// Nothing the client offered is acceptable
    NotAcceptable,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
            AuthMethod::NotAcceptable => SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE,
        }
    }
}

/// Client greeting: version plus offered method identifiers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Protocol version, always 5 once parsed
    pub version: u8,
    /// Offered authentication methods, in client order
    pub methods: Vec<u8>,
}

/// Read the client greeting
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub async fn read_greeting<S>(stream: &mut S) -> Result<Greeting>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 2];
    stream
        .read_exact(&mut buf)
        .await
        .map_err(RelayError::from_read)?;

    let version = buf[0];
    let num_methods = buf[1] as usize;

    if version != SOCKS5_VERSION {
        return Err(RelayError::Protocol(format!(
            "Unsupported SOCKS version: {}",
            version
        )));
    }

    let mut methods = vec![0u8; num_methods];
    stream
        .read_exact(&mut methods)
        .await
        .map_err(RelayError::from_read)?;

    Ok(Greeting { version, methods })
}

/// Write the method selection message `[5, method]`
pub async fn write_method_selection<S>(stream: &mut S, method: u8) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS5_VERSION, method]).await?;
    stream.flush().await?;
    Ok(())
}

/// Select the authentication method for the offered list
///
/// Username/password is mandatory, so anything else is not acceptable.
pub fn select_auth_method(methods: &[u8]) -> AuthMethod {
    if methods.contains(&SOCKS5_AUTH_METHOD_PASSWORD) {
        AuthMethod::Password
    } else {
        AuthMethod::NotAcceptable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_auth_method_to_byte() {
        assert_eq!(AuthMethod::Password.to_byte(), 0x02);
        assert_eq!(AuthMethod::NotAcceptable.to_byte(), 0xFF);
    }

    #[test]
    fn test_select_auth_method() {
        assert_eq!(
            select_auth_method(&[SOCKS5_AUTH_METHOD_NONE, SOCKS5_AUTH_METHOD_PASSWORD]),
            AuthMethod::Password
        );
        assert_eq!(
            select_auth_method(&[SOCKS5_AUTH_METHOD_NONE]),
            AuthMethod::NotAcceptable
        );
        assert_eq!(select_auth_method(&[]), AuthMethod::NotAcceptable);
    }

    #[tokio::test]
    async fn test_read_greeting() {
        let mut cursor = Cursor::new(vec![5, 2, 0x00, 0x02]);
        let greeting = read_greeting(&mut cursor).await.unwrap();
        assert_eq!(greeting.version, 5);
        assert_eq!(greeting.methods, vec![0x00, 0x02]);
    }

    #[tokio::test]
    async fn test_read_greeting_zero_methods() {
        let mut cursor = Cursor::new(vec![5, 0]);
        let greeting = read_greeting(&mut cursor).await.unwrap();
        assert!(greeting.methods.is_empty());
    }

    #[tokio::test]
    async fn test_read_greeting_wrong_version() {
        let mut cursor = Cursor::new(vec![4, 1, 0x00]);
        let err = read_greeting(&mut cursor).await.unwrap_err();
        assert!(err.to_string().contains("Unsupported SOCKS version: 4"));
    }

    #[tokio::test]
    async fn test_read_greeting_short_methods() {
        // Declares three methods but only sends one
        let mut cursor = Cursor::new(vec![5, 3, 0x02]);
        let err = read_greeting(&mut cursor).await.unwrap_err();
        assert!(matches!(err, RelayError::Protocol(ref m) if m == "short read"));
    }

    #[tokio::test]
    async fn test_read_greeting_empty_stream() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let err = read_greeting(&mut cursor).await.unwrap_err();
        assert!(matches!(err, RelayError::Protocol(ref m) if m == "short read"));
    }

    #[tokio::test]
    async fn test_write_method_selection() {
        let mut buffer = Vec::new();
        write_method_selection(&mut buffer, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE)
            .await
            .unwrap();
        assert_eq!(buffer, vec![5, 0xFF]);
    }
}
