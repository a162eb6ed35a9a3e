//! Bidirectional byte relay between the client and the upstream
//!
//! Two copy loops run concurrently, one per direction. The first one to
//! hit end-of-stream or an error ends the relay; both connections are then
//! dropped together, so the other loop never outlives its peer.

use crate::error::{RelayError, Result};
use crate::socks::consts::RELAY_BUFFER_SIZE;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Bytes moved in each direction before the relay ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes read from the client and written upstream
    pub client_to_upstream: u64,
    /// Bytes read from the upstream and written to the client
    pub upstream_to_client: u64,
}

/// Relay data between `client` and `upstream` until either side closes
///
/// Both streams are consumed and dropped when this returns, closing both
/// legs regardless of which direction finished first.
pub async fn relay<A, B>(client: A, upstream: B) -> Result<RelayStats>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let mut stats = RelayStats::default();

    let result = {
        let outbound = pipe(
            &mut client_read,
            &mut upstream_write,
            &mut stats.client_to_upstream,
        );
        let inbound = pipe(
            &mut upstream_read,
            &mut client_write,
            &mut stats.upstream_to_client,
        );

        tokio::select! {
            result = outbound => {
                debug!("client->upstream finished: {:?}", result);
                result
            }
            result = inbound => {
                debug!("upstream->client finished: {:?}", result);
                result
            }
        }
    };

    debug!(
        "Relay closed: {} bytes to upstream, {} bytes to client",
        stats.client_to_upstream, stats.upstream_to_client
    );

    result.map(|_| stats).map_err(RelayError::RelayIo)
}

/// Copy from `reader` to `writer` through a bounded buffer until EOF
async fn pipe<R, W>(reader: &mut R, writer: &mut W, transferred: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        *transferred += n as u64;
    }
}
