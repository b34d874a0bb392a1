use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ProxyError;
use crate::request::ConnectTarget;

/// Fixed success response sent to the client once the upstream dial succeeds.
pub const ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

/// Chunk size for each relay direction.
const RELAY_BUF_LEN: usize = 16 * 1024;

/// Opens a TCP connection to the CONNECT destination.
///
/// Single attempt, fail-fast; resolution and connection failures both
/// surface as [`ProxyError::Dial`].
pub async fn dial(target: &ConnectTarget) -> Result<TcpStream, ProxyError> {
    TcpStream::connect((target.host.as_str(), target.port))
        .await
        .map_err(|source| ProxyError::Dial {
            host: target.host.clone(),
            port: target.port,
            source,
        })
}

/// Bytes moved through an established tunnel, per direction.
#[derive(Debug, Default, Clone, Copy)]
pub struct RelayTotals {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
}

/// Copies bytes in both directions until both streams reach end-of-stream
/// or either leg fails.
///
/// The two pumps run in this task via `try_join!`: the first error cancels
/// the surviving pump, and neither outlives the call. Totals are reported
/// even on the error path so teardown can log them.
pub async fn relay(
    client: &mut TcpStream,
    upstream: &mut TcpStream,
) -> (RelayTotals, Result<(), ProxyError>) {
    let (mut client_rd, mut client_wr) = client.split();
    let (mut upstream_rd, mut upstream_wr) = upstream.split();
    let mut totals = RelayTotals::default();
    let result = tokio::try_join!(
        pump(
            &mut client_rd,
            &mut upstream_wr,
            &mut totals.client_to_upstream
        ),
        pump(
            &mut upstream_rd,
            &mut client_wr,
            &mut totals.upstream_to_client
        ),
    );
    (totals, result.map(|_| ()).map_err(ProxyError::Relay))
}

/// One-directional pump: read a chunk, write it through, repeat until EOF.
///
/// On EOF the peer's write side is shut down so the remote sees end-of-stream
/// promptly instead of waiting for the other direction to drain.
async fn pump<R, W>(from: &mut R, to: &mut W, total: &mut u64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUF_LEN];
    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            to.shutdown().await.ok();
            return Ok(());
        }
        to.write_all(&buf[..n]).await?;
        *total += n as u64;
    }
}
