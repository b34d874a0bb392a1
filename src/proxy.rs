use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::connection::{ConnectionGuard, ConnectionId};
use crate::error::ProxyError;
use crate::request::{parse_connect, read_request_head};
use crate::tunnel::{dial, relay, ESTABLISHED};

/// Lifecycle of one proxied connection. Transitions are one-directional;
/// no state is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    ReadingRequest,
    Dialing,
    Tunneling,
    Closed,
}

/// Per-connection supervisor.
///
/// Owns the client socket for the lifetime of its handling routine and the
/// upstream socket once the dial succeeds; both are closed exactly once on
/// every exit path, before [`Connection::run`] returns.
pub struct Connection {
    id: ConnectionId,
    state: ConnState,
}

impl Connection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: ConnState::ReadingRequest,
        }
    }

    fn advance(&mut self, next: ConnState) {
        debug!(conn = %self.id, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    /// Drives the connection from request read through teardown.
    ///
    /// Never returns an error: every failure is logged here and, when the
    /// client socket is still usable, answered with a 4xx/5xx status line.
    pub async fn run(mut self, mut client: TcpStream, config: Arc<ProxyConfig>) {
        let _guard = ConnectionGuard::new();
        if let Err(err) = self.serve(&mut client, &config).await {
            if let Some(status) = err.response() {
                // best effort; the client may already be gone
                client.write_all(status).await.ok();
            }
            warn!(conn = %self.id, error = %err, "connection failed");
        }
        client.shutdown().await.ok();
        self.advance(ConnState::Closed);
        info!(conn = %self.id, "connection closed");
    }

    async fn serve(
        &mut self,
        client: &mut TcpStream,
        config: &ProxyConfig,
    ) -> Result<(), ProxyError> {
        let head = read_request_head(client, config.max_head_len).await?;
        let target = parse_connect(&head)?;
        self.advance(ConnState::Dialing);
        info!(conn = %self.id, dest = %target, "got CONNECT request, connecting");

        let mut upstream = dial(&target).await?;
        debug!(conn = %self.id, dest = %target, "connected, sending 200 response");
        if let Err(err) = client.write_all(ESTABLISHED).await {
            // client disappeared between dial and handshake; never relay
            upstream.shutdown().await.ok();
            return Err(ProxyError::HandshakeWrite(err));
        }
        self.advance(ConnState::Tunneling);
        info!(conn = %self.id, dest = %target, "tunnel established");

        let (totals, result) = relay(client, &mut upstream).await;
        upstream.shutdown().await.ok();
        info!(
            conn = %self.id,
            dest = %target,
            to_upstream = totals.client_to_upstream,
            to_client = totals.upstream_to_client,
            "forwarded bytes"
        );
        result
    }
}
