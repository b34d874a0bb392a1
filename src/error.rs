use std::io;
use thiserror::Error;

/// Raw status bytes for a request the proxy could not parse.
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

/// Raw status bytes for a destination the proxy could not reach.
pub const BAD_GATEWAY: &[u8] = b"HTTP/1.1 502 Bad Gateway\r\n\r\n";

/// Everything that can go wrong while handling one client connection.
///
/// Each variant is terminal for its connection; nothing is retried.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to read request head: {0}")]
    Read(io::Error),

    #[error("client closed before sending a complete request head")]
    IncompleteRequest,

    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },

    #[error("failed to connect to {host}:{port}: {source}")]
    Dial {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("failed to send 200 response to client: {0}")]
    HandshakeWrite(io::Error),

    #[error("relay failed: {0}")]
    Relay(io::Error),
}

impl ProxyError {
    /// Status line owed to the client before closing, if the failure
    /// happened while the client socket was still usable for one.
    pub fn response(&self) -> Option<&'static [u8]> {
        match self {
            ProxyError::MalformedRequest { .. } => Some(BAD_REQUEST),
            ProxyError::Dial { .. } => Some(BAD_GATEWAY),
            ProxyError::Read(_)
            | ProxyError::IncompleteRequest
            | ProxyError::HandshakeWrite(_)
            | ProxyError::Relay(_) => None,
        }
    }
}
