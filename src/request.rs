use std::fmt;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProxyError;

/// Destination parsed from an authority-form CONNECT target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    /// Hostname or IP literal, taken verbatim (DNS is the dialer's problem).
    pub host: String,
    /// Port number in host byte order.
    pub port: u16,
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Reads from `stream` until a complete request head (terminated by an empty
/// line) has arrived and returns exactly those bytes.
///
/// Reads one byte at a time so that nothing past the terminating blank line
/// is ever consumed; bytes the client sends ahead of the handshake stay in
/// the socket for the relay. The head is capped at `max_len` bytes.
pub async fn read_request_head<R>(stream: &mut R, max_len: usize) -> Result<BytesMut, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut head = BytesMut::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= max_len {
            return Err(ProxyError::MalformedRequest {
                reason: format!("request head exceeds {max_len} bytes"),
            });
        }
        match stream.read(&mut byte).await {
            Ok(0) => return Err(ProxyError::IncompleteRequest),
            Ok(_) => head.extend_from_slice(&byte),
            Err(e) => return Err(ProxyError::Read(e)),
        }
    }
    Ok(head)
}

/// Validates a request head and extracts the CONNECT destination.
///
/// Succeeds only for a syntactically valid head whose method is exactly
/// `CONNECT` and whose target parses as `host:port`. Header content is not
/// interpreted.
pub fn parse_connect(head: &[u8]) -> Result<ConnectTarget, ProxyError> {
    let mut headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut headers);
    let status = req.parse(head).map_err(|e| malformed(format!("invalid request head: {e}")))?;
    if status.is_partial() {
        return Err(malformed("truncated request head".to_string()));
    }
    let method = req.method.ok_or_else(|| malformed("missing method".to_string()))?;
    if method != "CONNECT" {
        return Err(malformed(format!("method {method} is not CONNECT")));
    }
    let target = req
        .path
        .ok_or_else(|| malformed("missing request target".to_string()))?;
    parse_authority(target)
}

fn parse_authority(target: &str) -> Result<ConnectTarget, ProxyError> {
    let Some((host, port)) = target.rsplit_once(':') else {
        return Err(malformed(format!("target {target} has no port")));
    };
    let host = if let Some(inner) = host.strip_prefix('[') {
        inner
            .strip_suffix(']')
            .ok_or_else(|| malformed(format!("unbalanced brackets in target {target}")))?
    } else if host.contains(':') {
        return Err(malformed(format!(
            "IPv6 target {target} must use bracketed form"
        )));
    } else {
        host
    };
    if host.is_empty() {
        return Err(malformed(format!("target {target} has an empty host")));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| malformed(format!("target {target} has an invalid port")))?;
    Ok(ConnectTarget {
        host: host.to_string(),
        port,
    })
}

fn malformed(reason: String) -> ProxyError {
    ProxyError::MalformedRequest { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    fn parse(head: &str) -> Result<ConnectTarget, ProxyError> {
        parse_connect(head.as_bytes())
    }

    #[test]
    fn parses_connect_with_headers() {
        let target =
            parse("CONNECT canhazip.com:443 HTTP/1.1\r\nHost: canhazip.com:443\r\n\r\n").unwrap();
        assert_eq!(target.host, "canhazip.com");
        assert_eq!(target.port, 443);
        assert_eq!(target.to_string(), "canhazip.com:443");
    }

    #[test]
    fn parses_connect_without_headers() {
        let target = parse("CONNECT example.com:80 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 80);
    }

    #[test]
    fn parses_bracketed_ipv6_target() {
        let target = parse("CONNECT [::1]:8443 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(target.host, "::1");
        assert_eq!(target.port, 8443);
        assert_eq!(target.to_string(), "[::1]:8443");
    }

    #[test]
    fn rejects_non_connect_method() {
        let err = parse("GET http://example.com/ HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
        assert!(err.to_string().contains("GET"));
    }

    #[test]
    fn rejects_target_without_port() {
        let err = parse("CONNECT example.com HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }

    #[test]
    fn rejects_non_numeric_port() {
        let err = parse("CONNECT example.com:https HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }

    #[test]
    fn rejects_out_of_range_port() {
        let err = parse("CONNECT example.com:70000 HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }

    #[test]
    fn rejects_empty_host() {
        let err = parse("CONNECT :443 HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }

    #[tokio::test]
    async fn reader_stops_exactly_at_the_terminator() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(b"CONNECT a:1 HTTP/1.1\r\n\r\ntunnel-payload")
            .await
            .unwrap();
        let head = read_request_head(&mut server, 8192).await.unwrap();
        assert_eq!(&head[..], b"CONNECT a:1 HTTP/1.1\r\n\r\n");

        // bytes after the blank line belong to the tunnel and must still be readable
        let mut rest = [0u8; 14];
        server.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"tunnel-payload");
    }

    #[tokio::test]
    async fn eof_before_terminator_is_incomplete() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"CONNECT a:1 HTTP/1.1\r\n").await.unwrap();
        drop(client);
        let err = read_request_head(&mut server, 8192).await.unwrap_err();
        assert!(matches!(err, ProxyError::IncompleteRequest));
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&[b'x'; 256]).await.unwrap();
        let err = read_request_head(&mut server, 128).await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest { .. }));
    }
}
