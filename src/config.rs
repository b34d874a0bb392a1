use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;

/// Command line interface configuration
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Minimal HTTP CONNECT proxy",
    long_about = "htun accepts HTTP CONNECT requests and relays raw bytes \
between the client and the requested destination until either side closes.\n\n\
Only CONNECT is supported; there is no plain HTTP proxying, no \
authentication, and no TLS termination."
)]
pub struct Cli {
    /// Port to listen on (the PORT environment variable is honored too)
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// IP address to bind the listener
    #[arg(long, default_value = "0.0.0.0")]
    pub listen_ip: Ipv4Addr,

    /// Maximum accepted size of a request head in bytes
    #[arg(long, default_value_t = 8192)]
    pub max_head_len: usize,
}

/// Proxy configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub max_head_len: usize,
}

impl ProxyConfig {
    /// Create ProxyConfig from CLI arguments
    pub fn from_cli(args: Cli) -> Self {
        Self {
            listen_addr: SocketAddr::from((args.listen_ip, args.port)),
            max_head_len: args.max_head_len,
        }
    }
}
