mod config;
mod connection;
mod error;
mod proxy;
mod request;
mod tunnel;

use crate::config::{Cli, ProxyConfig};
use crate::connection::{ConnectionGuard, ConnectionIds};
use crate::proxy::Connection;

use clap::Parser;
use color_eyre::eyre::Result;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("htun=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    color_eyre::install()?;

    let args = Cli::parse();
    let config = Arc::new(ProxyConfig::from_cli(args));

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("Starting HTTP CONNECT proxy on {}", config.listen_addr);

    // Main server loop: accept, assign an id, hand off to a supervisor task.
    // Nothing here blocks the acceptance of further connections.
    let ids = ConnectionIds::new();
    let server = async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let id = ids.next_id();
                    debug!(conn = %id, peer = %peer_addr, "accepted connection");
                    let config = Arc::clone(&config);
                    tokio::spawn(Connection::new(id).run(stream, config));
                }
                Err(e) => {
                    warn!("accept error: {} (continuing)", e);
                    continue;
                }
            }
        }
    };

    // Graceful shutdown signal handling
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");

        info!("shutdown signal received");

        let active = ConnectionGuard::active_count();
        if active > 0 {
            info!("waiting for {} connections to close...", active);
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                if ConnectionGuard::active_count() == 0 {
                    info!("all connections closed");
                    break;
                }
            }
            let remaining = ConnectionGuard::active_count();
            if remaining > 0 {
                warn!("exiting with {} connections still active", remaining);
            }
        }
    };

    // Run the server until the shutdown signal is received; returning exits
    // the process, which releases every in-flight connection's sockets.
    tokio::select! {
        _ = server => {
            warn!("server loop terminated");
        }
        _ = shutdown => {
            info!("server shutdown complete");
        }
    }

    Ok(())
}
