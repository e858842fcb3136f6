//! Transport module for Sshgate
//!
//! Socket tuning, the boxed stream type handed out by tunnels, and the plain
//! TCP dial used to reach the SSH server.

mod addr;

pub use addr::Endpoint;

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(20),
            keepalive_interval: Some(8),
        }
    }
}

impl SocketOpts {
    /// Socket options for the long-lived SSH connection
    pub fn for_ssh_session() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(30),
            keepalive_interval: Some(10),
        }
    }

    /// Socket options for accepted local proxy clients
    pub fn for_local_client() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: None,
            keepalive_interval: None,
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }

    /// Apply options, logging instead of failing
    pub fn hint(&self, stream: &TcpStream) {
        if let Err(e) = self.apply(stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }
    }
}

/// A duplex byte stream handed out by a tunnel.
///
/// Tunnels return `Box<dyn TunnelStream>` so the proxy paths do not need to
/// be generic over the tunnel implementation.
pub trait TunnelStream: AsyncRead + AsyncWrite + Unpin + Send {}

/// Blanket implementation: any type implementing the required traits is a TunnelStream.
impl<T: AsyncRead + AsyncWrite + Unpin + Send> TunnelStream for T {}

/// Open a TCP connection to an endpoint with a timeout and socket options
///
/// A failed attempt drops the endpoint's cached address.
pub async fn connect_tcp(
    endpoint: &Endpoint,
    timeout: Duration,
    opts: &SocketOpts,
) -> Result<TcpStream> {
    let resolved = endpoint.resolve().await?;

    let result = tokio::time::timeout(timeout, TcpStream::connect(resolved))
        .await
        .with_context(|| format!("Connection timeout to {}", endpoint))
        .and_then(|r| r.with_context(|| format!("Failed to connect to {}", endpoint)));

    let stream = match result {
        Ok(stream) => stream,
        Err(e) => {
            endpoint.invalidate().await;
            return Err(e);
        }
    };

    opts.hint(&stream);
    tracing::debug!("TCP connection established to {}", resolved);

    Ok(stream)
}
