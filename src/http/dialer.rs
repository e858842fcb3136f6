//! SOCKS5 client dialer
//!
//! The HTTP proxy reaches targets as an ordinary SOCKS5 client of the local
//! SOCKS5 listener, so it never talks to the session manager directly.

use anyhow::{anyhow, Context, Result};
use async_socks5::AddrKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Dials targets through a SOCKS5 server
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    proxy_addr: SocketAddr,
    timeout: Duration,
}

impl Socks5Dialer {
    /// Create a dialer for the SOCKS5 server at `proxy_addr`
    pub fn new(proxy_addr: SocketAddr, timeout: Duration) -> Self {
        Socks5Dialer {
            proxy_addr,
            timeout,
        }
    }

    /// Address of the SOCKS5 server
    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy_addr
    }

    /// Connect to `host:port` through the SOCKS5 server
    ///
    /// IP literals are sent as addresses, anything else as a domain name
    /// for the remote end to resolve.
    pub async fn dial(&self, host: &str, port: u16) -> Result<TcpStream> {
        let target = match host.parse::<IpAddr>() {
            Ok(ip) => AddrKind::Ip(SocketAddr::new(ip, port)),
            Err(_) => AddrKind::Domain(host.to_string(), port),
        };

        let handshake = async {
            let mut stream = TcpStream::connect(self.proxy_addr)
                .await
                .with_context(|| format!("Failed to connect to SOCKS5 proxy {}", self.proxy_addr))?;
            stream.set_nodelay(true)?;

            async_socks5::connect(&mut stream, target, None)
                .await
                .with_context(|| format!("SOCKS5 connect to {}:{} failed", host, port))?;

            Ok::<_, anyhow::Error>(stream)
        };

        let stream = tokio::time::timeout(self.timeout, handshake)
            .await
            .map_err(|_| anyhow!("Dial to {}:{} timed out after {:?}", host, port, self.timeout))??;

        debug!("Dialed {}:{} via SOCKS5 {}", host, port, self.proxy_addr);
        Ok(stream)
    }
}
