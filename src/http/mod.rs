//! HTTP proxy module for Sshgate
//!
//! Accepts HTTP proxy clients and forwards them through the local SOCKS5
//! listener. `CONNECT` becomes a raw tunnel; any other method is dialed,
//! the request head is replayed in origin-form, and the connection turns
//! into a byte pipe. Responses are never parsed.

mod dialer;
mod request;

pub use dialer::Socks5Dialer;
pub use request::{read_request_head, split_host_port, HeadRead, RequestHead};

use crate::config::{HttpConfig, RelayConfig};
use crate::error::GatewayError;
use crate::relay::relay;
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use bytes::BytesMut;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Reply sent once a CONNECT tunnel is up
const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

/// Address to dial for a listener bound to `bound`
///
/// A wildcard bind address is not dialable, so loopback is used instead.
pub fn socks_dial_addr(bound: SocketAddr) -> SocketAddr {
    match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), bound.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), bound.port())
        }
        _ => bound,
    }
}

/// HTTP proxy server bound to a local address
#[derive(Debug)]
pub struct HttpProxy {
    listener: TcpListener,
    dialer: Socks5Dialer,
    config: Arc<HttpConfig>,
    relay_config: Arc<RelayConfig>,
}

impl HttpProxy {
    /// Bind the listener; targets are dialed through the SOCKS5 server
    /// listening on `socks_addr`
    pub async fn bind(
        config: HttpConfig,
        relay_config: RelayConfig,
        socks_addr: SocketAddr,
    ) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP proxy listener on {}", addr))?;

        let dialer = Socks5Dialer::new(socks_dial_addr(socks_addr), config.connect_timeout());

        Ok(HttpProxy {
            listener,
            dialer,
            config: Arc::new(config),
            relay_config: Arc::new(relay_config),
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .with_context(|| "Failed to get HTTP proxy listener address")
    }

    /// Accept connections until a shutdown signal arrives
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!(
            "HTTP proxy listening on {} (via SOCKS5 {})",
            self.local_addr()?,
            self.dialer.proxy_addr()
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            SocketOpts::for_local_client().hint(&stream);
                            debug!("Accepted HTTP connection from {}", peer);

                            let dialer = self.dialer.clone();
                            let config = self.config.clone();
                            let relay_config = self.relay_config.clone();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_http_connection(stream, &dialer, &config, &relay_config).await
                                {
                                    warn!("HTTP connection from {} failed: {:#}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            warn!("HTTP accept error: {} (continuing)", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping HTTP proxy listener");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Handle one HTTP proxy client
pub async fn handle_http_connection<S>(
    mut client: S,
    dialer: &Socks5Dialer,
    config: &HttpConfig,
    relay_config: &RelayConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(4096);

    let head = match read_request_head(&mut client, &mut buf, config.max_header_size).await {
        Ok(HeadRead::Complete(head)) => head,
        Ok(HeadRead::Closed) => return Ok(()),
        Err(GatewayError::Io(e)) => return Err(e.into()),
        Err(e) => {
            write_response(&mut client, 400, "Bad Request", &e.to_string()).await?;
            return Err(e.into());
        }
    };

    debug!("HTTP {} {}", head.method, head.target);

    if head.is_connect() {
        handle_connect(client, head, buf, dialer, relay_config).await
    } else {
        handle_forward(client, head, buf, dialer, relay_config).await
    }
}

/// Tunnel a CONNECT request
async fn handle_connect<S>(
    mut client: S,
    head: RequestHead,
    leftover: BytesMut,
    dialer: &Socks5Dialer,
    relay_config: &RelayConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (host, port) = match head.connect_target() {
        Ok(target) => target,
        Err(e) => {
            write_response(&mut client, 400, "Bad Request", &e.to_string()).await?;
            return Err(e.into());
        }
    };

    let mut upstream = match dialer.dial(&host, port).await {
        Ok(upstream) => upstream,
        Err(e) => {
            write_response(&mut client, 503, "Service Unavailable", &format!("{:#}", e)).await?;
            return Err(e);
        }
    };

    client.write_all(CONNECT_ESTABLISHED).await?;
    client.flush().await?;

    if !leftover.is_empty() {
        upstream.write_all(&leftover).await?;
    }

    info!("HTTP CONNECT tunnel established to {}:{}", host, port);
    let stats = relay(client, upstream, relay_config.idle_timeout()).await;
    debug!(
        "CONNECT tunnel to {}:{} closed ({} bytes up, {} bytes down)",
        host, port, stats.sent, stats.received
    );

    Ok(())
}

/// Forward a plain request and pipe the rest of the connection
async fn handle_forward<S>(
    mut client: S,
    head: RequestHead,
    leftover: BytesMut,
    dialer: &Socks5Dialer,
    relay_config: &RelayConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (host, port, path) = match head.forward_target() {
        Ok(target) => target,
        Err(e) => {
            write_response(&mut client, 400, "Bad Request", &e.to_string()).await?;
            return Err(e.into());
        }
    };

    let mut upstream = match dialer.dial(&host, port).await {
        Ok(upstream) => upstream,
        Err(e) => {
            write_response(&mut client, 503, "Service Unavailable", &format!("{:#}", e)).await?;
            return Err(e);
        }
    };

    let mut request = head.to_origin_form(&path, &host, port);
    request.extend_from_slice(&leftover);

    if let Err(e) = upstream.write_all(&request).await {
        write_response(&mut client, 500, "Internal Server Error", &e.to_string()).await?;
        return Err(e).with_context(|| format!("Failed to send request to {}:{}", host, port));
    }

    info!("HTTP {} forwarded to {}:{}{}", head.method, host, port, path);
    let stats = relay(client, upstream, relay_config.idle_timeout()).await;
    debug!(
        "HTTP connection to {}:{} closed ({} bytes up, {} bytes down)",
        host, port, stats.sent, stats.received
    );

    Ok(())
}

/// Write a short plain-text response and close the exchange
async fn write_response<S>(client: &mut S, status: u16, reason: &str, body: &str) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let body = format!("{}\n", body);
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    client.write_all(response.as_bytes()).await?;
    client.shutdown().await?;
    Ok(())
}
