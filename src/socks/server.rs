//! SOCKS5 listener
//!
//! Accepts local clients and spawns one task per connection. Each task
//! waits for the SSH session according to the retry policy before it starts
//! speaking SOCKS5.

use super::handler::handle_socks5_on_stream;
use crate::config::{RelayConfig, SocksConfig};
use crate::session::SessionManager;
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// SOCKS5 server bound to a local address
#[derive(Debug)]
pub struct SocksServer {
    listener: TcpListener,
    sessions: Arc<SessionManager>,
    config: Arc<SocksConfig>,
    relay_config: Arc<RelayConfig>,
}

impl SocksServer {
    /// Bind the listener
    pub async fn bind(
        config: SocksConfig,
        relay_config: RelayConfig,
        sessions: Arc<SessionManager>,
    ) -> Result<Self> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind SOCKS5 listener on {}", addr))?;

        Ok(SocksServer {
            listener,
            sessions,
            config: Arc::new(config),
            relay_config: Arc::new(relay_config),
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .with_context(|| "Failed to get SOCKS5 listener address")
    }

    /// Accept connections until a shutdown signal arrives
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        info!("SOCKS5 proxy listening on {}", self.local_addr()?);

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            SocketOpts::for_local_client().hint(&stream);
                            debug!("Accepted SOCKS5 connection from {}", peer);

                            let sessions = self.sessions.clone();
                            let config = self.config.clone();
                            let relay_config = self.relay_config.clone();
                            tokio::spawn(async move {
                                serve_connection(stream, peer, &sessions, &config, &relay_config)
                                    .await;
                            });
                        }
                        Err(e) => {
                            warn!("SOCKS5 accept error: {} (continuing)", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping SOCKS5 listener");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Serve one SOCKS5 client, waiting for the session per the retry policy
///
/// An attempt is consumed whenever the session is absent, without touching
/// the stream. Once the protocol has started the attempt is final: a
/// partially read request cannot be replayed. When every attempt finds the
/// session absent the connection is closed without a reply.
pub async fn serve_connection<S>(
    stream: S,
    peer: SocketAddr,
    sessions: &SessionManager,
    config: &SocksConfig,
    relay_config: &RelayConfig,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let policy = config.retry;

    for attempt in 0..policy.max_attempts {
        if !sessions.is_available().await {
            let delay = policy.delay_for_attempt(attempt);
            warn!(
                "SSH session unavailable for {} (attempt {}/{}), retrying in {:?}",
                peer,
                attempt + 1,
                policy.max_attempts,
                delay
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        if let Err(e) = handle_socks5_on_stream(stream, sessions, config, relay_config).await {
            warn!("SOCKS5 connection from {} failed: {:#}", peer, e);
        }
        return;
    }

    error!(
        "Giving up on SOCKS5 connection from {} after {} attempts",
        peer, policy.max_attempts
    );
}
