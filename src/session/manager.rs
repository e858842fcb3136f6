//! Session manager for the single SSH tunnel
//!
//! Owns the authoritative tunnel handle behind one exclusive lock. Lookups,
//! the keep-alive check and redials all contend on the same lock, so a
//! reader sees either the old or the new tunnel, never a half-replaced one.

use super::{Tunnel, TunnelConnector};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::transport::TunnelStream;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Outcome of one keep-alive cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTransition {
    /// The probe succeeded; nothing changed
    Healthy,
    /// The probe failed and the tunnel was dropped
    Lost {
        /// Whether the immediate redial installed a new tunnel
        reconnected: bool,
    },
    /// No tunnel was installed and the redial succeeded
    Reconnected,
    /// No tunnel was installed and the redial failed again
    StillDown,
}

/// Session manager
pub struct SessionManager {
    /// Dials new tunnels
    connector: Arc<dyn TunnelConnector>,
    /// The authoritative tunnel, if any
    current: Mutex<Option<Arc<dyn Tunnel>>>,
    /// Configuration
    config: SessionConfig,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("endpoint", &self.connector.endpoint())
            .field("config", &self.config)
            .finish()
    }
}

impl SessionManager {
    /// Perform the initial dial and create the manager
    ///
    /// Failure here is a startup error; the caller is expected to exit.
    pub async fn connect(
        connector: Arc<dyn TunnelConnector>,
        config: SessionConfig,
    ) -> Result<Arc<Self>> {
        let endpoint = connector.endpoint();
        let tunnel = connector
            .connect()
            .await
            .with_context(|| format!("Failed to connect to SSH server {}", endpoint))?;

        info!("SSH session established to {}", endpoint);

        Ok(Arc::new(SessionManager {
            connector,
            current: Mutex::new(Some(tunnel)),
            config,
        }))
    }

    /// Create a manager with no tunnel installed; the keep-alive loop dials it
    pub fn disconnected(connector: Arc<dyn TunnelConnector>, config: SessionConfig) -> Arc<Self> {
        Arc::new(SessionManager {
            connector,
            current: Mutex::new(None),
            config,
        })
    }

    /// Get the session configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Return the current tunnel
    ///
    /// The handle must not be kept beyond a single use: a failed dial on it
    /// means the session is down and the caller should acquire again.
    pub async fn acquire(&self) -> Result<Arc<dyn Tunnel>, SessionError> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or(SessionError::Unavailable)
    }

    /// Whether a tunnel is currently installed
    pub async fn is_available(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Acquire the tunnel and open a stream to `host:port` through it
    ///
    /// If the tunnel turns out to be closed, it is cleared so that the next
    /// keep-alive cycle redials.
    pub async fn dial(&self, host: &str, port: u16) -> Result<Box<dyn TunnelStream>, SessionError> {
        let tunnel = self.acquire().await?;

        let result =
            tokio::time::timeout(self.config.dial_timeout(), tunnel.open_stream(host, port)).await;

        match result {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => {
                if e.is_session_down() || tunnel.is_closed() {
                    self.invalidate(&tunnel).await;
                }
                Err(e)
            }
            Err(_) => Err(SessionError::Timeout(self.config.dial_timeout)),
        }
    }

    /// Clear the session if `stale` is still the authoritative tunnel
    pub async fn invalidate(&self, stale: &Arc<dyn Tunnel>) {
        let removed = {
            let mut current = self.current.lock().await;
            let is_current = current
                .as_ref()
                .is_some_and(|t| std::ptr::addr_eq(Arc::as_ptr(t), Arc::as_ptr(stale)));
            if is_current {
                current.take()
            } else {
                None
            }
        };

        if let Some(tunnel) = removed {
            warn!(
                "SSH session to {} closed, waiting for next keep-alive cycle to reconnect",
                self.connector.endpoint()
            );
            tunnel.close().await;
        }
    }

    /// Run one keep-alive cycle
    ///
    /// Probes the installed tunnel; on failure closes and clears it, then
    /// redials. With no tunnel installed, redials directly. The lock is held
    /// for the whole check-and-redial sequence.
    pub async fn check(&self) -> SessionTransition {
        let endpoint = self.connector.endpoint();
        let mut current = self.current.lock().await;

        let lost = match current.as_ref() {
            Some(tunnel) => match self.probe(tunnel.as_ref()).await {
                Ok(()) => {
                    debug!("SSH session to {} is healthy", endpoint);
                    return SessionTransition::Healthy;
                }
                Err(e) => {
                    warn!("SSH session to {} lost, reconnecting: {}", endpoint, e);
                    true
                }
            },
            None => {
                warn!("SSH session to {} absent, trying to reconnect", endpoint);
                false
            }
        };

        if let Some(stale) = current.take() {
            stale.close().await;
        }

        let reconnected = match self.connector.connect().await {
            Ok(tunnel) => {
                *current = Some(tunnel);
                info!("SSH session to {} re-established", endpoint);
                true
            }
            Err(e) => {
                error!("Reconnect to {} failed: {:#}", endpoint, e);
                false
            }
        };

        match (lost, reconnected) {
            (true, reconnected) => SessionTransition::Lost { reconnected },
            (false, true) => SessionTransition::Reconnected,
            (false, false) => SessionTransition::StillDown,
        }
    }

    async fn probe(&self, tunnel: &dyn Tunnel) -> Result<(), SessionError> {
        if tunnel.is_closed() {
            return Err(SessionError::Closed);
        }

        match tokio::time::timeout(self.config.dial_timeout(), tunnel.probe()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout(self.config.dial_timeout)),
        }
    }

    /// Run the keep-alive loop until shutdown
    ///
    /// Sleeps `keepalive_interval` between cycles; there is no backoff and
    /// no cap on redial attempts.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<bool>) {
        let interval = self.config.keepalive_interval();
        info!("SSH keep-alive loop started (interval {:?})", interval);

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let transition = self.check().await;
                    debug!(?transition, "Keep-alive cycle finished");
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping keep-alive loop");
                    break;
                }
            }
        }

        self.shutdown().await;
    }

    /// Close and clear the current tunnel
    pub async fn shutdown(&self) {
        let tunnel = self.current.lock().await.take();
        if let Some(tunnel) = tunnel {
            tunnel.close().await;
            info!("SSH session to {} closed", self.connector.endpoint());
        }
    }
}
