//! SSH session module for Sshgate
//!
//! All outbound connections are opened through a single SSH session. This
//! module defines the tunnel seam ([`Tunnel`], [`TunnelConnector`]), the
//! [`SessionManager`] that owns the authoritative tunnel and keeps it alive,
//! and the `russh` backed implementation in [`ssh`].
//!
//! ```text
//! SOCKS5 handler --acquire()--> SessionManager --open_stream()--> SshTunnel --direct-tcpip--> Target
//!                                     ^
//!                                     | every keepalive_interval: probe, redial on failure
//! ```

pub mod credentials;
mod manager;
pub mod ssh;

pub use credentials::{find_ssh_key, resolve_credentials, SshAuth};
pub use manager::{SessionManager, SessionTransition};
pub use ssh::{SshConnector, SshTunnel};

use crate::error::SessionError;
use crate::transport::TunnelStream;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// A live outbound tunnel able to open streams to arbitrary targets
#[async_trait]
pub trait Tunnel: Send + Sync + Debug {
    /// Send a lightweight round-trip to check the tunnel is still usable
    async fn probe(&self) -> Result<(), SessionError>;

    /// Open a duplex stream to `host:port` through the tunnel
    ///
    /// `host` is resolved by the remote end.
    async fn open_stream(&self, host: &str, port: u16)
        -> Result<Box<dyn TunnelStream>, SessionError>;

    /// Whether the tunnel is known to be closed without probing it
    fn is_closed(&self) -> bool;

    /// Close the tunnel
    async fn close(&self);
}

/// Factory for new tunnels, holding the endpoint and credentials
#[async_trait]
pub trait TunnelConnector: Send + Sync + Debug {
    /// Human-readable remote endpoint, for logging
    fn endpoint(&self) -> String;

    /// Dial and authenticate a fresh tunnel
    async fn connect(&self) -> Result<Arc<dyn Tunnel>>;
}
