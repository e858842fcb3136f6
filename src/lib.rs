//! # Sshgate - SOCKS5 and HTTP Proxy over a Single SSH Session
//!
//! Sshgate exposes a local SOCKS5 endpoint and a local HTTP/HTTPS forward
//! proxy, and opens every outbound connection as a `direct-tcpip` channel
//! on one persistent SSH session instead of dialing the network directly.
//!
//! ## Features
//!
//! - **Single Tunnel**: all targets are reached through one SSH session
//! - **Self-Healing Session**: a keep-alive loop probes the session and redials it
//! - **SOCKS5 CONNECT**: IPv4, IPv6 and domain targets, resolved remotely
//! - **HTTP Proxy**: `CONNECT` tunneling and plain request forwarding via the SOCKS5 listener
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sshgate::config::load_config;
//! use sshgate::session::{resolve_credentials, SshConnector};
//! use sshgate::Gateway;
//! use std::sync::Arc;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let auth = resolve_credentials(&config.ssh)?;
//!     let connector = Arc::new(SshConnector::new(&config.ssh, &config.session, auth));
//!
//!     let gateway = Gateway::start(&config, connector).await?;
//!     let (shutdown_tx, _) = broadcast::channel(1);
//!     gateway.run(shutdown_tx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! HTTP client -> HTTP proxy -> SOCKS5 client ─┐
//!                                             v
//! SOCKS5 client ------------------------> SOCKS5 server -> SessionManager -> SSH -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod helper;
pub mod http;
pub mod relay;
pub mod session;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{GatewayError, SessionError, Socks5Error};
pub use gateway::Gateway;
pub use session::{SessionManager, SshAuth, SshConnector};

/// Version of the Sshgate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
