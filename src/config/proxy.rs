//! Listener and relay configuration
//!
//! Defines the SOCKS5 and HTTP listener settings plus relay tuning.

use crate::helper::{RetryPolicy, DEFAULT_CONNECT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_socks_port() -> u16 {
    1080
}

fn default_http_port() -> u16 {
    8080
}

fn default_http_enabled() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_max_header_size() -> usize {
    64 * 1024
}

/// Format `bind:port`, bracketing IPv6 literals
fn listen_addr(bind: &str, port: u16) -> String {
    if bind.contains(':') && !bind.starts_with('[') {
        format!("[{}]:{}", bind, port)
    } else {
        format!("{}:{}", bind, port)
    }
}

/// SOCKS5 server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocksConfig {
    /// Local bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Local port
    #[serde(default = "default_socks_port")]
    pub port: u16,

    /// Enforce RFC 1928 method and command checks instead of always
    /// answering "no authentication" and treating every command as CONNECT
    #[serde(default)]
    pub strict: bool,

    /// How long a new connection waits for the SSH session
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_socks_port(),
            strict: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl SocksConfig {
    /// Listen address as `bind:port`
    pub fn listen_addr(&self) -> String {
        listen_addr(&self.bind, self.port)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.retry.validate()
    }
}

/// HTTP proxy configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    /// Run the HTTP proxy listener
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,

    /// Local bind address
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Local port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Timeout in seconds for dialing through the SOCKS5 listener
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Largest accepted request head in bytes
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind: default_bind(),
            port: default_http_port(),
            connect_timeout: default_connect_timeout(),
            max_header_size: default_max_header_size(),
        }
    }
}

impl HttpConfig {
    /// Listen address as `bind:port`
    pub fn listen_addr(&self) -> String {
        listen_addr(&self.bind, self.port)
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_header_size < 512 {
            return Err("http max_header_size must be at least 512 bytes".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("http connect_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Byte relay configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RelayConfig {
    /// Close a relay direction after this many idle seconds; no deadline
    /// when unset
    #[serde(default)]
    pub idle_timeout: Option<u64>,
}

impl RelayConfig {
    /// Idle timeout as a [`Duration`], treating 0 as disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}
