//! SSH connection configuration
//!
//! Describes the remote SSH endpoint and how to authenticate against it.

use crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

fn default_host() -> String {
    "remote.example.com".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// How the gateway authenticates to the SSH server
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SshAuthKind {
    /// Private key file (explicit or discovered in ~/.ssh)
    #[default]
    Key,
    /// Password (from config or prompted)
    Password,
}

/// SSH server configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SshConfig {
    /// SSH server hostname
    #[serde(default = "default_host")]
    pub host: String,

    /// SSH server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// SSH username
    #[serde(default)]
    pub user: String,

    /// Authentication kind
    #[serde(default)]
    pub auth: SshAuthKind,

    /// Private key file; discovered in ~/.ssh when unset
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Password for password auth; prompted when unset
    #[serde(default)]
    pub password: Option<String>,

    /// TCP connect + handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Expected SHA256 host key fingerprint (`SHA256:...`); any key is
    /// accepted when unset
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: String::new(),
            auth: SshAuthKind::default(),
            key_file: None,
            password: None,
            connect_timeout: default_connect_timeout(),
            host_key_fingerprint: None,
        }
    }
}

impl SshConfig {
    /// `host:port` of the SSH server, bracketing IPv6 literals
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Connect timeout as a [`Duration`]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.user.is_empty() {
            return Err("SSH user is required".to_string());
        }
        if self.host.is_empty() {
            return Err("SSH host is required".to_string());
        }
        if self.port == 0 {
            return Err("SSH port must be greater than 0".to_string());
        }
        if self.connect_timeout == 0 {
            return Err("SSH connect_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}
