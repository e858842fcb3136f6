//! Configuration module for Sshgate
//!
//! This module provides configuration types and parsing for the gateway.
//! Every field has a default, so an empty file (or no file at all) yields
//! a usable configuration once the SSH user is set.

mod proxy;
mod session;
mod ssh;

pub use proxy::{HttpConfig, RelayConfig, SocksConfig};
pub use session::SessionConfig;
pub use ssh::{SshAuthKind, SshConfig};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// SSH server and credentials
    #[serde(default)]
    pub ssh: SshConfig,

    /// Session manager tuning
    #[serde(default)]
    pub session: SessionConfig,

    /// SOCKS5 listener
    #[serde(default)]
    pub socks: SocksConfig,

    /// HTTP proxy listener
    #[serde(default)]
    pub http: HttpConfig,

    /// Byte relay tuning
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Config {
    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), String> {
        self.ssh.validate()?;
        self.session.validate()?;
        self.socks.validate()?;
        self.http.validate()?;

        if self.http.enabled && self.http.bind == self.socks.bind && self.http.port == self.socks.port
        {
            return Err(format!(
                "SOCKS5 and HTTP listeners both configured on {}:{}",
                self.socks.bind, self.socks.port
            ));
        }

        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::Backoff;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_config() {
        let config_str = r#"
[ssh]
host = "bastion.example.com"
user = "alice"
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.ssh.host, "bastion.example.com");
        assert_eq!(config.ssh.user, "alice");
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.ssh.auth, SshAuthKind::Key);
        assert_eq!(config.session.keepalive_interval, 30);
        assert_eq!(config.socks.port, 1080);
        assert_eq!(config.http.port, 8080);
        assert!(config.http.enabled);
        assert!(config.relay.idle_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
[ssh]
host = "10.0.0.5"
port = 2222
user = "bob"
auth = "password"
password = "hunter2"
connect_timeout = 5
host_key_fingerprint = "SHA256:abcdef"

[session]
keepalive_interval = 15
dial_timeout = 7

[socks]
bind = "0.0.0.0"
port = 1081
strict = true

[socks.retry]
max_attempts = 5

[socks.retry.backoff]
strategy = "linear"
step_ms = 500

[http]
enabled = false
port = 3128
max_header_size = 8192

[relay]
idle_timeout = 600
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.ssh.port, 2222);
        assert_eq!(config.ssh.auth, SshAuthKind::Password);
        assert_eq!(config.ssh.password.as_deref(), Some("hunter2"));
        assert_eq!(config.ssh.host_key_fingerprint.as_deref(), Some("SHA256:abcdef"));
        assert_eq!(config.session.keepalive_interval, 15);
        assert_eq!(config.session.dial_timeout, 7);
        assert!(config.socks.strict);
        assert_eq!(config.socks.retry.max_attempts, 5);
        assert_eq!(config.socks.retry.backoff, Backoff::Linear { step_ms: 500 });
        assert!(!config.http.enabled);
        assert_eq!(config.http.port, 3128);
        assert_eq!(config.http.max_header_size, 8192);
        assert_eq!(config.relay.idle_timeout, Some(600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_config() {
        assert!(parse_config("[ssh]\nport = \"not a number\"").is_err());
    }

    #[test]
    fn test_validate_requires_user() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.contains("user"));
    }

    #[test]
    fn test_validate_rejects_same_listener() {
        let mut config = Config::default();
        config.ssh.user = "alice".to_string();
        config.http.port = config.socks.port;
        assert!(config.validate().is_err());

        config.http.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[ssh]\nuser = \"carol\"\n[socks]\nport = 9050").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ssh.user, "carol");
        assert_eq!(config.socks.port, 9050);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/sshgate.toml");
        assert!(result.is_err());
        assert!(format!("{:#}", result.unwrap_err()).contains("Failed to read config file"));
    }
}
