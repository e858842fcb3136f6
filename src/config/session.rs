//! Session manager configuration

use crate::helper::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_KEEPALIVE_INTERVAL_SECS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_keepalive_interval() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL_SECS
}

fn default_dial_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Session manager configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Seconds between liveness checks (and redial attempts)
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval: u64,

    /// Seconds allowed for opening one channel through the tunnel
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: default_keepalive_interval(),
            dial_timeout: default_dial_timeout(),
        }
    }
}

impl SessionConfig {
    /// Keep-alive interval as a [`Duration`]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval)
    }

    /// Dial timeout as a [`Duration`]
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.keepalive_interval == 0 {
            return Err("session keepalive_interval must be greater than 0".to_string());
        }
        if self.dial_timeout == 0 {
            return Err("session dial_timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(config.dial_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_config_validate_zero() {
        let config = SessionConfig {
            keepalive_interval: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
