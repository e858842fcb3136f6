//! Error types for Sshgate
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use thiserror::Error;

/// Main error type for Sshgate operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),

    /// HTTP proxy error
    #[error("HTTP error: {0}")]
    Http(String),
}

/// SOCKS5 specific errors
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// No acceptable authentication method
    #[error("No acceptable authentication method")]
    NoAcceptableMethod,

    /// Command not supported
    #[error("Command not supported: {0}")]
    CommandNotSupported(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    AddressTypeNotSupported(u8),

    /// Invalid domain name
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),
}

/// Errors raised by the SSH session manager and its tunnels
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No live tunnel is installed
    #[error("SSH session unavailable")]
    Unavailable,

    /// The tunnel was closed underneath the caller
    #[error("SSH session closed")]
    Closed,

    /// Establishing the tunnel or a channel through it failed
    #[error("Dial failed: {0}")]
    Dial(String),

    /// The liveness probe failed
    #[error("Keep-alive probe failed: {0}")]
    Probe(String),

    /// Operation did not finish in time
    #[error("Timed out after {0}s")]
    Timeout(u64),
}

impl SessionError {
    /// Whether this error means the tunnel itself is gone, rather than a
    /// single target being unreachable through it
    pub fn is_session_down(&self) -> bool {
        matches!(self, SessionError::Unavailable | SessionError::Closed)
    }
}

/// Reply codes sent to SOCKS5 clients
///
/// Every dial failure is reported as `GeneralFailure`, whatever the cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Command not supported
    CommandNotSupported = 0x07,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}
