//! SSH endpoint address with DNS caching
//!
//! The session manager redials the same endpoint for the lifetime of the
//! process. The resolved address is cached between dials and dropped when a
//! connect attempt fails, so a server that moved is picked up on the next
//! keep-alive cycle.

use anyhow::{Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A `host:port` endpoint that may have a cached resolved address
#[derive(Debug, Clone)]
pub struct Endpoint {
    /// The original address string
    addr: String,
    /// Cached resolved address
    cached: Arc<RwLock<Option<SocketAddr>>>,
}

impl Endpoint {
    /// Create a new endpoint without cached resolution
    pub fn new(addr: impl Into<String>) -> Self {
        Endpoint {
            addr: addr.into(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// The original address string
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The cached address if available
    pub async fn cached(&self) -> Option<SocketAddr> {
        *self.cached.read().await
    }

    /// Forget the cached address
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Resolve the address, using the cache if available
    pub async fn resolve(&self) -> Result<SocketAddr> {
        if let Some(cached) = self.cached().await {
            return Ok(cached);
        }

        let resolved = tokio::net::lookup_host(self.addr.as_str())
            .await
            .with_context(|| format!("Failed to resolve address: {}", self.addr))?
            .next()
            .with_context(|| format!("No addresses found for: {}", self.addr))?;

        *self.cached.write().await = Some(resolved);
        Ok(resolved)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Endpoint {
            addr: addr.to_string(),
            cached: Arc::new(RwLock::new(Some(addr))),
        }
    }
}
