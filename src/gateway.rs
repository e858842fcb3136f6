//! Gateway lifecycle
//!
//! Wires the session manager, the SOCKS5 listener and the HTTP proxy
//! together and runs them until shutdown.

use crate::config::Config;
use crate::http::HttpProxy;
use crate::session::{SessionManager, TunnelConnector};
use crate::socks::SocksServer;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// A started gateway: session established, listeners bound
#[derive(Debug)]
pub struct Gateway {
    sessions: Arc<SessionManager>,
    socks: SocksServer,
    http: Option<HttpProxy>,
}

impl Gateway {
    /// Establish the initial session and bind the listeners
    ///
    /// Any failure here is a startup error. The HTTP proxy dials through
    /// the address the SOCKS5 listener actually bound to.
    pub async fn start(config: &Config, connector: Arc<dyn TunnelConnector>) -> Result<Self> {
        let sessions = SessionManager::connect(connector, config.session.clone()).await?;

        let socks =
            SocksServer::bind(config.socks.clone(), config.relay.clone(), sessions.clone()).await?;
        let socks_addr = socks.local_addr()?;

        let http = if config.http.enabled {
            Some(HttpProxy::bind(config.http.clone(), config.relay.clone(), socks_addr).await?)
        } else {
            info!("HTTP proxy disabled");
            None
        };

        Ok(Gateway {
            sessions,
            socks,
            http,
        })
    }

    /// The session manager
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Address of the SOCKS5 listener
    pub fn socks_addr(&self) -> Result<SocketAddr> {
        self.socks.local_addr()
    }

    /// Address of the HTTP proxy listener, if enabled
    pub fn http_addr(&self) -> Result<Option<SocketAddr>> {
        self.http.as_ref().map(HttpProxy::local_addr).transpose()
    }

    /// Run the keep-alive loop and both listeners until `shutdown_tx` fires
    pub async fn run(self, shutdown_tx: broadcast::Sender<bool>) -> Result<()> {
        let keepalive = tokio::spawn(self.sessions.clone().run(shutdown_tx.subscribe()));
        let socks = tokio::spawn(self.socks.run(shutdown_tx.subscribe()));
        let http = self
            .http
            .map(|http| tokio::spawn(http.run(shutdown_tx.subscribe())));

        info!("All services ready");

        socks.await.context("SOCKS5 listener task failed")??;
        if let Some(http) = http {
            http.await.context("HTTP proxy task failed")??;
        }
        keepalive.await.context("Keep-alive task failed")?;

        info!("Gateway stopped");
        Ok(())
    }
}
