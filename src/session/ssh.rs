//! SSH tunnel backed by `russh`
//!
//! [`SshConnector`] dials the server, runs the handshake and authenticates.
//! Each target connection is a `direct-tcpip` channel on the resulting
//! session, so the remote end does the DNS resolution.

use super::credentials::SshAuth;
use super::{Tunnel, TunnelConnector};
use crate::config::{SessionConfig, SshConfig};
use crate::error::SessionError;
use crate::transport::{connect_tcp, Endpoint, SocketOpts, TunnelStream};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{HashAlg, PrivateKeyWithHashAlg, PublicKey};
use russh::Disconnect;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client-side handler; only the host key check is customized
struct ClientHandler {
    /// Expected `SHA256:...` fingerprint, if pinned
    expected_fingerprint: Option<String>,
}

impl client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256).to_string();

        match &self.expected_fingerprint {
            Some(expected) if *expected == fingerprint => Ok(true),
            Some(expected) => {
                warn!(
                    "SSH host key mismatch: expected {}, got {}",
                    expected, fingerprint
                );
                Ok(false)
            }
            None => {
                debug!("Accepting SSH host key {}", fingerprint);
                Ok(true)
            }
        }
    }
}

/// Dials and authenticates SSH sessions
pub struct SshConnector {
    endpoint: Endpoint,
    user: String,
    auth: SshAuth,
    connect_timeout: Duration,
    expected_fingerprint: Option<String>,
    client_config: Arc<client::Config>,
}

impl fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConnector")
            .field("endpoint", &self.endpoint.addr())
            .field("user", &self.user)
            .field("auth", &self.auth)
            .finish()
    }
}

impl SshConnector {
    /// Create a connector for the configured server
    pub fn new(config: &SshConfig, session: &SessionConfig, auth: SshAuth) -> Self {
        // Transport-level keep-alives let russh notice a dead peer between
        // our own probes; the session is torn down after three misses.
        let client_config = client::Config {
            keepalive_interval: Some(session.keepalive_interval()),
            keepalive_max: 3,
            inactivity_timeout: None,
            ..Default::default()
        };

        SshConnector {
            endpoint: Endpoint::new(config.endpoint()),
            user: config.user.clone(),
            auth,
            connect_timeout: config.connect_timeout(),
            expected_fingerprint: config.host_key_fingerprint.clone(),
            client_config: Arc::new(client_config),
        }
    }

    async fn handshake(&self) -> Result<Handle<ClientHandler>> {
        let stream = connect_tcp(
            &self.endpoint,
            self.connect_timeout,
            &SocketOpts::for_ssh_session(),
        )
        .await?;

        let handler = ClientHandler {
            expected_fingerprint: self.expected_fingerprint.clone(),
        };

        let mut handle = client::connect_stream(self.client_config.clone(), stream, handler)
            .await
            .context("SSH handshake failed")?;

        let result = match &self.auth {
            SshAuth::Password(password) => handle
                .authenticate_password(self.user.as_str(), password.as_str())
                .await
                .context("SSH password authentication failed")?,
            SshAuth::PublicKey { key, .. } => {
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .context("Failed to negotiate RSA signature hash")?
                    .flatten();
                handle
                    .authenticate_publickey(
                        self.user.as_str(),
                        PrivateKeyWithHashAlg::new(key.clone(), hash_alg),
                    )
                    .await
                    .context("SSH public key authentication failed")?
            }
        };

        if !result.success() {
            bail!("SSH server rejected credentials for user {}", self.user);
        }

        Ok(handle)
    }
}

#[async_trait]
impl TunnelConnector for SshConnector {
    fn endpoint(&self) -> String {
        self.endpoint.addr().to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn Tunnel>> {
        let handle = tokio::time::timeout(self.connect_timeout, self.handshake())
            .await
            .map_err(|_| {
                anyhow!(
                    "SSH connection to {} timed out after {:?}",
                    self.endpoint,
                    self.connect_timeout
                )
            })??;

        info!("Authenticated to {} as {}", self.endpoint, self.user);

        Ok(Arc::new(SshTunnel {
            endpoint: self.endpoint.addr().to_string(),
            handle,
        }))
    }
}

/// An authenticated SSH session
pub struct SshTunnel {
    endpoint: String,
    handle: Handle<ClientHandler>,
}

impl fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTunnel")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.handle.is_closed())
            .finish()
    }
}

#[async_trait]
impl Tunnel for SshTunnel {
    async fn probe(&self) -> Result<(), SessionError> {
        if self.handle.is_closed() {
            return Err(SessionError::Closed);
        }

        // Waits for the server's reply, unlike `send_keepalive`
        self.handle
            .send_ping()
            .await
            .map_err(|e| SessionError::Probe(e.to_string()))?;

        // A torn-down session also resolves the ping
        if self.handle.is_closed() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    async fn open_stream(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn TunnelStream>, SessionError> {
        if self.handle.is_closed() {
            return Err(SessionError::Closed);
        }

        let channel = self
            .handle
            .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
            .await
            .map_err(|e| {
                if self.handle.is_closed() {
                    SessionError::Closed
                } else {
                    SessionError::Dial(format!("{}:{}: {}", host, port, e))
                }
            })?;

        debug!("Opened direct-tcpip channel to {}:{}", host, port);
        Ok(Box::new(channel.into_stream()))
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    async fn close(&self) {
        if self.handle.is_closed() {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("SSH disconnect from {} failed: {}", self.endpoint, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SshAuthKind;
    use russh::client::Handler;
    use russh::keys::ssh_key::private::Ed25519Keypair;
    use russh::keys::PrivateKey;
    use rand::rngs::OsRng;
    use russh::server::Auth;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
    use tokio::net::{TcpListener, TcpStream};

    fn test_key() -> PrivateKey {
        PrivateKey::from(Ed25519Keypair::random(&mut OsRng))
    }

    #[tokio::test]
    async fn test_host_key_accepted_when_not_pinned() {
        let key = test_key();
        let mut handler = ClientHandler {
            expected_fingerprint: None,
        };
        assert!(handler.check_server_key(key.public_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_host_key_pinned() {
        let key = test_key();
        let fingerprint = key.public_key().fingerprint(HashAlg::Sha256).to_string();

        let mut handler = ClientHandler {
            expected_fingerprint: Some(fingerprint),
        };
        assert!(handler.check_server_key(key.public_key()).await.unwrap());

        let other = test_key();
        assert!(!handler.check_server_key(other.public_key()).await.unwrap());
    }

    #[test]
    fn test_connector_debug_hides_password() {
        let config = SshConfig {
            host: "ssh.example.org".to_string(),
            user: "alice".to_string(),
            auth: SshAuthKind::Password,
            ..Default::default()
        };
        let connector = SshConnector::new(
            &config,
            &SessionConfig::default(),
            SshAuth::Password("secret".to_string()),
        );

        let debug = format!("{:?}", connector);
        assert!(debug.contains("ssh.example.org:22"));
        assert!(!debug.contains("secret"));
        assert_eq!(connector.endpoint(), "ssh.example.org:22");
    }

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = SshConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            user: "alice".to_string(),
            connect_timeout: 2,
            ..Default::default()
        };
        let connector = SshConnector::new(
            &config,
            &SessionConfig::default(),
            SshAuth::Password("secret".to_string()),
        );

        assert!(connector.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept but never speak SSH
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let config = SshConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            user: "alice".to_string(),
            connect_timeout: 1,
            ..Default::default()
        };
        let connector = SshConnector::new(
            &config,
            &SessionConfig::default(),
            SshAuth::Password("secret".to_string()),
        );

        let err = connector.connect().await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    /// Server side of the test session; stops reading once `frozen` is set
    struct FreezableStream {
        inner: TcpStream,
        frozen: Arc<AtomicBool>,
    }

    impl AsyncRead for FreezableStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.frozen.load(Ordering::SeqCst) {
                return Poll::Pending;
            }
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for FreezableStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    struct AcceptAll;

    impl russh::server::Handler for AcceptAll {
        type Error = anyhow::Error;

        async fn auth_password(&mut self, _user: &str, _password: &str) -> Result<Auth> {
            Ok(Auth::Accept)
        }
    }

    /// Start a one-connection SSH server accepting any password
    async fn start_ssh_server() -> (SshConfig, Arc<AtomicBool>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let frozen = Arc::new(AtomicBool::new(false));

        let server_config = Arc::new(russh::server::Config {
            keys: vec![test_key()],
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            ..Default::default()
        });
        let server_frozen = frozen.clone();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let stream = FreezableStream {
                inner: socket,
                frozen: server_frozen,
            };
            let session = russh::server::run_stream(server_config, stream, AcceptAll)
                .await
                .unwrap();
            let _ = session.await;
        });

        let config = SshConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            user: "alice".to_string(),
            auth: SshAuthKind::Password,
            connect_timeout: 5,
            ..Default::default()
        };
        (config, frozen)
    }

    #[tokio::test]
    async fn test_probe_gets_reply_from_server() {
        let (config, _frozen) = start_ssh_server().await;
        let connector = SshConnector::new(
            &config,
            &SessionConfig::default(),
            SshAuth::Password("secret".to_string()),
        );

        let tunnel = connector.connect().await.unwrap();
        let probed = tokio::time::timeout(Duration::from_secs(5), tunnel.probe()).await;
        assert!(matches!(probed, Ok(Ok(()))));
        assert!(!tunnel.is_closed());

        tunnel.close().await;
    }

    #[tokio::test]
    async fn test_probe_waits_for_silent_server() {
        let (config, frozen) = start_ssh_server().await;
        let connector = SshConnector::new(
            &config,
            &SessionConfig::default(),
            SshAuth::Password("secret".to_string()),
        );

        let tunnel = connector.connect().await.unwrap();
        tunnel.probe().await.unwrap();

        // The TCP connection stays open but the server never answers
        frozen.store(true, Ordering::SeqCst);
        let probed = tokio::time::timeout(Duration::from_millis(500), tunnel.probe()).await;
        assert!(probed.is_err());
        assert!(!tunnel.is_closed());
    }
}
