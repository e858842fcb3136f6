//! Test utilities and mocks for Sshgate
//!
//! A loopback tunnel stands in for the SSH session: it "opens channels" by
//! dialing plain TCP on the local machine and records every target.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use sshgate::config::{Config, SessionConfig};
use sshgate::error::SessionError;
use sshgate::session::{SessionManager, Tunnel, TunnelConnector};
use sshgate::transport::TunnelStream;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Shared state observed by tests
#[derive(Debug, Default)]
pub struct TunnelState {
    /// Targets dialed through any tunnel, in order
    pub dialed: Mutex<Vec<(String, u16)>>,
    /// Probes fail while this is set
    pub broken: AtomicBool,
    /// New tunnels cannot be dialed while this is set
    pub refuse_connect: AtomicBool,
    /// Number of connect attempts
    pub connects: AtomicUsize,
    /// Number of closed tunnels
    pub closes: AtomicUsize,
}

impl TunnelState {
    /// Targets dialed so far
    pub fn dialed(&self) -> Vec<(String, u16)> {
        self.dialed.lock().unwrap().clone()
    }
}

/// Tunnel dialing loopback TCP
#[derive(Debug)]
pub struct LoopbackTunnel {
    state: Arc<TunnelState>,
    closed: AtomicBool,
}

#[async_trait]
impl Tunnel for LoopbackTunnel {
    async fn probe(&self) -> Result<(), SessionError> {
        if self.state.broken.load(Ordering::SeqCst) {
            Err(SessionError::Probe("keepalive unanswered".into()))
        } else {
            Ok(())
        }
    }

    async fn open_stream(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Box<dyn TunnelStream>, SessionError> {
        self.state
            .dialed
            .lock()
            .unwrap()
            .push((host.to_string(), port));

        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| SessionError::Dial(e.to_string()))?;
        Ok(Box::new(stream))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector producing [`LoopbackTunnel`]s
#[derive(Debug, Default)]
pub struct LoopbackConnector {
    pub state: Arc<TunnelState>,
}

impl LoopbackConnector {
    /// Create a connector and a handle on its shared state
    pub fn new() -> (Arc<Self>, Arc<TunnelState>) {
        let state = Arc::new(TunnelState::default());
        let connector = Arc::new(LoopbackConnector {
            state: state.clone(),
        });
        (connector, state)
    }
}

#[async_trait]
impl TunnelConnector for LoopbackConnector {
    fn endpoint(&self) -> String {
        "loopback:22".to_string()
    }

    async fn connect(&self) -> Result<Arc<dyn Tunnel>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        self.state.broken.store(false, Ordering::SeqCst);
        Ok(Arc::new(LoopbackTunnel {
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session manager with a live loopback tunnel
pub async fn connected_sessions() -> (Arc<SessionManager>, Arc<TunnelState>) {
    let (connector, state) = LoopbackConnector::new();
    let sessions = SessionManager::connect(connector, SessionConfig::default())
        .await
        .unwrap();
    (sessions, state)
}

/// Configuration with both listeners on ephemeral loopback ports
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.ssh.user = "tester".to_string();
    config.socks.port = 0;
    config.http.port = 0;
    config
}

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Echo server accepting any number of connections
pub async fn start_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Server that reads one request head and answers with a fixed response,
/// returning the head it received
pub async fn start_http_origin(
    response: &'static [u8],
) -> (SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
    let (listener, addr) = create_test_listener().await;

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response).await.unwrap();
        head
    });

    (addr, handle)
}

/// SOCKS5 CONNECT request for an IPv4 target
pub fn socks5_ipv4_request(addr: SocketAddr) -> Vec<u8> {
    let ip = match addr {
        SocketAddr::V4(v4) => v4.ip().octets(),
        SocketAddr::V6(_) => panic!("IPv4 address expected"),
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x01];
    request.extend_from_slice(&ip);
    request.extend_from_slice(&addr.port().to_be_bytes());
    request
}

/// SOCKS5 CONNECT request for a domain target
pub fn socks5_domain_request(domain: &str, port: u16) -> Vec<u8> {
    let mut request = vec![0x05, 0x01, 0x00, 0x03, domain.len() as u8];
    request.extend_from_slice(domain.as_bytes());
    request.extend_from_slice(&port.to_be_bytes());
    request
}

/// Run the no-auth greeting and one CONNECT request, returning the stream
/// and the 10 byte reply
pub async fn socks5_connect(proxy: SocketAddr, request: &[u8]) -> (TcpStream, [u8; 10]) {
    let mut stream = TcpStream::connect(proxy).await.unwrap();

    stream.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x00]);

    stream.write_all(request).await.unwrap();
    let mut reply = [0u8; 10];
    stream.read_exact(&mut reply).await.unwrap();

    (stream, reply)
}
