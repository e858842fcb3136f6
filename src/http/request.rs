//! HTTP request head parsing
//!
//! Reads a request head with `httparse`, works out the target of a proxy
//! request and re-serializes forwarded requests in origin-form.

use crate::error::GatewayError;
use bytes::BytesMut;
use std::net::IpAddr;
use tokio::io::{AsyncRead, AsyncReadExt};
use url::{Host, Url};

/// Maximum number of headers accepted in one request head
const MAX_HEADERS: usize = 100;

/// Headers meant for the proxy itself, never forwarded
const HOP_HEADERS: &[&str] = &["proxy-connection", "proxy-authorization"];

/// A parsed request head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method, e.g. `GET` or `CONNECT`
    pub method: String,
    /// Request target as sent by the client
    pub target: String,
    /// HTTP minor version (`0` or `1`)
    pub version: u8,
    /// Headers in the order received
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Outcome of reading a request head
#[derive(Debug)]
pub enum HeadRead {
    /// A complete head; the buffer holds whatever followed it
    Complete(RequestHead),
    /// The client closed before sending anything
    Closed,
}

impl RequestHead {
    /// Whether this is a CONNECT request
    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    /// First value of a header, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Target of a CONNECT request (`host:port`, default port 443)
    pub fn connect_target(&self) -> Result<(String, u16), GatewayError> {
        split_host_port(&self.target, 443)
    }

    /// Target of a plain request and the origin-form path to send it
    ///
    /// Absolute-form targets carry the host; origin-form targets fall back
    /// to the `Host` header. The port defaults to the scheme's.
    pub fn forward_target(&self) -> Result<(String, u16, String), GatewayError> {
        if let Ok(url) = Url::parse(&self.target) {
            if url.scheme() == "http" || url.scheme() == "https" {
                let host = match url.host() {
                    Some(Host::Domain(domain)) => domain.to_string(),
                    Some(Host::Ipv4(ip)) => ip.to_string(),
                    Some(Host::Ipv6(ip)) => ip.to_string(),
                    None => {
                        return Err(GatewayError::Http(format!(
                            "No host in request target: {}",
                            self.target
                        )))
                    }
                };
                let port = url.port_or_known_default().unwrap_or(80);

                let mut path = url.path().to_string();
                if let Some(query) = url.query() {
                    path.push('?');
                    path.push_str(query);
                }
                return Ok((host, port, path));
            }
        }

        if !self.target.starts_with('/') {
            return Err(GatewayError::Http(format!(
                "Unsupported request target: {}",
                self.target
            )));
        }

        let host = self
            .header("host")
            .ok_or_else(|| GatewayError::Http("Missing Host header".to_string()))?;
        let host = std::str::from_utf8(host)
            .map_err(|_| GatewayError::Http("Invalid Host header".to_string()))?;
        let (host, port) = split_host_port(host.trim(), 80)?;

        Ok((host, port, self.target.clone()))
    }

    /// Serialize the head in origin-form for the target server
    ///
    /// Proxy-only headers are dropped. A `Host` header is added when the
    /// client did not send one.
    pub fn to_origin_form(&self, path: &str, host: &str, port: u16) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(
            format!("{} {} HTTP/1.{}\r\n", self.method, path, self.version).as_bytes(),
        );

        for (name, value) in &self.headers {
            if HOP_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value);
            out.extend_from_slice(b"\r\n");
        }

        if self.header("host").is_none() {
            let authority = if host.parse::<std::net::Ipv6Addr>().is_ok() {
                format!("[{}]", host)
            } else {
                host.to_string()
            };
            if port == 80 {
                out.extend_from_slice(format!("Host: {}\r\n", authority).as_bytes());
            } else {
                out.extend_from_slice(format!("Host: {}:{}\r\n", authority, port).as_bytes());
            }
        }

        out.extend_from_slice(b"\r\n");
        out
    }
}

/// Read one request head from the stream
///
/// Bytes are accumulated in `buf`; on success the head is consumed from it
/// and anything the client sent after the head stays in `buf`.
pub async fn read_request_head<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    max_size: usize,
) -> Result<HeadRead, GatewayError>
where
    S: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut req = httparse::Request::new(&mut headers);

            match req.parse(buf) {
                Ok(httparse::Status::Complete(len)) => {
                    let head = RequestHead {
                        method: req.method.unwrap_or_default().to_string(),
                        target: req.path.unwrap_or_default().to_string(),
                        version: req.version.unwrap_or(1),
                        headers: req
                            .headers
                            .iter()
                            .map(|h| (h.name.to_string(), h.value.to_vec()))
                            .collect(),
                    };
                    let _ = buf.split_to(len);
                    return Ok(HeadRead::Complete(head));
                }
                Ok(httparse::Status::Partial) => {
                    if buf.len() >= max_size {
                        return Err(GatewayError::Http(format!(
                            "Request head exceeds {} bytes",
                            max_size
                        )));
                    }
                }
                Err(e) => {
                    return Err(GatewayError::Http(format!("Malformed request head: {}", e)));
                }
            }
        }

        buf.reserve(4096);
        let n = stream.read_buf(buf).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(HeadRead::Closed);
            }
            return Err(GatewayError::Http(
                "Connection closed mid request head".to_string(),
            ));
        }
    }
}

/// Split `host[:port]` or `[v6][:port]`, applying `default_port`
pub fn split_host_port(authority: &str, default_port: u16) -> Result<(String, u16), GatewayError> {
    let invalid = || GatewayError::Http(format!("Invalid authority: {}", authority));

    if authority.is_empty() {
        return Err(invalid());
    }

    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        host.parse::<std::net::Ipv6Addr>().map_err(|_| invalid())?;
        let port = match after {
            "" => default_port,
            _ => after
                .strip_prefix(':')
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)?,
        };
        return Ok((host.to_string(), port));
    }

    // A bare IPv6 literal has no port
    if authority.parse::<IpAddr>().is_ok() {
        return Ok((authority.to_string(), default_port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().map_err(|_| invalid())?;
            if host.is_empty() {
                return Err(invalid());
            }
            Ok((host.to_string(), port))
        }
        None => Ok((authority.to_string(), default_port)),
    }
}
