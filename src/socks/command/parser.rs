//! SOCKS5 request parser
//!
//! Parses the connect request sent after method negotiation.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Parse a SOCKS5 request from the stream
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The raw command byte is returned unvalidated; the caller decides whether
/// anything other than CONNECT is acceptable. The version byte of the
/// request is not checked either, only the one sent during negotiation.
pub async fn parse_request<S>(stream: &mut S) -> Result<(u8, TargetAddr)>
where
    S: AsyncRead + Unpin,
{
    // Read: VER CMD RSV ATYP
    let mut header = [0u8; 4];
    stream
        .read_exact(&mut header)
        .await
        .with_context(|| "Failed to read request header")?;

    let cmd_byte = header[1];
    let addr_type = header[3];

    let target_addr = parse_address(stream, addr_type).await?;

    tracing::debug!("Parsed SOCKS5 request: cmd={} to {}", cmd_byte, target_addr);

    Ok((cmd_byte, target_addr))
}

/// Parse the address and port portion of a SOCKS5 request
async fn parse_address<S>(stream: &mut S, addr_type: u8) -> Result<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;

            Ok(TargetAddr::ipv4(Ipv4Addr::from(addr), port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let domain_len = stream.read_u8().await? as usize;

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;

            let port = read_port(stream).await?;

            let domain = String::from_utf8(domain_buf).map_err(|e| {
                Socks5Error::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
            })?;
            if domain.is_empty() {
                return Err(Socks5Error::InvalidDomain(domain).into());
            }

            Ok(TargetAddr::domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;

            Ok(TargetAddr::ipv6(Ipv6Addr::from(addr), port))
        }

        _ => Err(Socks5Error::AddressTypeNotSupported(addr_type).into()),
    }
}

async fn read_port<S>(stream: &mut S) -> Result<u16>
where
    S: AsyncRead + Unpin,
{
    stream
        .read_u16()
        .await
        .with_context(|| "Failed to read port")
}
