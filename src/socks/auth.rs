//! SOCKS5 method negotiation
//!
//! Only "no authentication required" is ever selected.

use super::consts::*;
use crate::error::Socks5Error;
use anyhow::Result;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Perform method negotiation
///
/// Reads the version, the method count and the offered methods. In
/// permissive mode the reply is always `05 00`, whatever was offered. In
/// strict mode the client must offer `0x00`; otherwise `05 FF` is sent and
/// the negotiation fails.
///
/// A version other than 5 fails before anything is written.
pub async fn negotiate<S>(stream: &mut S, strict: bool) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let version = buf[0];
    let num_methods = buf[1];

    if version != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(version).into());
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    if strict && !methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        return Err(Socks5Error::NoAcceptableMethod.into());
    }

    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;

    Ok(())
}
