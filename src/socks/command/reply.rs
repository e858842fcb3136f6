//! SOCKS5 reply builder
//!
//! Every reply carries a zeroed IPv4 bound address and port, so it is always
//! exactly 10 bytes long.

use crate::error::Socks5ReplyCode;
use crate::socks::consts::*;
use anyhow::Result;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Build the reply bytes for a reply code
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   |    4     |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
pub fn build_reply(code: Socks5ReplyCode) -> [u8; SOCKS5_REPLY_LEN] {
    [
        SOCKS5_VERSION,
        code.into(),
        SOCKS5_RESERVED,
        SOCKS5_ADDR_TYPE_IPV4,
        0,
        0,
        0,
        0,
        0,
        0,
    ]
}

/// Send a reply with the given code
pub async fn send_reply<S>(stream: &mut S, code: Socks5ReplyCode) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&build_reply(code)).await?;
    stream.flush().await?;
    Ok(())
}

/// Send a success reply
pub async fn send_success<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    send_reply(stream, Socks5ReplyCode::Succeeded).await
}

/// Send a "general failure" reply
pub async fn send_general_failure<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    send_reply(stream, Socks5ReplyCode::GeneralFailure).await
}

/// Send a "command not supported" reply
pub async fn send_command_not_supported<S>(stream: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    send_reply(stream, Socks5ReplyCode::CommandNotSupported).await
}
