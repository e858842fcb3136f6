//! Main SOCKS5 handler
//!
//! Runs the per-connection state machine: method negotiation, request
//! parsing, dialing the target through the SSH session, and relaying.

use crate::config::{RelayConfig, SocksConfig};
use crate::error::Socks5Error;
use crate::relay::relay;
use crate::session::SessionManager;
use crate::socks::auth::negotiate;
use crate::socks::command::{
    parse_request, send_command_not_supported, send_general_failure, send_success,
};
use crate::socks::types::SocksCommand;
use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Handle the SOCKS5 protocol on an accepted stream
///
/// # Protocol Flow
///
/// 1. Method negotiation (always "no authentication")
/// 2. Request parsing
/// 3. Dial through the session; reply success or general failure
/// 4. Relay until both directions finish
///
/// Protocol errors abort the connection without a reply, except for an
/// empty or non-UTF-8 domain, which is answered with general failure like
/// any other failed dial. In strict mode
/// commands other than CONNECT are answered with "command not supported";
/// otherwise every command is treated as CONNECT.
pub async fn handle_socks5_on_stream<S>(
    mut stream: S,
    sessions: &SessionManager,
    config: &SocksConfig,
    relay_config: &RelayConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    // Step 1: Method negotiation
    negotiate(&mut stream, config.strict)
        .await
        .with_context(|| "Method negotiation failed")?;

    // Step 2: Read and parse the request
    let (cmd_byte, target_addr) = match parse_request(&mut stream).await {
        Ok(request) => request,
        Err(e) => {
            // An unusable domain can never be dialed, so it fails like a dial
            if let Some(Socks5Error::InvalidDomain(domain)) = e.downcast_ref::<Socks5Error>() {
                warn!("Cannot dial invalid domain {:?}", domain);
                send_general_failure(&mut stream).await?;
            }
            return Err(e.context("Failed to parse SOCKS5 request"));
        }
    };

    match SocksCommand::from_byte(cmd_byte) {
        Some(SocksCommand::Connect) => {}
        command if config.strict => {
            warn!(
                "Rejecting SOCKS5 command {} to {}",
                command.map_or_else(|| format!("{:#04x}", cmd_byte), |c| c.to_string()),
                target_addr
            );
            send_command_not_supported(&mut stream).await?;
            return Err(Socks5Error::CommandNotSupported(cmd_byte).into());
        }
        _ => debug!("Treating SOCKS5 command {:#04x} as CONNECT", cmd_byte),
    }

    info!("SOCKS5 CONNECT request to {}", target_addr);

    // Step 3: Dial the target through the session
    let remote = match sessions
        .dial(&target_addr.host(), target_addr.port())
        .await
    {
        Ok(remote) => remote,
        Err(e) => {
            warn!("Failed to dial {} through SSH: {}", target_addr, e);
            send_general_failure(&mut stream).await?;
            return Err(e).with_context(|| format!("Failed to dial {}", target_addr));
        }
    };

    send_success(&mut stream).await?;
    debug!("SOCKS5 tunnel established to {}", target_addr);

    // Step 4: Relay
    let stats = relay(stream, remote, relay_config.idle_timeout()).await;
    debug!(
        "SOCKS5 connection to {} closed ({} bytes up, {} bytes down)",
        target_addr, stats.sent, stats.received
    );

    Ok(())
}
