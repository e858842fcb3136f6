//! Bidirectional byte relay
//!
//! Binds a client-facing stream to a target-facing stream. Each direction
//! runs in its own task and the relay returns only once both have finished.
//! When a direction ends its destination is shut down for writing, so the
//! peer sees EOF while the opposite direction keeps flowing.

use crate::helper::DEFAULT_BUFFER_SIZE;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Bytes moved by one relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to target
    pub sent: u64,
    /// Target to client
    pub received: u64,
}

/// Relay bytes between `client` and `target` until both directions finish
///
/// A direction finishes on EOF, on an IO error, or when `idle_timeout` is
/// set and no bytes arrive for that long. Errors are logged, never
/// returned; the stats count what was written before each direction ended.
pub async fn relay<A, B>(client: A, target: B, idle_timeout: Option<Duration>) -> RelayStats
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (target_read, target_write) = tokio::io::split(target);

    let upstream = tokio::spawn(copy_direction(client_read, target_write, idle_timeout));
    let downstream = tokio::spawn(copy_direction(target_read, client_write, idle_timeout));

    let (up, down) = tokio::join!(upstream, downstream);

    let stats = RelayStats {
        sent: finished("client->target", up),
        received: finished("target->client", down),
    };

    debug!(
        "Relay finished: {} bytes sent, {} bytes received",
        stats.sent, stats.received
    );
    stats
}

type DirectionResult = Result<(u64, Option<io::Error>), tokio::task::JoinError>;

fn finished(direction: &str, result: DirectionResult) -> u64 {
    match result {
        Ok((bytes, None)) => {
            debug!("{} finished: {} bytes", direction, bytes);
            bytes
        }
        Ok((bytes, Some(e))) => {
            debug!("{} error after {} bytes: {}", direction, bytes, e);
            bytes
        }
        Err(e) => {
            debug!("{} task failed: {}", direction, e);
            0
        }
    }
}

/// Copy one direction, then shut the writer down
async fn copy_direction<R, W>(
    mut reader: R,
    mut writer: W,
    idle_timeout: Option<Duration>,
) -> (u64, Option<io::Error>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; DEFAULT_BUFFER_SIZE];
    let mut total = 0u64;

    let error = loop {
        let read = match idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    break Some(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "relay idle timeout",
                    ))
                }
            },
            None => reader.read(&mut buf).await,
        };

        let n = match read {
            Ok(0) => break None,
            Ok(n) => n,
            Err(e) => break Some(e),
        };

        if let Err(e) = writer.write_all(&buf[..n]).await {
            break Some(e);
        }
        total += n as u64;
    };

    let _ = writer.shutdown().await;
    (total, error)
}
