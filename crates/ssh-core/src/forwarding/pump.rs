use std::{fmt, io};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::PUMP_BUFFER_SIZE;

/// Which half of a pumped connection finished first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Local peer -> tunnel ("sent").
    LocalToTunnel,
    /// Tunnel -> local peer ("received").
    TunnelToLocal,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LocalToTunnel => f.write_str("local->tunnel"),
            Direction::TunnelToLocal => f.write_str("tunnel->local"),
        }
    }
}

/// Result of the direction that ended a [`pump`] call.
#[derive(Debug)]
pub struct PumpOutcome {
    pub direction: Direction,
    /// Bytes written by that direction, or the error that stopped it.
    pub result: io::Result<u64>,
}

/// Copy `reader` into `writer` until end-of-stream, reporting every successful write.
///
/// `on_write` sees exactly the number of bytes the writer accepted, so a copy
/// cut short mid-buffer never reports bytes that were not delivered.
pub async fn copy_with_stats<R, W, F>(reader: &mut R, writer: &mut W, mut on_write: F) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            writer.shutdown().await.ok();
            return Ok(total);
        }
        let mut offset = 0;
        while offset < read {
            let written = writer.write(&buf[offset..read]).await?;
            if written == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }
            offset += written;
            total += written as u64;
            on_write(written as u64);
        }
        writer.flush().await?;
    }
}

/// Pump bytes both ways between `local` and `tunnel`.
///
/// Returns as soon as either direction finishes. The other direction is
/// dropped in place and both streams are closed when they go out of scope.
pub async fn pump<L, T, S, R>(local: L, tunnel: T, on_sent: S, on_received: R) -> PumpOutcome
where
    L: AsyncRead + AsyncWrite,
    T: AsyncRead + AsyncWrite,
    S: FnMut(u64),
    R: FnMut(u64),
{
    let (mut local_rx, mut local_tx) = tokio::io::split(local);
    let (mut tunnel_rx, mut tunnel_tx) = tokio::io::split(tunnel);

    let outbound = copy_with_stats(&mut local_rx, &mut tunnel_tx, on_sent);
    let inbound = copy_with_stats(&mut tunnel_rx, &mut local_tx, on_received);

    tokio::select! {
        result = outbound => PumpOutcome { direction: Direction::LocalToTunnel, result },
        result = inbound => PumpOutcome { direction: Direction::TunnelToLocal, result },
    }
}

#[cfg(test)]
#[path = "pump_tests.rs"]
mod tests;
