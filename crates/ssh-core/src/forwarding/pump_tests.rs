//! Unit tests for the stream pump.

use std::{
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

use super::*;

/// Writer that accepts at most `limit` bytes, then fails.
struct CappedWriter {
    limit: usize,
    written: Vec<u8>,
}

impl AsyncWrite for CappedWriter {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let room = self.limit - self.written.len();
        if room == 0 {
            return Poll::Ready(Err(io::ErrorKind::BrokenPipe.into()));
        }
        let take = room.min(buf.len()).min(7);
        self.written.extend_from_slice(&buf[..take]);
        Poll::Ready(Ok(take))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn copy_counts_only_bytes_the_writer_accepted() {
    let payload = vec![0xabu8; 100];
    let mut reader = payload.as_slice();
    let mut writer = CappedWriter {
        limit: 40,
        written: Vec::new(),
    };
    let mut counted = 0u64;

    let result = copy_with_stats(&mut reader, &mut writer, |n| counted += n).await;

    assert!(result.is_err());
    assert_eq!(counted, 40);
    assert_eq!(writer.written.len(), 40);
}

#[tokio::test]
async fn copy_reports_total_on_clean_eof() {
    let payload = b"hello tunnel".to_vec();
    let mut reader = payload.as_slice();
    let mut sink = Vec::new();
    let mut calls = 0;

    let total = copy_with_stats(&mut reader, &mut sink, |_| calls += 1).await.unwrap();

    assert_eq!(total, payload.len() as u64);
    assert_eq!(sink, payload);
    assert!(calls >= 1);
}

#[tokio::test]
async fn pump_returns_when_first_direction_ends() {
    let (local, mut client) = duplex(1024);
    let (tunnel, mut server) = duplex(1024);
    let mut sent = 0u64;
    let mut received = 0u64;

    let handle = async {
        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        server.write_all(b"pong!").await.unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong!");
        // Server hangs up while the client side stays open.
        drop(server);
        client
    };

    let (outcome, _client) = tokio::join!(pump(local, tunnel, |n| sent += n, |n| received += n), handle);

    assert_eq!(outcome.direction, Direction::TunnelToLocal);
    assert_eq!(outcome.result.unwrap(), 5);
    assert_eq!(sent, 4);
    assert_eq!(received, 5);
}
