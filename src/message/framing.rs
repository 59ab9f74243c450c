//! Length-prefixed JSON framing over a single child process's stdio pipes
//! (spec §4.1).
//!
//! A message is a 4-byte big-endian unsigned length followed by that many
//! bytes of UTF-8 JSON. Partial reads are buffered internally by
//! [`AsyncReadExt::read_exact`]; a message is only ever yielded once fully
//! assembled. `send` awaits the underlying writer, which is how write
//! back-pressure is honored: the call does not return until the bytes have
//! been handed to the OS pipe.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum accepted frame length, guarding against a corrupt length prefix
/// causing an unbounded allocation.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Failure modes for a framed channel.
#[derive(Debug, Error)]
pub enum IpcError {
    /// The peer's pipe closed and the read buffer has been fully drained.
    #[error("channel closed")]
    Closed,

    /// A malformed length prefix or invalid JSON was received. Fatal for
    /// this channel — the caller should consider the worker errored.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying I/O failure (pipe reset, etc).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A framed, bidirectional channel to a single worker's stdio.
///
/// Generic over the reader/writer halves so production code plugs in a
/// child's `ChildStdout`/`ChildStdin` while tests plug in an in-memory
/// `tokio::io::duplex` pair.
pub struct IpcChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R, W> IpcChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Serialize `message` as JSON and write it as one length-prefixed frame.
    ///
    /// Returns once the bytes have been flushed to the underlying writer,
    /// which is what provides write back-pressure: a slow peer simply makes
    /// this future take longer to resolve.
    pub async fn send<M: Serialize>(&mut self, message: &M) -> Result<(), IpcError> {
        let payload = serde_json::to_vec(message)
            .map_err(|e| IpcError::Protocol(format!("failed to encode message: {e}")))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| IpcError::Protocol("message exceeds u32::MAX bytes".into()))?;
        self.writer.write_all(&len.to_be_bytes()).await?;
        self.writer.write_all(&payload).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read and fully assemble the next frame, then decode it as JSON.
    ///
    /// Returns `Err(IpcError::Closed)` once the peer's pipe is closed and no
    /// more bytes remain; returns `Err(IpcError::Protocol(_))` on a malformed
    /// length or body, which the caller must treat as fatal for this channel.
    pub async fn receive<M: DeserializeOwned>(&mut self) -> Result<M, IpcError> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(IpcError::Closed)
            }
            Err(e) => return Err(IpcError::Io(e)),
        }
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_BYTES {
            return Err(IpcError::Protocol(format!(
                "frame length {len} exceeds maximum of {MAX_FRAME_BYTES}"
            )));
        }

        let mut body = vec![0u8; len as usize];
        self.reader.read_exact(&mut body).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                IpcError::Protocol("connection closed mid-frame".into())
            } else {
                IpcError::Io(e)
            }
        })?;

        serde_json::from_slice(&body)
            .map_err(|e| IpcError::Protocol(format!("malformed JSON frame: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    #[tokio::test]
    async fn round_trips_a_message_through_a_duplex_pipe() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let mut client_channel = IpcChannel::new(client_r, client_w);
        let mut server_channel = IpcChannel::new(server_r, server_w);

        client_channel.send(&Ping { n: 42 }).await.unwrap();
        let received: Ping = server_channel.receive().await.unwrap();
        assert_eq!(received, Ping { n: 42 });
    }

    #[tokio::test]
    async fn receive_reports_closed_when_peer_drops() {
        let (client, server) = tokio::io::duplex(4096);
        drop(client);
        let (server_r, server_w) = tokio::io::split(server);
        let mut server_channel = IpcChannel::new(server_r, server_w);

        let err = server_channel.receive::<Ping>().await.unwrap_err();
        assert!(matches!(err, IpcError::Closed));
    }

    #[tokio::test]
    async fn receive_reports_protocol_error_on_garbage_length() {
        let (client, server) = tokio::io::duplex(4096);
        let (mut client_r, mut client_w) = tokio::io::split(client);
        drop(&mut client_r);
        client_w.write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes()).await.unwrap();
        client_w.flush().await.unwrap();

        let (server_r, server_w) = tokio::io::split(server);
        let mut server_channel = IpcChannel::new(server_r, server_w);

        let err = server_channel.receive::<Ping>().await.unwrap_err();
        assert!(matches!(err, IpcError::Protocol(_)));
    }

    #[tokio::test]
    async fn multiple_frames_are_assembled_independently() {
        let (client, server) = tokio::io::duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let mut client_channel = IpcChannel::new(client_r, client_w);
        let mut server_channel = IpcChannel::new(server_r, server_w);

        for i in 0..5u32 {
            client_channel.send(&Ping { n: i }).await.unwrap();
        }
        for i in 0..5u32 {
            let msg: Ping = server_channel.receive().await.unwrap();
            assert_eq!(msg.n, i);
        }
    }
}
