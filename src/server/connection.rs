//! One accepted client connection
//!
//! A [`Connection`] owns the write half of the stream, the input handle that
//! cancels reads, and the registry entry. The read half goes to the
//! dispatcher. Dropping the connection removes it from the registry.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tracing::debug;

use super::probe::Probe;
use super::registry::{ConnectionId, ConnectionRegistry, Registration};
use crate::error::TransportError;
use crate::protocol::frame::ResponseFrame;
use crate::transport::{self, InputHandle, TransportReader, TransportWriter};

pub struct Connection<S> {
    peer_addr: Option<SocketAddr>,
    writer: TransportWriter<WriteHalf<S>>,
    input: InputHandle,
    probe: Arc<dyn Probe>,
    registration: Registration,
    /// Writes issued so far; only ever grows
    writes: u64,
    closed: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Register `stream` and split it.
    ///
    /// Returns the connection together with the reader the dispatcher
    /// drives.
    pub fn create(
        stream: S,
        registry: &ConnectionRegistry,
        peer_addr: Option<SocketAddr>,
        probe: Arc<dyn Probe>,
    ) -> (Self, TransportReader<ReadHalf<S>>) {
        let input = InputHandle::new();
        let (reader, writer) = transport::split(stream, &input, probe.clone());
        let registration = registry.register(peer_addr, input.clone());
        probe.connection_established();
        debug!(connection_id = %registration.id(), peer = ?peer_addr, "Connection registered");

        (
            Self {
                peer_addr,
                writer,
                input,
                probe,
                registration,
                writes: 0,
                closed: false,
            },
            reader,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.registration.id()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn input_handle(&self) -> InputHandle {
        self.input.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Write `chunks` in order and count them as sent
    pub async fn write(&mut self, chunks: &[Bytes]) -> Result<usize, TransportError> {
        self.writes += 1;
        let written = self.writer.write(chunks).await?;
        self.probe.add_bytes_sent(written);
        Ok(written)
    }

    pub async fn write_frame(&mut self, frame: ResponseFrame) -> Result<usize, TransportError> {
        self.write(&frame.into_chunks()).await
    }

    /// Half-close the read side, leaving writes open for pending responses
    pub fn shutdown_input(&self) {
        if let Err(e) = self.input.shutdown() {
            self.probe.connection_close_error();
            debug!(connection_id = %self.id(), error = %e, "Input shutdown had nothing to close");
        }
    }

    /// Close both directions. Idempotent; only the first call reports
    /// `connection_closed`.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.probe.connection_closed();
        let _ = self.input.shutdown();
        if let Err(e) = self.writer.shutdown().await {
            self.probe.connection_close_error();
            debug!(connection_id = %self.id(), error = %e, "Error closing write half");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::probe::ServerProbe;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_create_write_and_shutdown() {
        let registry = ConnectionRegistry::new();
        let probe = Arc::new(ServerProbe::new());
        let (client, server) = tokio::io::duplex(256);
        let (mut conn, _reader) =
            Connection::create(server, &registry, "10.0.0.1:4000".parse().ok(), probe.clone());

        assert!(registry.contains(conn.id()));
        assert_eq!(probe.snapshot().connections_established, 1);

        let frame = ResponseFrame::new(9, Bytes::from_static(b"\x00\x00"));
        let wire_len = frame.wire_len();
        assert_eq!(conn.write_frame(frame).await.unwrap(), wire_len);
        assert_eq!(probe.snapshot().bytes_sent, wire_len as u64);
        assert_eq!(conn.writes(), 1);

        conn.shutdown().await;
        conn.shutdown().await;
        assert!(conn.is_closed());
        assert!(conn.input_handle().is_shutdown());
        assert_eq!(probe.snapshot().connections_closed, 1);

        let (mut client_read, _client_write) = tokio::io::split(client);
        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.len(), wire_len);

        let id = conn.id();
        drop(conn);
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_second_input_shutdown_counts_close_error() {
        let registry = ConnectionRegistry::new();
        let probe = Arc::new(ServerProbe::new());
        let (_client, server) = tokio::io::duplex(64);
        let (conn, _reader) = Connection::create(server, &registry, None, probe.clone());

        conn.shutdown_input();
        assert_eq!(probe.snapshot().connection_close_errors, 0);
        conn.shutdown_input();
        assert_eq!(probe.snapshot().connection_close_errors, 1);
    }
}
