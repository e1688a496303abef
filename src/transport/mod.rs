//! Byte stream transport
//!
//! A connection's stream (plain TCP or already-negotiated TLS) is split into
//! a [`TransportReader`] driven by the dispatcher's read loop and a
//! [`TransportWriter`] owned by the connection. Reads race against the
//! connection's [`InputHandle`]: once input is shut down every pending and
//! future read fails with [`TransportError::Shutdown`] instead of blocking.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;

use crate::error::TransportError;
use crate::server::probe::Probe;

/// Split `stream` into its read and write halves.
///
/// Reads stop as soon as `input` is shut down.
pub fn split<S>(
    stream: S,
    input: &InputHandle,
    probe: Arc<dyn Probe>,
) -> (TransportReader<ReadHalf<S>>, TransportWriter<WriteHalf<S>>)
where
    S: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (
        TransportReader::new(read_half, input.subscribe(), probe),
        TransportWriter::new(write_half),
    )
}

/// Cancels a connection's reads. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InputHandle {
    closed: Arc<watch::Sender<bool>>,
}

impl Default for InputHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InputHandle {
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed: Arc::new(closed),
        }
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Half-close the read side.
    ///
    /// Fails with [`TransportError::Shutdown`] when input was already shut
    /// down.
    pub fn shutdown(&self) -> Result<(), TransportError> {
        if self.closed.send_replace(true) {
            return Err(TransportError::Shutdown);
        }
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once input has been shut down
    pub async fn wait_for_shutdown(&self) {
        let mut closed = self.closed.subscribe();
        let _ = closed.wait_for(|closed| *closed).await;
    }
}

/// Read side of a transport stream
pub struct TransportReader<R> {
    inner: R,
    closed: watch::Receiver<bool>,
    probe: Arc<dyn Probe>,
}

impl<R> TransportReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R, closed: watch::Receiver<bool>, probe: Arc<dyn Probe>) -> Self {
        Self {
            inner,
            closed,
            probe,
        }
    }

    /// Read exactly `n` bytes.
    ///
    /// A peer close before `n` bytes arrive is reported as
    /// [`TransportError::EndOfStream`] with the number of bytes that did.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, TransportError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(n).map_err(|e| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::OutOfMemory, e))
        })?;
        buf.resize(n, 0);
        self.fill(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    /// Fill `buf` completely
    pub async fn fill(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let expected = buf.len();
        let mut filled = 0;
        while filled < expected {
            let read = tokio::select! {
                biased;
                _ = self.closed.wait_for(|closed| *closed) => return Err(TransportError::Shutdown),
                read = self.inner.read(&mut buf[filled..]) => read?,
            };
            if read == 0 {
                return Err(TransportError::EndOfStream {
                    read: filled,
                    expected,
                });
            }
            filled += read;
            self.probe.add_bytes_received(read);
        }
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Write side of a transport stream
pub struct TransportWriter<W> {
    inner: W,
    shut_down: bool,
}

impl<W> TransportWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            shut_down: false,
        }
    }

    /// Write every chunk in order and flush.
    ///
    /// Returns the number of bytes handed to the underlying stream.
    pub async fn write(&mut self, chunks: &[Bytes]) -> Result<usize, TransportError> {
        if self.shut_down {
            return Err(TransportError::Shutdown);
        }
        let mut written = 0;
        for chunk in chunks {
            self.inner.write_all(chunk).await?;
            written += chunk.len();
        }
        self.inner.flush().await?;
        Ok(written)
    }

    /// Flush outstanding bytes and close the write half. Idempotent.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::probe::{NoopProbe, ServerProbe};
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_exact_across_partial_writes() {
        let (client, server) = tokio::io::duplex(64);
        let input = InputHandle::new();
        let probe = Arc::new(ServerProbe::new());
        let (mut reader, _writer) = split(server, &input, probe.clone());

        let (_client_read, mut client_write) = tokio::io::split(client);
        tokio::spawn(async move {
            client_write.write_all(b"hel").await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            client_write.write_all(b"lo").await.unwrap();
        });

        let bytes = reader.read_exact(5).await.unwrap();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(probe.snapshot().bytes_received, 5);
    }

    #[tokio::test]
    async fn test_end_of_stream_reports_partial_read() {
        let (client, server) = tokio::io::duplex(64);
        let input = InputHandle::new();
        let (mut reader, _writer) = split(server, &input, Arc::new(NoopProbe));

        let (_client_read, mut client_write) = tokio::io::split(client);
        client_write.write_all(b"ab").await.unwrap();
        client_write.shutdown().await.unwrap();

        let err = reader.read_exact(4).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::EndOfStream {
                read: 2,
                expected: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_input_shutdown_cancels_pending_read() {
        let (_client, server) = tokio::io::duplex(64);
        let input = InputHandle::new();
        let (mut reader, _writer) = split(server, &input, Arc::new(NoopProbe));

        let pending = tokio::spawn(async move { reader.read_exact(4).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(input.shutdown().is_ok());

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(TransportError::Shutdown)));
        // Second half-close has nothing left to do
        assert!(input.shutdown().is_err());
        assert!(input.is_shutdown());
    }

    #[tokio::test]
    async fn test_shutdown_succeeds_after_reader_is_gone() {
        let (_client, server) = tokio::io::duplex(64);
        let input = InputHandle::new();
        let (reader, _writer) = split(server, &input, Arc::new(NoopProbe));

        // The reading task may finish before the half-close is reported
        drop(reader);
        assert!(input.shutdown().is_ok());
        assert!(input.shutdown().is_err());
    }

    #[tokio::test]
    async fn test_writer_shutdown_is_idempotent() {
        let (client, server) = tokio::io::duplex(64);
        let input = InputHandle::new();
        let (_reader, mut writer) = split(server, &input, Arc::new(NoopProbe));

        let written = writer
            .write(&[Bytes::from_static(b"\x00\x00"), Bytes::from_static(b"ok")])
            .await
            .unwrap();
        assert_eq!(written, 4);

        writer.shutdown().await.unwrap();
        writer.shutdown().await.unwrap();
        assert!(matches!(
            writer.write(&[Bytes::from_static(b"late")]).await,
            Err(TransportError::Shutdown)
        ));

        let (mut client_read, _client_write) = tokio::io::split(client);
        let mut received = Vec::new();
        client_read.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"\x00\x00ok");
    }
}
