//! Response sink backed by a channel.
//!
//! The handler runs in its own task and writes to a [`ChannelWriter`]. The
//! status line and headers travel over a oneshot channel once the first bytes
//! leave the buffer; body chunks follow over a bounded channel of
//! [`BODY_CHANNEL_CAPACITY`] chunks that backs the [`ChannelBody`] handed to
//! hyper. Output is buffered up to [`FLUSH_THRESHOLD`] bytes, so
//! [`ResponseWriter::flush`] is a real capability here.
//!
//! ## Backpressure
//!
//! When the client reads slower than the handler writes, the channel fills.
//! On a multi-threaded runtime a write then blocks in place until hyper takes
//! a chunk. Elsewhere the writer keeps coalescing up to [`MAX_BUFFERED`]
//! bytes and then fails further writes with [`io::ErrorKind::WouldBlock`].

use bytes::{Bytes, BytesMut};
use hestia_core::{Capabilities, Capability, ResponseResult, ResponseWriter};
use http::{HeaderMap, StatusCode};
use http_body::{Body, Frame, SizeHint};
use std::convert::Infallible;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Buffered body bytes that trigger an automatic send.
pub const FLUSH_THRESHOLD: usize = 4096;

/// Body chunks in flight between a writer and its body.
pub const BODY_CHANNEL_CAPACITY: usize = 8;

/// Bytes a writer holds while its channel is full before rejecting writes.
pub const MAX_BUFFERED: usize = 256 * 1024;

/// Status and headers of a response, as sent to the client.
pub type ResponseHead = (StatusCode, HeaderMap);

/// Creates a connected writer, head receiver and body.
#[must_use]
pub fn response_channel() -> (ChannelWriter, oneshot::Receiver<ResponseHead>, ChannelBody) {
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    let writer = ChannelWriter {
        headers: HeaderMap::new(),
        status: None,
        committed: None,
        head_tx: Some(head_tx),
        body_tx,
        buffer: BytesMut::new(),
    };
    (writer, head_rx, ChannelBody { rx: Some(body_rx) })
}

fn connection_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client connection closed")
}

fn buffer_full() -> io::Error {
    io::Error::new(
        io::ErrorKind::WouldBlock,
        "response buffer is full, the client is not reading",
    )
}

fn can_block_in_place() -> bool {
    Handle::try_current().is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread)
}

/// The [`ResponseWriter`] handed to handlers by the hyper driver.
#[derive(Debug)]
pub struct ChannelWriter {
    headers: HeaderMap,
    status: Option<StatusCode>,
    committed: Option<HeaderMap>,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    body_tx: mpsc::Sender<Bytes>,
    buffer: BytesMut,
}

impl ChannelWriter {
    fn send_head(&mut self) -> io::Result<()> {
        let Some(head_tx) = self.head_tx.take() else {
            return Ok(());
        };
        let status = self.status.unwrap_or(StatusCode::OK);
        let headers = self
            .committed
            .take()
            .unwrap_or_else(|| self.headers.clone());
        head_tx
            .send((status, headers))
            .map_err(|_| connection_closed())
    }

    /// Sends the buffer as one chunk if the channel has room. A full channel
    /// leaves the bytes buffered unless the runtime allows blocking.
    fn send_buffered(&mut self) -> io::Result<()> {
        self.send_head()?;
        if self.buffer.is_empty() {
            return Ok(());
        }
        match self.body_tx.try_reserve() {
            Ok(permit) => {
                permit.send(self.buffer.split().freeze());
                Ok(())
            }
            Err(TrySendError::Closed(())) => Err(connection_closed()),
            Err(TrySendError::Full(())) if can_block_in_place() => {
                let chunk = self.buffer.split().freeze();
                let body_tx = &self.body_tx;
                tokio::task::block_in_place(|| body_tx.blocking_send(chunk))
                    .map_err(|_| connection_closed())
            }
            Err(TrySendError::Full(())) => Ok(()),
        }
    }

    /// Returns the number of body bytes not yet handed to the channel.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Completes the response once the handler has returned, waiting for
    /// channel capacity for whatever is still buffered.
    ///
    /// A handler that never wrote anything produces an empty `200 OK`.
    pub async fn finish(mut self) {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        if let Err(e) = self.send_head() {
            tracing::debug!(error = %e, "Client went away before the response completed");
            return;
        }
        if self.buffer.is_empty() {
            return;
        }
        let chunk = self.buffer.split().freeze();
        if self.body_tx.send(chunk).await.is_err() {
            tracing::debug!("Client went away before the response completed");
        }
    }
}

impl ResponseWriter for ChannelWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            tracing::debug!(status = status.as_u16(), "Superfluous write_header call");
            return;
        }
        self.status = Some(status);
        self.committed = Some(self.headers.clone());
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        if self.body_tx.is_closed() {
            return Err(connection_closed());
        }
        if self.buffer.len() >= MAX_BUFFERED {
            self.send_buffered()?;
            if self.buffer.len() >= MAX_BUFFERED {
                return Err(buffer_full());
            }
        }
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= FLUSH_THRESHOLD {
            self.send_buffered()?;
        }
        Ok(buf.len())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE.with(Capability::Flush)
    }

    fn flush(&mut self) -> ResponseResult<()> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        if let Err(e) = self.send_buffered() {
            tracing::debug!(error = %e, "Flush after the client went away");
        }
        Ok(())
    }
}

/// Response body fed by a [`ChannelWriter`].
#[derive(Debug)]
pub struct ChannelBody {
    rx: Option<mpsc::Receiver<Bytes>>,
}

impl ChannelBody {
    /// Returns a body with no content.
    #[must_use]
    pub fn empty() -> Self {
        Self { rx: None }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(None);
        };
        match rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(None) => {
                self.rx = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.rx.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        if self.rx.is_none() {
            SizeHint::with_exact(0)
        } else {
            SizeHint::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_head_is_sent_on_finish() {
        let (mut writer, head, body) = response_channel();
        writer
            .headers_mut()
            .insert("content-type", HeaderValue::from_static("text/plain"));
        writer.write_all(b"hello").unwrap();
        writer.finish().await;

        let (status, headers) = head.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");
        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_headers_are_committed_at_write_header() {
        let (mut writer, head, _body) = response_channel();
        writer.write_header(StatusCode::CREATED);
        writer
            .headers_mut()
            .insert("x-late", HeaderValue::from_static("1"));
        writer.write_header(StatusCode::ACCEPTED);
        writer.finish().await;

        let (status, headers) = head.await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert!(headers.get("x-late").is_none());
    }

    #[tokio::test]
    async fn test_flush_sends_buffered_bytes() {
        let (mut writer, mut head, mut body) = response_channel();
        writer.write_all(b"partial").unwrap();
        assert!(head.try_recv().is_err());

        writer.flush().unwrap();

        assert_eq!(head.try_recv().unwrap().0, StatusCode::OK);
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"partial"));
    }

    #[tokio::test]
    async fn test_large_writes_stream_without_flush() {
        let (mut writer, mut head, _body) = response_channel();
        writer.write_all(&[b'x'; FLUSH_THRESHOLD]).unwrap();

        assert!(head.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_write_fails_when_client_is_gone() {
        let (mut writer, _head, body) = response_channel();
        drop(body);

        let err = writer.write(b"data").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_full_channel_bounds_buffering() {
        let (mut writer, _head, _body) = response_channel();
        let chunk = [b'x'; FLUSH_THRESHOLD];

        // the body is never polled, so only the channel slots drain the buffer
        for _ in 0..BODY_CHANNEL_CAPACITY {
            writer.write_all(&chunk).unwrap();
        }
        assert_eq!(writer.buffered(), 0);

        let mut accepted = 0;
        let err = loop {
            match writer.write(&chunk) {
                Ok(n) => accepted += n,
                Err(e) => break e,
            }
        };

        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(accepted, MAX_BUFFERED);
        assert_eq!(writer.buffered(), MAX_BUFFERED);
    }

    #[tokio::test]
    async fn test_reading_the_body_relieves_backpressure() {
        let (mut writer, _head, mut body) = response_channel();
        let chunk = [b'x'; FLUSH_THRESHOLD];
        while writer.write(&chunk).is_ok() {}

        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap().len(), FLUSH_THRESHOLD);

        writer.write_all(&chunk).unwrap();
        assert_eq!(writer.buffered(), FLUSH_THRESHOLD);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_multi_thread_writer_waits_for_reader() {
        let (mut writer, head, body) = response_channel();
        let total = FLUSH_THRESHOLD * (BODY_CHANNEL_CAPACITY * 4);

        let reader = tokio::spawn(async move {
            head.await.unwrap();
            body.collect().await.unwrap().to_bytes().len()
        });
        let writing = tokio::spawn(async move {
            for _ in 0..BODY_CHANNEL_CAPACITY * 4 {
                writer.write_all(&[b'y'; FLUSH_THRESHOLD]).unwrap();
                assert!(writer.buffered() < MAX_BUFFERED);
            }
            writer.finish().await;
        });

        writing.await.unwrap();
        assert_eq!(reader.await.unwrap(), total);
    }

    #[test]
    fn test_only_flush_is_supported() {
        let (mut writer, _head, _body) = response_channel();
        assert!(writer.capabilities().supports(Capability::Flush));
        assert!(writer.hijack().err().unwrap().is_unsupported());
    }

    #[tokio::test]
    async fn test_empty_body_ends_immediately() {
        let body = ChannelBody::empty();
        assert!(body.is_end_stream());
        assert!(body.collect().await.unwrap().to_bytes().is_empty());
    }
}
