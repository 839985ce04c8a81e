//! Request body byte counting.

use bytes::Bytes;
use hestia_core::{Body, BoxError};
use http_body::{Frame, SizeHint};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Counters shared between a [`CountingBody`] and the stage that installed it.
#[derive(Debug, Default)]
pub struct BodyStats {
    bytes: AtomicU64,
    errored: AtomicBool,
    dropped: AtomicBool,
}

impl BodyStats {
    /// Returns the number of data bytes read so far.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Returns `true` if the underlying body produced an error.
    #[must_use]
    pub fn errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }

    /// Returns `true` if the counting body was dropped.
    #[must_use]
    pub fn dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }
}

/// A request body wrapper that counts the data bytes read through it.
///
/// Trailers are not counted. Once the inner body fails, the error is recorded
/// and later polls end the stream.
pub struct CountingBody {
    inner: Body,
    stats: Arc<BodyStats>,
}

impl CountingBody {
    /// Wraps `inner`, reporting into `stats`.
    pub fn new(inner: Body, stats: Arc<BodyStats>) -> Self {
        Self { inner, stats }
    }
}

impl http_body::Body for CountingBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.stats.errored() {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.stats
                        .bytes
                        .fetch_add(data.len() as u64, Ordering::AcqRel);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.stats.errored.store(true, Ordering::Release);
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.stats.errored() || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CountingBody {
    fn drop(&mut self) {
        self.stats.dropped.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use hestia_core::body;
    use http_body_util::{BodyExt, StreamBody};

    #[tokio::test]
    async fn test_counts_data_bytes() {
        let stats = Arc::new(BodyStats::default());
        let mut counting = CountingBody::new(body::full("hello world"), Arc::clone(&stats));

        while let Some(frame) = counting.frame().await {
            frame.unwrap();
        }

        assert_eq!(stats.bytes(), 11);
        assert!(!stats.errored());
        assert!(!stats.dropped());
        drop(counting);
        assert!(stats.dropped());
    }

    #[tokio::test]
    async fn test_records_errors() {
        let chunks: Vec<Result<Frame<Bytes>, BoxError>> = vec![
            Ok(Frame::data(Bytes::from_static(b"abc"))),
            Err("connection reset".into()),
            Ok(Frame::data(Bytes::from_static(b"never"))),
        ];
        let inner = body::boxed(StreamBody::new(stream::iter(chunks)));
        let stats = Arc::new(BodyStats::default());
        let mut counting = CountingBody::new(inner, Arc::clone(&stats));

        assert!(counting.frame().await.unwrap().is_ok());
        assert!(counting.frame().await.unwrap().is_err());
        assert!(counting.frame().await.is_none());

        assert_eq!(stats.bytes(), 3);
        assert!(stats.errored());
    }
}
