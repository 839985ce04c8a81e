//! Response instrumentation.
//!
//! [`InstrumentedResponse`] wraps the response sink of one exchange and
//! records what went over the wire: the status, the size of the headers at the
//! moment they were sent, and the number of body bytes the sink accepted.

use hestia_core::{
    header_size, Capabilities, Capability, PushOptions, ResponseResult, ResponseWriter, Upgraded,
};
use http::{HeaderMap, StatusCode};
use std::io;

/// A response sink wrapper that captures status and byte counts.
///
/// # Behavior
///
/// - Only the first `write_header` call is forwarded; it fixes the status and
///   the header size. Later calls are ignored.
/// - A body write without a prior status implies `200 OK`.
/// - After a successful hijack, byte counting stops.
/// - Optional capabilities are forwarded when the wrapped sink declares them.
///   An unsupported flush is a logged no-op; unsupported hijack and push fail
///   with [`ResponseError::CapabilityUnsupported`](hestia_core::ResponseError).
///
/// # Example
///
/// ```
/// use hestia_core::fixtures::RecordingWriter;
/// use hestia_core::ResponseWriter;
/// use hestia_middleware::InstrumentedResponse;
/// use http::StatusCode;
///
/// let mut sink = RecordingWriter::new();
/// let mut response = InstrumentedResponse::new(&mut sink);
/// response.write_all(b"hello").unwrap();
///
/// assert_eq!(response.status(), Some(StatusCode::OK));
/// assert_eq!(response.body_size(), 5);
/// ```
pub struct InstrumentedResponse<'w> {
    inner: &'w mut dyn ResponseWriter,
    status: Option<StatusCode>,
    header_size: u64,
    body_size: u64,
    hijacked: bool,
}

impl<'w> InstrumentedResponse<'w> {
    /// Wraps a response sink.
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: None,
            header_size: 0,
            body_size: 0,
            hijacked: false,
        }
    }

    /// Returns the status sent, or `None` if nothing was sent yet.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the header size captured when the status was sent.
    #[must_use]
    pub fn header_size(&self) -> u64 {
        self.header_size
    }

    /// Returns the number of body bytes accepted by the wrapped sink.
    #[must_use]
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// Returns `true` once the connection was taken over.
    #[must_use]
    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    /// Returns `(header size, body size)` for the log entry.
    ///
    /// If no status was ever sent, the current headers are measured and the
    /// body size is zero.
    #[must_use]
    pub fn sizes(&self) -> (u64, u64) {
        if self.status.is_none() {
            return (header_size(self.inner.headers()), 0);
        }
        (self.header_size, self.body_size)
    }
}

impl ResponseWriter for InstrumentedResponse<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.header_size = header_size(self.inner.headers());
        self.inner.write_header(status);
        self.status = Some(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        let n = self.inner.write(buf)?;
        if !self.hijacked {
            self.body_size += n as u64;
        }
        Ok(n)
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn flush(&mut self) -> ResponseResult<()> {
        if self.inner.capabilities().supports(Capability::Flush) {
            return self.inner.flush();
        }
        tracing::debug!("Underlying response writer does not support flush, ignoring");
        Ok(())
    }

    fn hijack(&mut self) -> ResponseResult<Upgraded> {
        let upgraded = self.inner.hijack()?;
        self.hijacked = true;
        Ok(upgraded)
    }

    fn push(&mut self, target: &str, options: &PushOptions) -> ResponseResult<()> {
        self.inner.push(target, options)
    }
}

impl std::fmt::Debug for InstrumentedResponse<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedResponse")
            .field("status", &self.status)
            .field("header_size", &self.header_size)
            .field("body_size", &self.body_size)
            .field("hijacked", &self.hijacked)
            .finish_non_exhaustive()
    }
}
