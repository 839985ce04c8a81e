//! Test fixtures for Hestia development and testing.
//!
//! This module provides an in-memory [`ResponseWriter`] and request builders
//! that can be used in tests across the Hestia codebase.
//!
//! # Example
//!
//! ```
//! use hestia_core::fixtures::RecordingWriter;
//! use hestia_core::ResponseWriter;
//! use http::StatusCode;
//!
//! let mut writer = RecordingWriter::new();
//! writer.write_header(StatusCode::CREATED);
//! writer.write_all(b"done").unwrap();
//!
//! assert_eq!(writer.status(), Some(StatusCode::CREATED));
//! assert_eq!(writer.body(), b"done");
//! ```

use crate::body::{self, Body};
use crate::error::{ResponseError, ResponseResult};
use crate::handler::Request;
use crate::response::{Capabilities, Capability, PushOptions, ResponseWriter, Upgraded};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::io;

/// A response sink that records everything written to it.
///
/// By default it implements none of the optional capabilities. Use
/// [`with_capability`](Self::with_capability) to enable them and
/// [`fail_writes`](Self::fail_writes) to make every body write fail.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    headers: HeaderMap,
    sent_headers: Option<HeaderMap>,
    status: Option<StatusCode>,
    write_header_calls: usize,
    body: Vec<u8>,
    capabilities: Capabilities,
    flush_count: usize,
    write_failure: Option<io::ErrorKind>,
    max_write: Option<usize>,
    hijacked: bool,
    pushes: Vec<String>,
}

impl RecordingWriter {
    /// Creates a writer with no optional capabilities.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables an optional capability.
    #[must_use]
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities = self.capabilities.with(capability);
        self
    }

    /// Makes every body write fail with the given error kind.
    #[must_use]
    pub fn fail_writes(mut self, kind: io::ErrorKind) -> Self {
        self.write_failure = Some(kind);
        self
    }

    /// Accepts at most `n` bytes per write call.
    #[must_use]
    pub fn short_writes(mut self, n: usize) -> Self {
        self.max_write = Some(n);
        self
    }

    /// Returns the status sent, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Returns the headers as they were when the status was sent.
    #[must_use]
    pub fn sent_headers(&self) -> Option<&HeaderMap> {
        self.sent_headers.as_ref()
    }

    /// Returns how many times `write_header` was called.
    #[must_use]
    pub fn write_header_calls(&self) -> usize {
        self.write_header_calls
    }

    /// Returns the body bytes accepted so far.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns how many times `flush` succeeded.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flush_count
    }

    /// Returns `true` once the connection was hijacked.
    #[must_use]
    pub fn is_hijacked(&self) -> bool {
        self.hijacked
    }

    /// Returns the targets pushed so far.
    #[must_use]
    pub fn pushes(&self) -> &[String] {
        &self.pushes
    }
}

impl ResponseWriter for RecordingWriter {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        self.write_header_calls += 1;
        if self.status.is_none() {
            self.status = Some(status);
            self.sent_headers = Some(self.headers.clone());
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = self.write_failure {
            return Err(io::Error::new(kind, "recorded write failure"));
        }
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        let n = self.max_write.map_or(buf.len(), |max| buf.len().min(max));
        self.body.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn flush(&mut self) -> ResponseResult<()> {
        if !self.capabilities.supports(Capability::Flush) {
            return Err(ResponseError::CapabilityUnsupported(Capability::Flush));
        }
        self.flush_count += 1;
        Ok(())
    }

    fn hijack(&mut self) -> ResponseResult<Upgraded> {
        if !self.capabilities.supports(Capability::Hijack) {
            return Err(ResponseError::CapabilityUnsupported(Capability::Hijack));
        }
        self.hijacked = true;
        let (stream, _peer) = tokio::io::duplex(64);
        Ok(Box::new(stream))
    }

    fn push(&mut self, target: &str, _options: &PushOptions) -> ResponseResult<()> {
        if !self.capabilities.supports(Capability::Push) {
            return Err(ResponseError::CapabilityUnsupported(Capability::Push));
        }
        self.pushes.push(target.to_string());
        Ok(())
    }
}

/// Builds a request with an empty body.
///
/// # Panics
///
/// Panics if `method` or `uri` is invalid.
#[must_use]
pub fn request(method: &str, uri: &str) -> Request {
    request_with_body(method, uri, body::empty())
}

/// Builds a request with the given body.
///
/// # Panics
///
/// Panics if `method` or `uri` is invalid.
#[must_use]
pub fn request_with_body(method: &str, uri: &str, body: Body) -> Request {
    http::Request::builder()
        .method(method)
        .uri(uri)
        .body(body)
        .expect("valid fixture request")
}

/// Builds a request whose body holds `data`.
#[must_use]
pub fn request_with_bytes(method: &str, uri: &str, data: impl Into<Bytes>) -> Request {
    request_with_body(method, uri, body::full(data))
}
