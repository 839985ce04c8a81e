//! The response sink abstraction.
//!
//! A [`ResponseWriter`] is the channel a handler writes its response to. The
//! status line and headers are sent exactly once, on the first call to
//! [`ResponseWriter::write_header`] or implicitly on the first body write.
//!
//! # Capabilities
//!
//! Some sinks support optional behaviour: flushing buffered output, handing the
//! raw connection over to the handler, or HTTP/2 server push. A sink declares
//! what it supports through [`ResponseWriter::capabilities`]; callers query
//! that set before invoking the capability instead of attempting and failing.
//! Wrappers forward both the declaration and the calls to the sink they wrap.
//!
//! ```
//! use hestia_core::{Capability, ResponseWriter};
//! use hestia_core::fixtures::RecordingWriter;
//!
//! let mut writer = RecordingWriter::new().with_capability(Capability::Flush);
//! if writer.capabilities().supports(Capability::Flush) {
//!     writer.flush().unwrap();
//! }
//! assert_eq!(writer.flush_count(), 1);
//! ```

use crate::error::{ResponseError, ResponseResult};
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite};

/// An optional behaviour a response sink may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Sending buffered data to the client immediately.
    Flush,
    /// Taking over the underlying connection.
    Hijack,
    /// HTTP/2 server push.
    Push,
}

impl Capability {
    const fn bit(self) -> u8 {
        match self {
            Self::Flush => 0b001,
            Self::Hijack => 0b010,
            Self::Push => 0b100,
        }
    }

    /// Returns the lowercase name of this capability.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Flush => "flush",
            Self::Hijack => "hijack",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The set of optional capabilities a sink implements.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No optional capabilities.
    pub const NONE: Self = Self(0);

    /// Every optional capability.
    pub const ALL: Self = Self(0b111);

    /// Returns this set with `capability` added.
    #[must_use]
    pub const fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Returns this set with `capability` removed.
    #[must_use]
    pub const fn without(self, capability: Capability) -> Self {
        Self(self.0 & !capability.bit())
    }

    /// Returns `true` if `capability` is in the set.
    #[must_use]
    pub const fn supports(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        for capability in [Capability::Flush, Capability::Hijack, Capability::Push] {
            if self.supports(capability) {
                set.entry(&capability);
            }
        }
        set.finish()
    }
}

/// Options for an HTTP/2 server push.
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Method of the promised request. `GET` when unset.
    pub method: Option<Method>,
    /// Additional headers of the promised request.
    pub headers: HeaderMap,
}

/// A connection taken over from the HTTP server.
pub trait HijackedConnection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> HijackedConnection for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// The raw connection handed to a handler by [`ResponseWriter::hijack`].
pub type Upgraded = Box<dyn HijackedConnection>;

/// The response sink of one exchange.
///
/// Only `headers`, `headers_mut`, `write_header` and `write` are required.
/// The optional capabilities default to "unsupported": `capabilities` returns
/// [`Capabilities::NONE`] and `flush`, `hijack` and `push` fail with
/// [`ResponseError::CapabilityUnsupported`].
pub trait ResponseWriter: Send {
    /// Returns the response headers.
    fn headers(&self) -> &HeaderMap;

    /// Returns the response headers for modification.
    ///
    /// Changes made after the headers were sent have no effect on the wire.
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sends the status line and headers.
    fn write_header(&mut self, status: StatusCode);

    /// Writes part of the response body, returning the number of bytes
    /// accepted.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Writes the whole buffer, retrying until every byte is accepted.
    fn write_all(&mut self, mut buf: &[u8]) -> std::io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf)? {
                0 => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "failed to write whole response body",
                    ))
                }
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }

    /// Returns the optional capabilities this sink implements.
    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Sends any buffered data to the client.
    fn flush(&mut self) -> ResponseResult<()> {
        Err(ResponseError::CapabilityUnsupported(Capability::Flush))
    }

    /// Takes over the underlying connection.
    ///
    /// After a successful hijack the server no longer owns the stream and
    /// nothing more may be written through this sink.
    fn hijack(&mut self) -> ResponseResult<Upgraded> {
        Err(ResponseError::CapabilityUnsupported(Capability::Hijack))
    }

    /// Initiates an HTTP/2 server push for `target`.
    fn push(&mut self, _target: &str, _options: &PushOptions) -> ResponseResult<()> {
        Err(ResponseError::CapabilityUnsupported(Capability::Push))
    }
}

/// Returns the number of bytes `headers` occupy on the wire.
///
/// Each value is counted as `name: value\r\n`; the terminating blank line adds
/// two more bytes.
///
/// # Example
///
/// ```
/// use hestia_core::header_size;
/// use http::HeaderMap;
///
/// let mut headers = HeaderMap::new();
/// headers.insert("x-a", "1".parse().unwrap());
/// // "x-a: 1\r\n" + "\r\n"
/// assert_eq!(header_size(&headers), 10);
/// ```
#[must_use]
pub fn header_size(headers: &HeaderMap) -> u64 {
    let lines: usize = headers
        .iter()
        .map(|(name, value)| name.as_str().len() + 2 + value.len() + 2)
        .sum();
    lines as u64 + 2
}
