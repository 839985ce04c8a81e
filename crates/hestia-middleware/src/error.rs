//! Error types for middleware stages.

use thiserror::Error;

/// A failure while writing a response body.
///
/// Reported to the write-error callback of
/// [`WriteErrorMiddleware`](crate::stages::WriteErrorMiddleware); the caller of
/// `write` still receives the original error.
#[derive(Error, Debug)]
#[error("error when writing response: {source}")]
pub struct WriteError {
    /// The underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

impl WriteError {
    /// Creates a report mirroring `err`.
    #[must_use]
    pub fn mirror(err: &std::io::Error) -> Self {
        Self {
            source: std::io::Error::new(err.kind(), err.to_string()),
        }
    }

    /// Returns the kind of the underlying error.
    #[must_use]
    pub fn kind(&self) -> std::io::ErrorKind {
        self.source.kind()
    }
}
