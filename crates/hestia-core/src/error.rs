//! Error types for response sinks.

use crate::response::Capability;
use thiserror::Error;

/// Result type alias using [`ResponseError`].
pub type ResponseResult<T> = Result<T, ResponseError>;

/// Errors raised by optional response capabilities.
#[derive(Error, Debug)]
pub enum ResponseError {
    /// The underlying sink does not implement the requested capability.
    #[error("underlying response writer does not support {0}")]
    CapabilityUnsupported(Capability),

    /// The sink supports connection takeover but it failed.
    #[error("failed to hijack connection: {0}")]
    Hijack(#[source] std::io::Error),

    /// The sink supports server push but it failed.
    #[error("failed to push {target}: {message}")]
    Push {
        /// The pushed target.
        target: String,
        /// Why the push failed.
        message: String,
    },
}

impl ResponseError {
    /// Returns `true` if this error reports a missing capability.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::CapabilityUnsupported(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display() {
        let err = ResponseError::CapabilityUnsupported(Capability::Hijack);
        assert_eq!(
            err.to_string(),
            "underlying response writer does not support hijack"
        );
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_push_error_is_not_unsupported() {
        let err = ResponseError::Push {
            target: "/app.css".to_string(),
            message: "stream closed".to_string(),
        };
        assert!(!err.is_unsupported());
    }
}
