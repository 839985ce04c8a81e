//! Recovered handler faults.
//!
//! A handler that panics does not take the serving task down with it: the
//! recovery stage catches the unwind, normalizes the payload into a [`Fault`]
//! and stores it on the [`RequestContext`](crate::RequestContext) before
//! handing control to a fault handler.
//!
//! # Payload classification
//!
//! | Payload                                   | Result                          |
//! |-------------------------------------------|---------------------------------|
//! | [`AbortHandler`]                          | swallowed, no fault is produced |
//! | `&'static str` / `String`                 | [`FaultError::Message`]         |
//! | `Box<dyn Error + Send + Sync>`            | passed through unchanged        |
//! | anything else                             | [`FaultError::Unknown`]         |

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Once};
use thiserror::Error;

use crate::body::BoxError;

/// Sentinel panic payload that aborts the current exchange silently.
///
/// Panicking with this value (see [`abort_handler`]) tells the recovery stage
/// that the connection was abandoned on purpose: nothing is logged and the
/// fault handler is not invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortHandler;

impl fmt::Display for AbortHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("handler aborted")
    }
}

/// Aborts the current exchange without logging.
///
/// # Example
///
/// ```should_panic
/// hestia_core::abort_handler();
/// ```
pub fn abort_handler() -> ! {
    std::panic::panic_any(AbortHandler)
}

/// Errors created from panic payloads that were not already errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FaultError {
    /// The handler panicked with a string message.
    #[error("{0}")]
    Message(String),

    /// The handler panicked with some other payload. Primitive values are
    /// rendered, anything else is described generically.
    #[error("unknown panic: {0}")]
    Unknown(String),
}

/// Source location of a panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultLocation {
    /// Source file.
    pub file: String,
    /// Line number.
    pub line: u32,
    /// Column number.
    pub column: u32,
}

macro_rules! render_primitive {
    ($payload:expr, $($ty:ty),+ $(,)?) => {
        $(
            if let Some(value) = $payload.downcast_ref::<$ty>() {
                return value.to_string();
            }
        )+
    };
}

fn describe_payload(payload: &(dyn Any + Send)) -> String {
    render_primitive!(payload, i32, i64, u32, u64, usize, isize, f64, bool, char);
    "non-string panic payload".to_string()
}

impl fmt::Display for FaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A failure recovered from a panicking handler.
///
/// Cloning a `Fault` is cheap; the error is shared.
///
/// # Example
///
/// ```
/// use hestia_core::Fault;
///
/// let fault = Fault::from_panic(Box::new("boom")).unwrap();
/// assert_eq!(fault.to_string(), "boom");
/// ```
#[derive(Clone)]
pub struct Fault {
    error: Arc<dyn std::error::Error + Send + Sync>,
    location: Option<FaultLocation>,
}

impl Fault {
    /// Creates a fault from an error.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self {
            error: Arc::from(error.into()),
            location: None,
        }
    }

    /// Normalizes a panic payload.
    ///
    /// Returns `None` for the [`AbortHandler`] sentinel.
    #[must_use]
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Option<Self> {
        if payload.is::<AbortHandler>() {
            return None;
        }

        let payload = match payload.downcast::<&'static str>() {
            Ok(message) => return Some(Self::new(FaultError::Message((*message).to_string()))),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<String>() {
            Ok(message) => return Some(Self::new(FaultError::Message(*message))),
            Err(payload) => payload,
        };
        let payload = match payload.downcast::<BoxError>() {
            Ok(error) => return Some(Self::new(*error)),
            Err(payload) => payload,
        };

        Some(Self::new(FaultError::Unknown(describe_payload(&*payload))))
    }

    /// Attaches the source location of the panic.
    #[must_use]
    pub fn with_location(mut self, location: Option<FaultLocation>) -> Self {
        self.location = location;
        self
    }

    /// Returns the normalized error.
    #[must_use]
    pub fn error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.error.as_ref()
    }

    /// Returns the source location of the panic, when it was captured.
    #[must_use]
    pub fn location(&self) -> Option<&FaultLocation> {
        self.location.as_ref()
    }

    /// Attempts to downcast the error to a concrete type.
    #[must_use]
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref::<E>()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fault")
            .field("error", &self.error.to_string())
            .field("location", &self.location)
            .finish()
    }
}

thread_local! {
    static LAST_PANIC_LOCATION: RefCell<Option<FaultLocation>> = const { RefCell::new(None) };
}

static LOCATION_HOOK: Once = Once::new();

/// Installs a panic hook that remembers where the last panic on each thread
/// happened, then delegates to the previously installed hook.
///
/// Installing is idempotent. The recovery stage calls this when it is
/// constructed.
pub fn install_location_hook() {
    LOCATION_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                let captured = FaultLocation {
                    file: location.file().to_string(),
                    line: location.line(),
                    column: location.column(),
                };
                LAST_PANIC_LOCATION.with(|slot| *slot.borrow_mut() = Some(captured));
            }
            previous(info);
        }));
    });
}

/// Takes the location recorded for the most recent panic on this thread.
#[must_use]
pub fn take_panic_location() -> Option<FaultLocation> {
    LAST_PANIC_LOCATION.with(|slot| slot.borrow_mut().take())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_str_payload() {
        let fault = Fault::from_panic(Box::new("boom")).unwrap();
        assert_eq!(fault.to_string(), "boom");
        assert_eq!(
            fault.downcast_ref::<FaultError>(),
            Some(&FaultError::Message("boom".to_string()))
        );
    }

    #[test]
    fn test_string_payload() {
        let fault = Fault::from_panic(Box::new(String::from("bad state"))).unwrap();
        assert_eq!(fault.to_string(), "bad state");
    }

    #[test]
    fn test_error_payload_passes_through() {
        let error: BoxError = Box::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        ));
        let fault = Fault::from_panic(Box::new(error)).unwrap();
        assert_eq!(fault.to_string(), "disk on fire");
        assert!(fault.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_unknown_payload() {
        let fault = Fault::from_panic(Box::new(42_u64)).unwrap();
        assert_eq!(fault.to_string(), "unknown panic: 42");
        assert!(matches!(
            fault.downcast_ref::<FaultError>(),
            Some(FaultError::Unknown(_))
        ));
    }

    #[test]
    fn test_opaque_payload_is_described() {
        struct Opaque;

        let fault = Fault::from_panic(Box::new(Opaque)).unwrap();

        assert_eq!(
            fault.to_string(),
            "unknown panic: non-string panic payload"
        );
        assert!(!fault.to_string().contains("Any"));
    }

    #[test]
    fn test_abort_payload_is_swallowed() {
        assert!(Fault::from_panic(Box::new(AbortHandler)).is_none());
    }

    #[test]
    fn test_location_hook_records_panic_site() {
        install_location_hook();
        let result = std::panic::catch_unwind(|| panic!("located"));
        assert!(result.is_err());
        let location = take_panic_location().unwrap();
        assert!(location.file.ends_with("fault.rs"));
        assert!(take_panic_location().is_none());
    }
}
