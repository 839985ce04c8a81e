//! Request body type and helpers.
//!
//! Every request flowing through the runtime carries a type-erased [`Body`],
//! so middleware can wrap it (for example to count the bytes a client sent)
//! without knowing which transport produced it.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};

/// A boxed error type used for body and listener failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The request body type used in the handler chain.
pub type Body = http_body_util::combinators::UnsyncBoxBody<Bytes, BoxError>;

/// Returns an empty body.
#[must_use]
pub fn empty() -> Body {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Returns a body containing the given bytes.
///
/// # Example
///
/// ```
/// use hestia_core::body;
///
/// let body = body::full("hello");
/// # let _ = body;
/// ```
#[must_use]
pub fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Converts any compatible `http_body::Body` into a [`Body`].
pub fn boxed<B>(body: B) -> Body
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Replaces the body of a request with an empty one and returns the original.
pub fn take(request: &mut http::Request<Body>) -> Body {
    std::mem::replace(request.body_mut(), empty())
}

/// Reads the whole body into memory.
///
/// # Errors
///
/// Returns the first error produced by the underlying body.
pub async fn read_to_bytes(body: &mut Body) -> Result<Bytes, BoxError> {
    let collected = body.collect().await?;
    Ok(collected.to_bytes())
}
