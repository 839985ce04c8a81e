//! Write-error logging middleware.
//!
//! Wraps the response sink so that a failing body write is reported to a
//! callback. The write result itself is returned to the handler unchanged.

use crate::error::WriteError;
use crate::middleware::{Middleware, Next};
use hestia_core::{
    BoxFuture, Capabilities, Capability, PushOptions, Request, RequestContext, ResponseResult,
    ResponseWriter, Upgraded,
};
use http::{HeaderMap, StatusCode};
use std::io;
use std::sync::Arc;

/// Callback invoked when a body write fails.
pub type OnWriteError = Arc<dyn Fn(&WriteError) + Send + Sync>;

/// Middleware that reports response write failures.
///
/// # Example
///
/// ```
/// use hestia_middleware::stages::WriteErrorMiddleware;
///
/// let stage = WriteErrorMiddleware::with_callback(|err| {
///     tracing::warn!(error = %err, kind = ?err.kind(), "Client went away");
/// });
/// # let _ = stage;
/// ```
#[derive(Clone)]
pub struct WriteErrorMiddleware {
    on_error: OnWriteError,
}

impl WriteErrorMiddleware {
    /// Creates a stage that logs write failures at error level.
    #[must_use]
    pub fn new() -> Self {
        Self::with_callback(|err| {
            tracing::error!(error = %err, "Error when writing response");
        })
    }

    /// Creates a stage that reports write failures to `on_error`.
    #[must_use]
    pub fn with_callback<F>(on_error: F) -> Self
    where
        F: Fn(&WriteError) + Send + Sync + 'static,
    {
        Self {
            on_error: Arc::new(on_error),
        }
    }
}

impl Default for WriteErrorMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WriteErrorMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteErrorMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for WriteErrorMiddleware {
    fn name(&self) -> &'static str {
        "write_error"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: &'a mut Request,
        response: &'a mut dyn ResponseWriter,
        next: Next<'a>,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut observed = WriteErrorResponse {
                inner: response,
                on_error: &self.on_error,
            };
            next.run(ctx, request, &mut observed).await;
        })
    }
}

/// Response sink wrapper used by [`WriteErrorMiddleware`].
struct WriteErrorResponse<'w> {
    inner: &'w mut dyn ResponseWriter,
    on_error: &'w OnWriteError,
}

impl ResponseWriter for WriteErrorResponse<'_> {
    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        self.inner.write_header(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        if let Err(e) = &result {
            (self.on_error)(&WriteError::mirror(e));
        }
        result
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn flush(&mut self) -> ResponseResult<()> {
        if self.inner.capabilities().supports(Capability::Flush) {
            return self.inner.flush();
        }
        tracing::warn!("Underlying response writer does not support flush but flush was called");
        Ok(())
    }

    fn hijack(&mut self) -> ResponseResult<Upgraded> {
        self.inner.hijack()
    }

    fn push(&mut self, target: &str, options: &PushOptions) -> ResponseResult<()> {
        self.inner.push(target, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hestia_core::fixtures::{request, RecordingWriter};
    use hestia_core::{handler_fn, Handler};
    use std::sync::Mutex;

    async fn run(
        stage: &WriteErrorMiddleware,
        handler: &dyn Handler,
        writer: &mut RecordingWriter,
    ) {
        let mut ctx = RequestContext::new();
        let mut req = request("GET", "/");
        stage
            .process(&mut ctx, &mut req, writer, Next::handler(handler))
            .await;
    }

    #[tokio::test]
    async fn test_write_error_is_reported_and_returned() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let stage = WriteErrorMiddleware::with_callback(move |err| {
            sink.lock().unwrap().push(err.to_string());
        });
        let returned = Arc::new(Mutex::new(None));
        let returned_by_handler = Arc::clone(&returned);
        let handler = handler_fn(move |_ctx, _req, res| {
            let kind = res.write(b"data").err().map(|e| e.kind());
            *returned_by_handler.lock().unwrap() = kind;
            Box::pin(async {})
        });

        let mut writer = RecordingWriter::new().fail_writes(io::ErrorKind::BrokenPipe);
        run(&stage, &handler, &mut writer).await;

        assert_eq!(*returned.lock().unwrap(), Some(io::ErrorKind::BrokenPipe));
        assert_eq!(
            *reports.lock().unwrap(),
            vec!["error when writing response: recorded write failure".to_string()]
        );
    }

    #[tokio::test]
    async fn test_successful_writes_are_silent() {
        let reports = Arc::new(Mutex::new(0_usize));
        let sink = Arc::clone(&reports);
        let stage = WriteErrorMiddleware::with_callback(move |_| {
            *sink.lock().unwrap() += 1;
        });
        let handler = handler_fn(|_ctx, _req, res| {
            Box::pin(async move {
                res.write_all(b"fine").unwrap();
            })
        });

        let mut writer = RecordingWriter::new();
        run(&stage, &handler, &mut writer).await;

        assert_eq!(*reports.lock().unwrap(), 0);
        assert_eq!(writer.body(), b"fine");
    }

    #[tokio::test]
    async fn test_capabilities_are_forwarded() {
        let stage = WriteErrorMiddleware::new();
        let handler = handler_fn(|_ctx, _req, res| {
            Box::pin(async move {
                assert!(res.capabilities().supports(Capability::Flush));
                res.flush().unwrap();
                assert!(res.hijack().err().unwrap().is_unsupported());
            })
        });

        let mut writer = RecordingWriter::new().with_capability(Capability::Flush);
        run(&stage, &handler, &mut writer).await;

        assert_eq!(writer.flush_count(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_flush_is_noop() {
        let stage = WriteErrorMiddleware::new();
        let handler = handler_fn(|_ctx, _req, res| {
            Box::pin(async move {
                assert!(res.flush().is_ok());
            })
        });

        let mut writer = RecordingWriter::new();
        run(&stage, &handler, &mut writer).await;

        assert_eq!(writer.flush_count(), 0);
    }
}
