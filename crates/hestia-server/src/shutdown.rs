//! Graceful shutdown orchestration.
//!
//! [`Shutdown`] waits for a termination signal, then runs every registered
//! [`ShutdownListener`] concurrently under one deadline.
//!
//! ## Outcome
//!
//! - If the deadline passes first, the result is [`ShutdownError::Timeout`].
//!   Listener tasks that are still running are detached, not aborted; their
//!   [`ShutdownContext`] is cancelled so they can stop cooperatively.
//! - If every listener finishes, the shutdown succeeds when at least one of
//!   them succeeded. Otherwise, including when no listener is registered, the
//!   result is [`ShutdownError::AggregateFailure`].
//!
//! Each failing listener is logged with its name. A panicking listener counts
//! as a failure and never takes the orchestrator down.
//!
//! # Example
//!
//! ```rust,no_run
//! use hestia_server::shutdown::{listener_fn, Shutdown};
//! use std::time::Duration;
//!
//! # async fn run() {
//! let mut shutdown = Shutdown::builder(Duration::from_secs(10))
//!     .listener("cache", listener_fn(|_ctx| async { Ok::<(), hestia_core::BoxError>(()) }))
//!     .build();
//!
//! let outcome = shutdown.wait().await;
//! if let Err(e) = outcome.result() {
//!     eprintln!("shutdown did not exit cleanly: {e}");
//!     std::process::exit(1);
//! }
//! # }
//! ```

use crate::error::ShutdownError;
use crate::signal::{OsSignals, Signal, SignalSource};
use futures_util::future::join_all;
use futures_util::FutureExt;
use hestia_core::{BoxError, BoxFuture};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Deadline and cancellation handed to every shutdown listener.
#[derive(Debug, Clone)]
pub struct ShutdownContext {
    deadline: Instant,
    token: CancellationToken,
}

impl ShutdownContext {
    /// Creates a context with an explicit deadline and token.
    #[must_use]
    pub fn new(deadline: Instant, token: CancellationToken) -> Self {
        Self { deadline, token }
    }

    /// Creates a context whose deadline is `timeout` from now.
    ///
    /// The token is never cancelled unless the caller cancels it through
    /// [`ShutdownContext::cancel`].
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout, CancellationToken::new())
    }

    /// Returns the shutdown deadline.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns the time left before the deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Returns `true` once the shutdown was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the shutdown is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Cancels the shutdown for every holder of this context.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// A subsystem that must be stopped on shutdown.
pub trait ShutdownListener: Send + Sync + 'static {
    /// Stops the subsystem, ideally before `ctx`'s deadline.
    fn on_shutdown(&self, ctx: ShutdownContext) -> BoxFuture<'_, Result<(), BoxError>>;
}

impl<L: ShutdownListener + ?Sized> ShutdownListener for Arc<L> {
    fn on_shutdown(&self, ctx: ShutdownContext) -> BoxFuture<'_, Result<(), BoxError>> {
        (**self).on_shutdown(ctx)
    }
}

/// A [`ShutdownListener`] backed by a closure.
pub struct ListenerFn<F> {
    func: F,
}

impl<F, Fut> ShutdownListener for ListenerFn<F>
where
    F: Fn(ShutdownContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn on_shutdown(&self, ctx: ShutdownContext) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin((self.func)(ctx))
    }
}

impl<F> std::fmt::Debug for ListenerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerFn").finish_non_exhaustive()
    }
}

/// Creates a [`ShutdownListener`] from a closure.
pub fn listener_fn<F, Fut>(func: F) -> ListenerFn<F>
where
    F: Fn(ShutdownContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    ListenerFn { func }
}

/// How one listener finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerReport {
    name: String,
    error: Option<String>,
}

impl ListenerReport {
    /// Returns the listener name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the listener returned `Ok`.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Returns the failure message, if the listener failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// The result of [`Shutdown::wait`].
#[derive(Debug)]
pub struct ShutdownOutcome {
    signal: Option<Signal>,
    result: Result<(), ShutdownError>,
    reports: Vec<ListenerReport>,
}

impl ShutdownOutcome {
    /// Returns the signal that triggered the shutdown.
    ///
    /// `None` only when the signal source itself failed.
    #[must_use]
    pub fn signal(&self) -> Option<Signal> {
        self.signal
    }

    /// Returns the overall result.
    pub fn result(&self) -> Result<(), &ShutdownError> {
        self.result.as_ref().map(|_| ())
    }

    /// Consumes the outcome, returning the overall result.
    pub fn into_result(self) -> Result<(), ShutdownError> {
        self.result
    }

    /// Returns `true` if the shutdown completed successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns the reports of listeners that finished before the outcome was
    /// decided, sorted by name.
    #[must_use]
    pub fn reports(&self) -> &[ListenerReport] {
        &self.reports
    }
}

/// Waits for a termination signal and stops every registered listener.
pub struct Shutdown {
    timeout: Duration,
    listeners: HashMap<String, Arc<dyn ShutdownListener>>,
    signals: Box<dyn SignalSource>,
}

impl Shutdown {
    /// Creates an orchestrator listening for OS signals.
    #[must_use]
    pub fn new(timeout: Duration, listeners: HashMap<String, Arc<dyn ShutdownListener>>) -> Self {
        Self {
            timeout,
            listeners,
            signals: Box::new(OsSignals),
        }
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder(timeout: Duration) -> ShutdownBuilder {
        ShutdownBuilder {
            timeout,
            listeners: HashMap::new(),
            signals: None,
        }
    }

    /// Replaces the signal source.
    #[must_use]
    pub fn with_signal_source<S: SignalSource>(mut self, source: S) -> Self {
        self.signals = Box::new(source);
        self
    }

    /// Returns the shutdown timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the registered listener names, sorted.
    #[must_use]
    pub fn listener_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.listeners.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Blocks until a termination signal arrives, then shuts every listener
    /// down.
    pub async fn wait(&mut self) -> ShutdownOutcome {
        let signal = self.next_signal().await;
        self.complete(signal).await
    }

    /// Waits for the next termination signal without stopping anything.
    ///
    /// Cancel safe for [`ChannelSignals`](crate::signal::ChannelSignals) and
    /// [`OsSignals`]. Pass the result to [`complete`](Self::complete).
    pub async fn next_signal(&mut self) -> io::Result<Signal> {
        self.signals.next_signal().await
    }

    /// Shuts every listener down in response to `signal`.
    ///
    /// A signal error is reported as [`ShutdownError::Signal`] and no listener
    /// runs.
    pub async fn complete(&self, signal: io::Result<Signal>) -> ShutdownOutcome {
        let signal = match signal {
            Ok(signal) => signal,
            Err(e) => {
                return ShutdownOutcome {
                    signal: None,
                    result: Err(ShutdownError::Signal(e)),
                    reports: Vec::new(),
                }
            }
        };
        tracing::debug!(signal = %signal, "Received signal {}, shutting down", signal);

        let (result, reports) = self.run_listeners().await;
        ShutdownOutcome {
            signal: Some(signal),
            result,
            reports,
        }
    }

    /// Runs every listener now, without waiting for a signal.
    pub async fn run_listeners(&self) -> (Result<(), ShutdownError>, Vec<ListenerReport>) {
        let ctx = ShutdownContext::with_timeout(self.timeout);
        let reports = Arc::new(Mutex::new(Vec::with_capacity(self.listeners.len())));

        let tasks: Vec<_> = self
            .listeners
            .iter()
            .map(|(name, listener)| {
                tokio::spawn(run_listener(
                    name.clone(),
                    Arc::clone(listener),
                    ctx.clone(),
                    Arc::clone(&reports),
                ))
            })
            .collect();

        let finished = tokio::time::timeout_at(ctx.deadline(), join_all(tasks)).await;
        let mut reports = reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        reports.sort_by(|a, b| a.name.cmp(&b.name));

        let result = match finished {
            Err(elapsed) => {
                ctx.cancel();
                Err(ShutdownError::Timeout {
                    timeout: self.timeout,
                    source: elapsed,
                })
            }
            Ok(_) if reports.iter().any(ListenerReport::succeeded) => Ok(()),
            Ok(_) => Err(ShutdownError::AggregateFailure),
        };
        (result, reports)
    }
}

impl std::fmt::Debug for Shutdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutdown")
            .field("timeout", &self.timeout)
            .field("listeners", &self.listener_names())
            .finish_non_exhaustive()
    }
}

async fn run_listener(
    name: String,
    listener: Arc<dyn ShutdownListener>,
    ctx: ShutdownContext,
    reports: Arc<Mutex<Vec<ListenerReport>>>,
) {
    tracing::debug!(listener = %name, "Running shutdown listener");

    let outcome = AssertUnwindSafe(listener.on_shutdown(ctx))
        .catch_unwind()
        .await;
    let error = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(_) => Some("shutdown listener panicked".to_string()),
    };
    if let Some(error) = &error {
        tracing::error!(listener = %name, error = %error, "Shutdown listener returned an error");
    }

    reports
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(ListenerReport { name, error });
}

/// Builder for [`Shutdown`].
pub struct ShutdownBuilder {
    timeout: Duration,
    listeners: HashMap<String, Arc<dyn ShutdownListener>>,
    signals: Option<Box<dyn SignalSource>>,
}

impl ShutdownBuilder {
    /// Registers a listener. A listener registered under the same name
    /// replaces the earlier one.
    #[must_use]
    pub fn listener<L: ShutdownListener>(mut self, name: impl Into<String>, listener: L) -> Self {
        self.listeners.insert(name.into(), Arc::new(listener));
        self
    }

    /// Replaces the signal source.
    #[must_use]
    pub fn signal_source<S: SignalSource>(mut self, source: S) -> Self {
        self.signals = Some(Box::new(source));
        self
    }

    /// Builds the orchestrator.
    #[must_use]
    pub fn build(self) -> Shutdown {
        Shutdown {
            timeout: self.timeout,
            listeners: self.listeners,
            signals: self.signals.unwrap_or_else(|| Box::new(OsSignals)),
        }
    }
}

impl std::fmt::Debug for ShutdownBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownBuilder")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
