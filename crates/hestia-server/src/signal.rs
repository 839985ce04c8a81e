//! Termination signals.
//!
//! The shutdown orchestrator reads signals from a [`SignalSource`]. In
//! production that is [`OsSignals`]; tests inject a [`ChannelSignals`] and
//! deliver signals through its [`SignalSender`].

use hestia_core::BoxFuture;
use std::fmt;
use std::io;
use tokio::sync::mpsc;

/// A signal that starts a graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT, or Ctrl+C.
    Interrupt,
    /// SIGTERM.
    Terminate,
    /// SIGHUP.
    Hangup,
}

impl Signal {
    /// Returns the conventional description of the signal.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interrupt => "interrupt",
            Self::Terminate => "terminated",
            Self::Hangup => "hangup",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that delivers termination signals.
pub trait SignalSource: Send + Sync + 'static {
    /// Waits for the next signal.
    fn next_signal(&mut self) -> BoxFuture<'_, io::Result<Signal>>;
}

/// Receives interrupt, terminate and hangup from the operating system.
///
/// Handlers are registered on each call to
/// [`next_signal`](SignalSource::next_signal), which must run inside a Tokio
/// runtime. Outside Unix only Ctrl+C is observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSignals;

impl SignalSource for OsSignals {
    fn next_signal(&mut self) -> BoxFuture<'_, io::Result<Signal>> {
        Box::pin(wait_for_os_signal())
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() -> io::Result<Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = interrupt.recv() => Ok(Signal::Interrupt),
        _ = terminate.recv() => Ok(Signal::Terminate),
        _ = hangup.recv() => Ok(Signal::Hangup),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() -> io::Result<Signal> {
    tokio::signal::ctrl_c().await?;
    Ok(Signal::Interrupt)
}

/// Creates an in-process signal channel.
///
/// # Example
///
/// ```rust
/// use hestia_server::signal::{self, Signal, SignalSource};
///
/// # tokio_test::block_on(async {
/// let (sender, mut source) = signal::channel();
/// sender.send(Signal::Terminate);
/// assert_eq!(source.next_signal().await.unwrap(), Signal::Terminate);
/// # });
/// ```
#[must_use]
pub fn channel() -> (SignalSender, ChannelSignals) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SignalSender { tx }, ChannelSignals { rx })
}

/// Sending half of [`channel`].
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::UnboundedSender<Signal>,
}

impl SignalSender {
    /// Delivers `signal`. Returns `false` if the source is gone.
    pub fn send(&self, signal: Signal) -> bool {
        self.tx.send(signal).is_ok()
    }
}

/// Receiving half of [`channel`].
#[derive(Debug)]
pub struct ChannelSignals {
    rx: mpsc::UnboundedReceiver<Signal>,
}

impl SignalSource for ChannelSignals {
    fn next_signal(&mut self) -> BoxFuture<'_, io::Result<Signal>> {
        Box::pin(async move {
            self.rx.recv().await.ok_or_else(|| {
                io::Error::new(io::ErrorKind::BrokenPipe, "every signal sender was dropped")
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(Signal::Interrupt.to_string(), "interrupt");
        assert_eq!(Signal::Terminate.to_string(), "terminated");
        assert_eq!(Signal::Hangup.to_string(), "hangup");
    }

    #[tokio::test]
    async fn test_channel_delivers_in_order() {
        let (sender, mut source) = channel();
        assert!(sender.send(Signal::Hangup));
        assert!(sender.send(Signal::Interrupt));

        assert_eq!(source.next_signal().await.unwrap(), Signal::Hangup);
        assert_eq!(source.next_signal().await.unwrap(), Signal::Interrupt);
    }

    #[tokio::test]
    async fn test_channel_closed_is_an_error() {
        let (sender, mut source) = channel();
        drop(sender);

        let err = source.next_signal().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
