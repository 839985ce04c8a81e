//! Request context types.
//!
//! The [`RequestContext`] carries all per-exchange state through the handler
//! chain. It is passed by `&mut` from the driver through every middleware into
//! the application handler, so values set by one stage (the recovered fault,
//! trace correlation ids) are visible to the stages that run after it.

use crate::fault::Fault;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Instant, SystemTime};
use uuid::Uuid;

/// A 128-bit trace identifier.
///
/// Trace ids are opaque bytes; they are rendered as lowercase hex.
///
/// # Example
///
/// ```
/// use hestia_core::TraceId;
///
/// let id = TraceId::from_hex("0af7651916cd43dd8448eb211c80319c").unwrap();
/// assert_eq!(id.to_string(), "0af7651916cd43dd8448eb211c80319c");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

impl TraceId {
    /// Creates a trace id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generates a new trace id from a UUID v7.
    #[must_use]
    pub fn generate() -> Self {
        Self(*Uuid::now_v7().as_bytes())
    }

    /// Parses a 32 character hex string.
    #[must_use]
    pub fn from_hex(value: &str) -> Option<Self> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(value, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns `true` if every byte is zero, which W3C treats as invalid.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({self})")
    }
}

/// A 64-bit span identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl SpanId {
    /// Creates a span id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Generates a new span id from the random half of a UUID v7.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = Uuid::now_v7();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&uuid.as_bytes()[8..]);
        Self(bytes)
    }

    /// Parses a 16 character hex string.
    #[must_use]
    pub fn from_hex(value: &str) -> Option<Self> {
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(value, &mut bytes).ok()?;
        Some(Self(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({self})")
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str(&hex::encode(bytes))
}

/// Per-exchange context that flows through the handler chain.
///
/// `RequestContext` carries:
/// - When the request was received (wall clock and monotonic)
/// - Remote and local socket addresses, when the driver knows them
/// - Whether the connection is TLS
/// - Trace and span ids, set by the tracing stage
/// - The [`Fault`] recovered from a panicking handler, set by the recovery stage
/// - Typed extensions for anything else
///
/// # Example
///
/// ```
/// use hestia_core::RequestContext;
///
/// let ctx = RequestContext::new();
/// assert!(ctx.fault().is_none());
/// assert!(ctx.trace_id().is_none());
/// ```
pub struct RequestContext {
    /// Wall-clock time the request was received.
    received_at: SystemTime,

    /// Monotonic time the request was received.
    started_at: Instant,

    /// Address of the peer, if known.
    remote_addr: Option<SocketAddr>,

    /// Address of the local socket that accepted the connection.
    local_addr: Option<SocketAddr>,

    /// Whether the exchange arrived over TLS.
    tls: bool,

    /// Trace id of the distributed trace this exchange belongs to.
    trace_id: Option<TraceId>,

    /// Span id of this exchange.
    span_id: Option<SpanId>,

    /// Fault recovered from the handler.
    fault: Option<Fault>,

    /// Type-erased extension data.
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// Creates a new context stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            received_at: SystemTime::now(),
            started_at: Instant::now(),
            remote_addr: None,
            local_addr: None,
            tls: false,
            trace_id: None,
            span_id: None,
            fault: None,
            extensions: HashMap::new(),
        }
    }

    /// Creates a context for a connection with known addresses.
    #[must_use]
    pub fn with_addrs(remote_addr: SocketAddr, local_addr: SocketAddr) -> Self {
        let mut ctx = Self::new();
        ctx.remote_addr = Some(remote_addr);
        ctx.local_addr = Some(local_addr);
        ctx
    }

    /// Returns the wall-clock time the request was received.
    #[must_use]
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// Returns the monotonic instant the request was received.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request was received.
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Returns the peer address.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Sets the peer address.
    pub fn set_remote_addr(&mut self, addr: SocketAddr) {
        self.remote_addr = Some(addr);
    }

    /// Returns the local address that accepted the connection.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Sets the local address.
    pub fn set_local_addr(&mut self, addr: SocketAddr) {
        self.local_addr = Some(addr);
    }

    /// Returns `true` if the exchange arrived over TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// Marks the exchange as arriving over TLS.
    pub fn set_tls(&mut self, tls: bool) {
        self.tls = tls;
    }

    /// Returns the trace id, if set.
    #[must_use]
    pub fn trace_id(&self) -> Option<TraceId> {
        self.trace_id
    }

    /// Sets the trace id.
    ///
    /// This should only be called by the tracing stage.
    pub fn set_trace_id(&mut self, trace_id: TraceId) {
        self.trace_id = Some(trace_id);
    }

    /// Returns the span id, if set.
    #[must_use]
    pub fn span_id(&self) -> Option<SpanId> {
        self.span_id
    }

    /// Sets the span id.
    ///
    /// This should only be called by the tracing stage.
    pub fn set_span_id(&mut self, span_id: SpanId) {
        self.span_id = Some(span_id);
    }

    /// Returns the fault recovered from a panicking handler, if any.
    #[must_use]
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Attaches a recovered fault.
    ///
    /// This should only be called by the recovery stage.
    pub fn set_fault(&mut self, fault: Fault) {
        self.fault = Some(fault);
    }

    /// Stores a typed extension value.
    ///
    /// # Example
    ///
    /// ```
    /// use hestia_core::RequestContext;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct TenantId(u32);
    ///
    /// let mut ctx = RequestContext::new();
    /// ctx.set_extension(TenantId(7));
    /// assert_eq!(ctx.get_extension::<TenantId>(), Some(&TenantId(7)));
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("received_at", &self.received_at)
            .field("remote_addr", &self.remote_addr)
            .field("local_addr", &self.local_addr)
            .field("tls", &self.tls)
            .field("trace_id", &self.trace_id)
            .field("span_id", &self.span_id)
            .field("fault", &self.fault)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}
