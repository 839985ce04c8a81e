//! Request log entries and the loggers that emit them.
//!
//! One [`Entry`] is produced per completed exchange by the
//! [`RequestLogMiddleware`](crate::stages::RequestLogMiddleware) and handed to
//! a [`RequestLogger`]. The logger must not hold on to the entry after `log`
//! returns.
//!
//! [`TracingRequestLogger`] is the default logger. It emits one `info` event
//! per exchange with the message
//!
//! ```text
//! {status} {method} {scheme}://{host}{request uri} {protocol}
//! ```
//!
//! and the structured fields `status`, `elapsed_ms` and `http`, where `http`
//! is a JSON document describing the request and response. Sensitive headers
//! are replaced by [`REDACTED`] in that document.

use chrono::{DateTime, Utc};
use hestia_core::{header_size, RequestContext, SpanId, TraceId};
use http::header::{HeaderName, HOST, REFERER, USER_AGENT};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, Version};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

/// Marker that replaces the value of a redacted header.
pub const REDACTED: &str = "**REDACTED**";

/// Headers redacted when no explicit list is configured.
pub const DEFAULT_REDACTED_HEADERS: [&str; 2] = ["Authorization", "Cookie"];

/// Separator used when a header or query parameter has several values.
const VALUE_SEPARATOR: &str = "; ";

/// Request metadata captured before the handler runs.
///
/// The body is never part of the snapshot.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Request method.
    pub method: Method,
    /// Request target as received.
    pub uri: Uri,
    /// Protocol version.
    pub version: Version,
    /// Request headers.
    pub headers: HeaderMap,
    /// Peer address, if known.
    pub remote_addr: Option<SocketAddr>,
    /// Local address that accepted the connection, if known.
    pub local_addr: Option<SocketAddr>,
    /// Whether the exchange arrived over TLS.
    pub tls: bool,
}

impl RequestMeta {
    /// Snapshots a request and its context.
    pub fn capture<B>(request: &http::Request<B>, ctx: &RequestContext) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            version: request.version(),
            headers: request.headers().clone(),
            remote_addr: ctx.remote_addr(),
            local_addr: ctx.local_addr(),
            tls: ctx.is_tls(),
        }
    }

    /// Returns `https` for TLS exchanges and `http` otherwise.
    #[must_use]
    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "https"
        } else {
            "http"
        }
    }

    /// Returns the host the request was addressed to.
    ///
    /// The authority of an absolute URI wins over the `Host` header.
    #[must_use]
    pub fn host(&self) -> String {
        if let Some(authority) = self.uri.authority() {
            return authority.to_string();
        }
        self.headers
            .get(HOST)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    /// Returns the path and query of the request.
    #[must_use]
    pub fn request_uri(&self) -> String {
        self.uri
            .path_and_query()
            .map_or_else(|| "/".to_string(), ToString::to_string)
    }

    /// Returns the protocol version as written on the request line.
    #[must_use]
    pub fn proto(&self) -> String {
        format!("{:?}", self.version)
    }

    fn header_str(&self, name: &HeaderName) -> String {
        self.headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    }
}

/// Information about one completed exchange.
#[derive(Clone)]
#[allow(deprecated)]
pub struct Entry {
    /// The request, without its body.
    pub request: RequestMeta,

    /// When the request was received.
    pub received_time: DateTime<Utc>,

    /// Number of body bytes the client sent.
    pub request_body_size: u64,

    /// Response status; `200` if the handler never set one.
    pub status: StatusCode,

    /// Size of the response headers when they were sent.
    pub response_header_size: u64,

    /// Number of response body bytes written.
    pub response_body_size: u64,

    /// Time between receiving the request and completing the response.
    pub latency: Duration,

    /// Trace id of the exchange, if any.
    pub trace_id: Option<TraceId>,

    /// Span id of the exchange, if any.
    pub span_id: Option<SpanId>,

    /// The `Referer` header.
    #[deprecated(note = "read the `Referer` header from `request.headers`")]
    pub referer: String,

    /// The protocol version.
    #[deprecated(note = "use `request.proto()`")]
    pub proto: String,

    /// The request method.
    #[deprecated(note = "use `request.method`")]
    pub request_method: String,

    /// The request target.
    #[deprecated(note = "use `request.uri`")]
    pub request_url: String,

    /// Size of the request headers.
    #[deprecated(note = "compute from `request.headers`")]
    pub request_header_size: u64,

    /// The `User-Agent` header.
    #[deprecated(note = "read the `User-Agent` header from `request.headers`")]
    pub user_agent: String,

    /// IP address of the peer.
    #[deprecated(note = "use `request.remote_addr`")]
    pub remote_ip: String,

    /// IP address of the local socket.
    #[deprecated(note = "use `request.local_addr`")]
    pub server_ip: String,
}

/// Response side of an [`Entry`], measured by the request log stage.
#[derive(Debug, Clone, Copy)]
pub struct ResponseMeasurements {
    /// Final status.
    pub status: StatusCode,
    /// Header size when the status was sent.
    pub header_size: u64,
    /// Body bytes written.
    pub body_size: u64,
}

impl Entry {
    /// Assembles an entry, filling the legacy fields from the request.
    #[allow(deprecated)]
    pub fn new(
        request: RequestMeta,
        received_time: DateTime<Utc>,
        request_body_size: u64,
        response: ResponseMeasurements,
        latency: Duration,
    ) -> Self {
        let remote_ip = request
            .remote_addr
            .map(|addr| ip_from_host_port(&addr.to_string()))
            .unwrap_or_default();
        let server_ip = request
            .local_addr
            .map(|addr| ip_from_host_port(&addr.to_string()))
            .unwrap_or_default();

        Self {
            received_time,
            request_body_size,
            status: response.status,
            response_header_size: response.header_size,
            response_body_size: response.body_size,
            latency,
            trace_id: None,
            span_id: None,
            referer: request.header_str(&REFERER),
            proto: request.proto(),
            request_method: request.method.to_string(),
            request_url: request.uri.to_string(),
            request_header_size: header_size(&request.headers),
            user_agent: request.header_str(&USER_AGENT),
            remote_ip,
            server_ip,
            request,
        }
    }

    /// Attaches trace correlation ids.
    #[must_use]
    pub fn with_trace(mut self, trace_id: Option<TraceId>, span_id: Option<SpanId>) -> Self {
        self.trace_id = trace_id;
        self.span_id = span_id;
        self
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("method", &self.request.method)
            .field("uri", &self.request.uri)
            .field("status", &self.status)
            .field("request_body_size", &self.request_body_size)
            .field("response_header_size", &self.response_header_size)
            .field("response_body_size", &self.response_body_size)
            .field("latency", &self.latency)
            .field("trace_id", &self.trace_id)
            .finish_non_exhaustive()
    }
}

/// Returns the host part of `host:port`, without IPv6 brackets.
///
/// Returns an empty string when `host_port` has no port.
///
/// # Example
///
/// ```
/// use hestia_middleware::ip_from_host_port;
///
/// assert_eq!(ip_from_host_port("10.0.0.1:443"), "10.0.0.1");
/// assert_eq!(ip_from_host_port("[::1]:8080"), "::1");
/// assert_eq!(ip_from_host_port("no-port"), "");
/// ```
#[must_use]
pub fn ip_from_host_port(host_port: &str) -> String {
    let Some((host, _port)) = split_host_port(host_port) else {
        return String::new();
    };
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
        .to_string()
}

fn split_host_port(host_port: &str) -> Option<(&str, &str)> {
    if host_port.starts_with('[') {
        let end = host_port.find(']')?;
        let rest = &host_port[end + 1..];
        let port = rest.strip_prefix(':')?;
        return Some((&host_port[..=end], port));
    }
    let (host, port) = host_port.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some((host, port))
}

/// Receives one [`Entry`] per completed exchange.
///
/// Implementations must be safe to call from many tasks at once and must not
/// retain the entry after returning.
pub trait RequestLogger: Send + Sync + 'static {
    /// Records a completed exchange.
    fn log(&self, entry: &Entry);
}

impl<F> RequestLogger for F
where
    F: Fn(&Entry) + Send + Sync + 'static,
{
    fn log(&self, entry: &Entry) {
        self(entry);
    }
}

/// The set of header names whose values are redacted.
#[derive(Debug, Clone)]
pub struct RedactedHeaders {
    names: HashSet<HeaderName>,
}

impl RedactedHeaders {
    /// Builds a set from header names, matched case-insensitively.
    ///
    /// An empty list selects [`DEFAULT_REDACTED_HEADERS`]. Names that are not
    /// valid header names are skipped.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for name in names {
            let name = name.as_ref();
            match HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()) {
                Ok(parsed) => {
                    set.insert(parsed);
                }
                Err(_) => tracing::warn!(header = name, "Ignoring invalid redacted header name"),
            }
        }
        if set.is_empty() {
            return Self::default();
        }
        Self { names: set }
    }

    /// Returns `true` if `name` is redacted.
    #[must_use]
    pub fn contains(&self, name: &HeaderName) -> bool {
        self.names.contains(name)
    }

    /// Returns a copy of `headers` with redacted values replaced.
    ///
    /// The original map is left untouched.
    #[must_use]
    pub fn apply(&self, headers: &HeaderMap) -> HeaderMap {
        let mut redacted = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let value = if self.contains(name) {
                HeaderValue::from_static(REDACTED)
            } else {
                value.clone()
            };
            redacted.append(name.clone(), value);
        }
        redacted
    }
}

impl Default for RedactedHeaders {
    fn default() -> Self {
        Self {
            names: DEFAULT_REDACTED_HEADERS
                .iter()
                .filter_map(|name| HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()).ok())
                .collect(),
        }
    }
}

/// The `http` field of a request log event.
#[derive(Debug, Serialize)]
pub struct HttpRecord {
    /// Request side.
    pub request: HttpRequestRecord,
    /// Response side.
    pub response: HttpResponseRecord,
}

/// Request side of [`HttpRecord`].
#[derive(Debug, Serialize)]
pub struct HttpRequestRecord {
    /// When the request was received.
    pub timestamp: DateTime<Utc>,
    /// Header bytes plus body bytes.
    pub size: u64,
    /// Request method.
    pub method: String,
    /// Path and query.
    pub url: String,
    /// Query parameters, multiple values joined with `"; "`.
    pub query: BTreeMap<String, String>,
    /// Headers after redaction, multiple values joined with `"; "`.
    pub header: BTreeMap<String, String>,
}

/// Response side of [`HttpRecord`].
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseRecord {
    /// Response status code.
    pub status_code: u16,
    /// Header bytes plus body bytes.
    pub size: u64,
}

impl HttpRecord {
    /// Builds the record for `entry`, redacting headers with `redacted`.
    #[must_use]
    pub fn from_entry(entry: &Entry, redacted: &RedactedHeaders) -> Self {
        let request = &entry.request;
        let query = request
            .uri
            .query()
            .map(|q| join_values(url::form_urlencoded::parse(q.as_bytes()).into_owned()))
            .unwrap_or_default();
        let header = join_values(redacted.apply(&request.headers).iter().map(|(k, v)| {
            (
                k.as_str().to_string(),
                String::from_utf8_lossy(v.as_bytes()).into_owned(),
            )
        }));

        Self {
            request: HttpRequestRecord {
                timestamp: entry.received_time,
                size: entry.request_body_size + header_size(&request.headers),
                method: request.method.to_string(),
                url: request.request_uri(),
                query,
                header,
            },
            response: HttpResponseRecord {
                status_code: entry.status.as_u16(),
                size: entry.response_header_size + entry.response_body_size,
            },
        }
    }
}

fn join_values<I>(pairs: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        grouped.entry(key).or_default().push(value);
    }
    grouped
        .into_iter()
        .map(|(key, values)| (key, values.join(VALUE_SEPARATOR)))
        .collect()
}

/// Default [`RequestLogger`] that emits one `tracing` event per exchange.
///
/// # Example
///
/// ```
/// use hestia_middleware::{RequestLogMiddleware, TracingRequestLogger};
///
/// let logger = TracingRequestLogger::with_redacted_headers(["Authorization", "X-Api-Key"]);
/// let stage = RequestLogMiddleware::new(logger);
/// # let _ = stage;
/// ```
#[derive(Debug, Clone, Default)]
pub struct TracingRequestLogger {
    redacted: RedactedHeaders,
}

impl TracingRequestLogger {
    /// Creates a logger redacting [`DEFAULT_REDACTED_HEADERS`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a logger redacting the given headers.
    ///
    /// An empty list selects [`DEFAULT_REDACTED_HEADERS`].
    pub fn with_redacted_headers<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            redacted: RedactedHeaders::new(names),
        }
    }

    /// Formats the event message for `entry`.
    #[must_use]
    pub fn message(entry: &Entry) -> String {
        let request = &entry.request;
        format!(
            "{} {} {}://{}{} {}",
            entry.status.as_u16(),
            request.method,
            request.scheme(),
            request.host(),
            request.request_uri(),
            request.proto(),
        )
    }
}

impl RequestLogger for TracingRequestLogger {
    fn log(&self, entry: &Entry) {
        let record = HttpRecord::from_entry(entry, &self.redacted);
        let http = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize request log record");
                String::new()
            }
        };
        let trace_id = entry.trace_id.map(|id| id.to_string()).unwrap_or_default();
        let span_id = entry.span_id.map(|id| id.to_string()).unwrap_or_default();

        tracing::info!(
            status = entry.status.as_u16(),
            elapsed_ms = entry.latency.as_secs_f64() * 1000.0,
            http = %http,
            trace_id = %trace_id,
            span_id = %span_id,
            "{}",
            Self::message(entry)
        );
    }
}
