//! # Hestia Core
//!
//! Core types and traits for the Hestia server runtime.
//!
//! This crate provides the foundational types shared by the middleware and
//! server crates:
//!
//! - [`RequestContext`] - Per-exchange context carrying addresses, timing,
//!   trace correlation and the recovered [`Fault`], if any
//! - [`ResponseWriter`] - The response sink a handler writes to, with explicit
//!   [`Capabilities`] for flush, connection takeover and server push
//! - [`Handler`] - Core handler trait
//! - [`Body`] - The request body type used throughout the runtime

#![doc(html_root_url = "https://docs.rs/hestia-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod body;
mod context;
mod error;
mod fault;
pub mod fixtures;
mod handler;
mod response;

pub use body::{Body, BoxError};
pub use context::{RequestContext, SpanId, TraceId};
pub use error::{ResponseError, ResponseResult};
pub use fault::{
    abort_handler, install_location_hook, take_panic_location, AbortHandler, Fault, FaultError,
    FaultLocation,
};
pub use handler::{handler_fn, not_found, BoxFuture, FnHandler, Handler, NotFound, Request};
pub use response::{
    header_size, Capabilities, Capability, HijackedConnection, PushOptions, ResponseWriter,
    Upgraded,
};
