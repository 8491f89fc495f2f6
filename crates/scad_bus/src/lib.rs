#![forbid(unsafe_code)]
//! Async request/response bus and remote-executor contract for the
//! render coordination engine.
//!
//! This crate owns the wire-level concerns that sit between the
//! host-side coordinator (`scad_render`) and whatever executes a WASM
//! render on the other side of an async process boundary: the
//! fingerprint type, the `WASM_RENDER_REQUEST:<fingerprint>` sentinel
//! codec, the request/response envelope shapes, request correlation with
//! timeout and cancellation (the message bus), and a [`RemoteExecutor`]
//! trait with a deterministic mock used in tests.
//!
//! It is deliberately not a JSON-RPC transport: the bus does not spawn a
//! process or own a stdio pipe. Callers supply an outbound channel and
//! drive an inbound one (`MessageBus::resolve`); this mirrors how a
//! reactive notebook's trait-sync layer actually moves messages, which is
//! neither a pipe nor a socket.

pub mod bus;
pub mod contract;
pub mod envelope;
pub mod error;
pub mod fingerprint;
pub mod sentinel;

pub use bus::{MessageBus, PendingRequest};
pub use contract::{recognize_stl_data, DynExecuteFuture, MockExecutor, RemoteExecutor};
pub use envelope::{RenderRequest, RenderResponse, RequestKind, ResponseError, ResponseStatus, Timings};
pub use error::BusError;
pub use fingerprint::Fingerprint;
pub use sentinel::{format_sentinel, is_ascii_stl, is_sentinel, parse_sentinel, SENTINEL_PREFIX, STL_ASCII_PREFIX};
