use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the async message bus and the remote-executor
/// contract (C6/C8 in the coordination engine's error taxonomy).
///
/// Backends report typed errors, the selector decides whether to fall
/// back, and the coordinator publishes a single user-visible error per
/// terminal state. Errors here never mutate a cache entry.
#[derive(Debug, Error, Clone)]
pub enum BusError {
    /// The awaiter's deadline elapsed before a response arrived.
    #[error("render request timed out after {0:?}")]
    Timeout(Duration),

    /// The pending entry was removed because a newer model revision
    /// superseded it. This is silent and never surfaced to
    /// the end user; callers should match on it explicitly rather than
    /// logging it as a failure.
    #[error("render request was cancelled")]
    Cancelled,

    /// The remote executor reported it exceeded its configured memory
    /// ceiling while running the WASM module.
    #[error("remote executor exceeded its memory ceiling")]
    Memory,

    /// The remote executor reported a parse/syntax failure in the SCAD
    /// source it was asked to render.
    #[error("SCAD syntax error: {message}")]
    SyntaxError { message: String },

    /// The remote executor parsed the source but could not produce valid
    /// geometry from it.
    #[error("SCAD geometry error: {message}")]
    GeometryError { message: String },

    /// The outbound channel to the remote executor closed before the
    /// request could be delivered or while a response was still pending.
    #[error("message bus channel closed")]
    ChannelClosed,

    /// A response referenced a request id with no matching pending
    /// entry; dropped with a warning rather than treated as fatal
    /// (duplicate ids cannot occur because C1's single-flight gate
    /// coalesces same-fingerprint requests before they reach the bus).
    #[error("response referenced unknown request id {0}")]
    UnknownRequestId(uuid::Uuid),

    /// Catch-all for executor-reported failures that do not map to a
    /// more specific variant, tagged with the backend that produced it.
    #[error("remote executor reported an error ({backend}): {message}")]
    Unknown { backend: String, message: String },
}

impl BusError {
    /// True for errors that should never be shown to the end user
    /// (cancellation is expected control flow, not a failure).
    pub fn is_silent(&self) -> bool {
        matches!(self, BusError::Cancelled)
    }
}
