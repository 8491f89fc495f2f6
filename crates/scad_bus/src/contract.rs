use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::envelope::{RenderRequest, RenderResponse, ResponseError, ResponseStatus, Timings};
use crate::sentinel::{is_sentinel, parse_sentinel};

/// Type-erased future returned by [`RemoteExecutor::execute`], mirroring
/// the boxed-future pattern the coordination engine's sibling crate uses
/// for its own long-running CLI invocations rather than pulling in an
/// `async-trait` dependency for a single method.
pub type DynExecuteFuture = Pin<Box<dyn Future<Output = RenderResponse> + Send>>;

/// Specification of how the client-side executor must behave (C8).
///
/// The remote executor is an external collaborator (a WASM runtime inside
/// a notebook viewer, in the system this engine is built for) — this
/// trait exists so host-side tests can exercise the coordinator and bus
/// against a deterministic in-memory stand-in instead of a browser.
///
/// A conforming implementation MUST:
/// - detect `stl_data` strings beginning with `WASM_RENDER_REQUEST:` and
///   treat the remainder as the fingerprint;
/// - read the companion SCAD source carried on the request envelope;
/// - execute the render, returning ASCII STL (or converting binary STL to
///   ASCII before returning);
/// - respect a memory ceiling (default 2 GiB) and signal
///   [`crate::error::BusError::Memory`] on excess;
/// - return exactly one [`RenderResponse`] per request id.
pub trait RemoteExecutor: Send + Sync {
    fn execute(&self, request: RenderRequest) -> DynExecuteFuture;
}

/// Deterministic in-memory executor used by the engine's own integration
/// tests. Recognizes the sentinel embedded in the request's `scad` field
/// is irrelevant here — the request already carries the real fingerprint
/// and SCAD source, so this renders a trivial placeholder mesh keyed by
/// the fingerprint rather than real geometry.
pub struct MockExecutor {
    memory_ceiling_bytes: u64,
    responses: Arc<Mutex<Vec<MockResponse>>>,
}

enum MockResponse {
    Stl(Vec<u8>),
    Error(ResponseError),
    /// Never resolves; used to exercise bus timeouts deterministically.
    Hang,
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self {
            memory_ceiling_bytes: 2 * 1024 * 1024 * 1024,
            responses: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_ceiling(mut self, bytes: u64) -> Self {
        self.memory_ceiling_bytes = bytes;
        self
    }

    /// Queues the next N `execute` calls to return the given canned STL
    /// bytes in order (FIFO); once exhausted, falls back to synthesizing
    /// a minimal cube keyed by the fingerprint.
    pub async fn queue_stl(&self, bytes: Vec<u8>) {
        self.responses.lock().await.push(MockResponse::Stl(bytes));
    }

    pub async fn queue_error(&self, error: ResponseError) {
        self.responses.lock().await.push(MockResponse::Error(error));
    }

    /// Queues a request that never resolves, so callers can exercise
    /// [`crate::bus::MessageBus`] timeout handling deterministically.
    pub async fn queue_hang(&self) {
        self.responses.lock().await.push(MockResponse::Hang);
    }
}

impl RemoteExecutor for MockExecutor {
    fn execute(&self, request: RenderRequest) -> DynExecuteFuture {
        let responses = self.responses.clone();
        let memory_ceiling = self.memory_ceiling_bytes;
        Box::pin(async move {
            let queued = {
                let mut guard = responses.lock().await;
                (!guard.is_empty()).then(|| guard.remove(0))
            };
            match queued {
                Some(MockResponse::Hang) => {
                    // Parks forever; the bus-side deadline is what ends this.
                    std::future::pending::<()>().await;
                    unreachable!("pending future never resolves");
                }
                Some(MockResponse::Error(error)) => RenderResponse::error(request.id, error),
                Some(MockResponse::Stl(bytes)) => {
                    if bytes.len() as u64 > memory_ceiling {
                        return RenderResponse::error(request.id, ResponseError::Memory);
                    }
                    RenderResponse::success(request.id, bytes, Timings::default())
                }
                None => {
                    let stl = synthesize_ascii_cube(request.fingerprint.to_string().as_str());
                    RenderResponse::success(request.id, stl, Timings::default())
                }
            }
        })
    }
}

fn synthesize_ascii_cube(name: &str) -> Vec<u8> {
    let mut out = format!("solid {name}\n");
    // A single degenerate facet is enough to satisfy the ASCII-STL
    // prefix/suffix invariant for mock executor responses; real geometry
    // comes from the actual WASM module on the executor side.
    out.push_str("facet normal 0 0 1\nouter loop\nvertex 0 0 0\nvertex 1 0 0\nvertex 0 1 0\nendloop\nendfacet\n");
    out.push_str(&format!("endsolid {name}\n"));
    out.into_bytes()
}

/// Recognizes a sentinel string embedded in an already-published
/// `stl_data` trait value and extracts its fingerprint, as the contract
/// requires client-side executors to do before dispatching a real render.
pub fn recognize_stl_data(stl_data: &str) -> Option<crate::Fingerprint> {
    is_sentinel(stl_data).then(|| parse_sentinel(stl_data)).flatten()
}

/// Default per-request deadline recommended for the WASM path.
pub const DEFAULT_WASM_DEADLINE: Duration = Duration::from_secs(10);
/// Default per-request deadline recommended for the local path.
pub const DEFAULT_LOCAL_DEADLINE: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::RequestKind;
    use crate::fingerprint::Fingerprint;

    #[tokio::test]
    async fn default_mock_executor_returns_ascii_stl() {
        let executor = MockExecutor::new();
        let request = RenderRequest::new(RequestKind::Render, "cube(1);", Fingerprint::from_raw(7));
        let response = executor.execute(request).await;
        assert_eq!(response.status, ResponseStatus::Success);
        let stl = String::from_utf8(response.stl.unwrap()).unwrap();
        assert!(stl.starts_with("solid "));
        assert!(stl.trim_end().ends_with("endsolid 7"));
    }

    #[tokio::test]
    async fn queued_responses_are_delivered_in_order() {
        let executor = MockExecutor::new();
        executor.queue_stl(b"solid a\nendsolid a\n".to_vec()).await;
        let request = RenderRequest::new(RequestKind::Render, "cube(1);", Fingerprint::from_raw(1));
        let response = executor.execute(request).await;
        assert_eq!(response.stl.unwrap(), b"solid a\nendsolid a\n");
    }

    #[test]
    fn recognizes_sentinel_and_rejects_stl() {
        let fp = Fingerprint::from_raw(99);
        let token = crate::sentinel::format_sentinel(fp);
        assert_eq!(recognize_stl_data(&token), Some(fp));
        assert_eq!(recognize_stl_data("solid cube\n"), None);
    }
}
