use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;
use uuid::Uuid;

use crate::envelope::{RenderRequest, RenderResponse, ResponseStatus};
use crate::error::BusError;

type Awaiter = oneshot::Sender<Result<RenderResponse, BusError>>;
type PendingMap = Arc<Mutex<HashMap<Uuid, Awaiter>>>;

/// Generates request ids, sends envelopes to the remote executor over an
/// implementation-agnostic outbound channel, and correlates inbound
/// responses back to exactly one awaiter.
///
/// Duplicate ids cannot occur: same-fingerprint requests are coalesced by
/// the cache's single-flight gate before they ever reach the bus, so every
/// pending entry here corresponds to a distinct render.
#[derive(Clone)]
pub struct MessageBus {
    pending: PendingMap,
    outbound: mpsc::UnboundedSender<RenderRequest>,
}

impl MessageBus {
    /// `outbound` is the caller-supplied channel to the remote executor
    /// (a typed message sink on the widget sync layer, a test fixture, or
    /// anything else that eventually calls [`MessageBus::resolve`] with a
    /// matching response).
    pub fn new(outbound: mpsc::UnboundedSender<RenderRequest>) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            outbound,
        }
    }

    /// Registers a pending awaiter and transmits the request.
    ///
    /// A zero deadline resolves to [`BusError::Timeout`] immediately
    /// without transmitting the envelope at all (spec boundary: "Deadline
    /// = 0 → immediate Timeout without send").
    pub async fn send(&self, request: RenderRequest) -> Result<PendingRequest, BusError> {
        if request.deadline.is_zero() {
            return Err(BusError::Timeout(Duration::ZERO));
        }

        let id = request.id;
        let deadline = request.deadline;
        let (tx, rx) = oneshot::channel();

        {
            let mut guard = self.pending.lock().await;
            guard.insert(id, tx);
        }

        if self.outbound.send(request).is_err() {
            let mut guard = self.pending.lock().await;
            guard.remove(&id);
            return Err(BusError::ChannelClosed);
        }

        Ok(PendingRequest { id, rx, deadline })
    }

    /// Delivers an inbound response to its awaiter. Unknown ids (a
    /// response for a request that already timed out, was cancelled, or
    /// never existed) are dropped with a warning rather than treated as
    /// fatal.
    pub async fn resolve(&self, response: RenderResponse) {
        let sender = { self.pending.lock().await.remove(&response.id) };
        let Some(tx) = sender else {
            warn!(id = %response.id, "dropped response for unknown or already-resolved request");
            return;
        };

        let result = match response.status {
            ResponseStatus::Error => Err(response
                .error
                .map(BusError::from)
                .unwrap_or_else(|| BusError::Unknown {
                    backend: "executor".to_string(),
                    message: "error response carried no error detail".to_string(),
                })),
            ResponseStatus::Success | ResponseStatus::Progress => Ok(response),
        };

        let _ = tx.send(result);
    }

    /// Cancels a pending request, e.g. because the host observed a newer
    /// SCAD revision with a different fingerprint while this one was
    /// still in flight (supersession). Frees the pending entry
    /// and delivers [`BusError::Cancelled`] to the awaiter; returns
    /// `false` if the request had already resolved or did not exist.
    pub async fn cancel(&self, id: Uuid) -> bool {
        let sender = self.pending.lock().await.remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(Err(BusError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Number of requests currently awaiting a response; exposed for
    /// tests and host diagnostics.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// A render request that has been transmitted and is awaiting either a
/// matching response, a timeout, or cancellation.
pub struct PendingRequest {
    id: Uuid,
    rx: oneshot::Receiver<Result<RenderResponse, BusError>>,
    deadline: Duration,
}

impl PendingRequest {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Awaits the response, enforcing the request's deadline.
    pub async fn await_response(self) -> Result<RenderResponse, BusError> {
        match tokio::time::timeout(self.deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BusError::ChannelClosed),
            Err(_) => Err(BusError::Timeout(self.deadline)),
        }
    }
}
