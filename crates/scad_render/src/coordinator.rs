use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use scad_bus::{Fingerprint, MessageBus, RenderRequest, RequestKind};

use crate::backend::{LocalBackend, WasmBackend};
use crate::cache::{Admission, Cache};
use crate::config::{EngineConfig, PreferredBackend};
use crate::error::RenderError;
use crate::scad::ScadSource;
use crate::selector::{ChosenBackend, Decision, HostKind, Selector};
use crate::stl::StlArtifact;

/// Terminal/transitional status published to the host, mirroring the
/// `renderer_status` trait.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererStatus {
    Initializing,
    Ready,
    Rendering,
    Success,
    Error,
}

impl Default for RendererStatus {
    fn default() -> Self {
        RendererStatus::Initializing
    }
}

/// `renderer_type` trait: the host writes this once at construction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RendererKind {
    #[default]
    Auto,
    Local,
    Wasm,
}

impl From<PreferredBackend> for RendererKind {
    fn from(value: PreferredBackend) -> Self {
        match value {
            PreferredBackend::Auto => RendererKind::Auto,
            PreferredBackend::Local => RendererKind::Local,
            PreferredBackend::Wasm => RendererKind::Wasm,
        }
    }
}

/// Observable record of the host↔widget trait table: a small
/// observable-state abstraction where the host writes a subset of fields
/// and the core writes the rest. The host writes `scad_code` and (once)
/// `renderer_type`;
/// everything else is written by the coordinator.
#[derive(Clone, Debug, Default)]
pub struct WidgetState {
    pub scad_code: String,
    pub stl_data: String,
    pub renderer_status: RendererStatus,
    pub error_message: String,
    pub is_loading: bool,
    pub renderer_type: RendererKind,
    pub wasm_enabled: bool,
    pub wasm_base_url: String,
}

struct Inner {
    /// Bumped on every `set_scad_code` call; a render whose generation no
    /// longer matches the latest has been superseded and must not publish.
    generation: u64,
    /// The bus request id currently awaited, if any, so a newer model
    /// revision can cancel it.
    pending_bus_id: Option<Uuid>,
}

/// The widget core: a state machine driven by host trait changes that
/// observes `scad_code`, drives cache lookup → backend selection →
/// dispatch → bus round-trip, and publishes
/// `stl_data`/`renderer_status`/`error_message`/`is_loading`.
pub struct RenderCoordinator {
    cache: Arc<Cache>,
    selector: Selector,
    local_backend: Option<LocalBackend>,
    local_discriminator: Option<String>,
    wasm_backend: Option<WasmBackend>,
    wasm_discriminator: Option<String>,
    bus: MessageBus,
    local_semaphore: Arc<Semaphore>,
    local_timeout: Duration,
    wasm_timeout: Duration,
    host_kind: HostKind,
    state_tx: watch::Sender<WidgetState>,
    inner: Mutex<Inner>,
}

/// Everything the coordinator needs that the detector/config layers
/// produce; kept as one struct so `RenderCoordinator::new` doesn't grow an
/// unreadable parameter list.
pub struct CoordinatorBuilder {
    config: EngineConfig,
    local_backend: Option<LocalBackend>,
    local_discriminator: Option<String>,
    wasm_backend: Option<WasmBackend>,
    wasm_discriminator: Option<String>,
    bus: Option<MessageBus>,
    host_kind: HostKind,
}

impl CoordinatorBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            local_backend: None,
            local_discriminator: None,
            wasm_backend: None,
            wasm_discriminator: None,
            bus: None,
            host_kind: HostKind::Native,
        }
    }

    pub fn local_backend(mut self, backend: LocalBackend, discriminator: impl Into<String>) -> Self {
        self.local_discriminator = Some(discriminator.into());
        self.local_backend = Some(backend);
        self
    }

    pub fn wasm_backend(mut self, backend: WasmBackend, discriminator: impl Into<String>) -> Self {
        self.wasm_discriminator = Some(discriminator.into());
        self.wasm_backend = Some(backend);
        self
    }

    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn host_kind(mut self, host_kind: HostKind) -> Self {
        self.host_kind = host_kind;
        self
    }

    pub fn build(self) -> RenderCoordinator {
        let wasm_enabled = self
            .wasm_backend
            .as_ref()
            .map(|w| w.validate_assets().is_ok())
            .unwrap_or(false);
        let wasm_base_url = self
            .wasm_backend
            .as_ref()
            .map(|w| w.asset_base_url().to_string())
            .unwrap_or_default();

        let (state_tx, _rx) = watch::channel(WidgetState {
            renderer_type: self.config.preferred_backend.into(),
            renderer_status: RendererStatus::Ready,
            wasm_enabled,
            wasm_base_url,
            ..Default::default()
        });

        RenderCoordinator {
            cache: Arc::new(Cache::with_budget(self.config.cache_budget_bytes)),
            selector: Selector::new(self.config.preferred_backend, self.config.fallback_enabled),
            local_backend: self.local_backend,
            local_discriminator: self.local_discriminator,
            wasm_backend: self.wasm_backend,
            wasm_discriminator: self.wasm_discriminator,
            bus: self.bus.expect("CoordinatorBuilder::bus is required"),
            local_semaphore: Arc::new(Semaphore::new(self.config.max_concurrent_local_renders)),
            local_timeout: self.config.local_timeout,
            wasm_timeout: self.config.wasm_timeout,
            host_kind: self.host_kind,
            state_tx,
            inner: Mutex::new(Inner {
                generation: 0,
                pending_bus_id: None,
            }),
        }
    }
}

enum Published {
    /// The render reached a terminal state on its own generation.
    Terminal,
    /// A newer `set_scad_code` call arrived before this one finished;
    /// nothing was published.
    Superseded,
}

impl RenderCoordinator {
    pub fn builder(config: EngineConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// A live view of the widget state; hosts poll or `.changed().await`
    /// on the returned receiver to react to publications.
    pub fn subscribe(&self) -> watch::Receiver<WidgetState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> WidgetState {
        self.state_tx.borrow().clone()
    }

    /// Entry point: the host observed a new `scad_code` value. Cancels any
    /// in-flight request for the previous revision and drives the pipeline
    /// (Canonicalizing → CacheLookup → Dispatching → Awaiting/Publishing).
    /// `is_loading` stays `true` across a supersession.
    pub async fn set_scad_code(&self, raw: impl Into<String>) {
        let raw = raw.into();
        let (generation, previous_bus_id) = {
            let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
            inner.generation += 1;
            (inner.generation, inner.pending_bus_id.take())
        };

        if let Some(id) = previous_bus_id {
            self.bus.cancel(id).await;
        }

        let scad_code = raw.clone();
        self.publish(move |state| {
            state.scad_code = scad_code.clone();
            state.is_loading = true;
            state.renderer_status = RendererStatus::Rendering;
            state.error_message.clear();
        });

        self.run_pipeline(raw, generation).await;
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().expect("coordinator mutex poisoned").generation == generation
    }

    fn publish(&self, mutator: impl FnOnce(&mut WidgetState)) {
        self.state_tx.send_modify(mutator);
    }

    async fn run_pipeline(&self, raw: String, generation: u64) -> Published {
        let canonical = ScadSource::new(raw).canonicalize();

        if canonical.is_empty() {
            return self.finish(
                generation,
                Err(RenderError::SyntaxError {
                    message: "empty SCAD source".to_string(),
                }),
            );
        }

        let local_available = self.local_backend.is_some();
        let wasm_available = self
            .wasm_backend
            .as_ref()
            .map(|w| w.validate_assets().is_ok())
            .unwrap_or(false);

        let decision = match self.selector.choose(local_available, wasm_available, self.host_kind) {
            Ok(decision) => decision,
            Err(error) => return self.finish(generation, Err(error)),
        };
        debug!(backend = ?decision.backend, used_fallback = decision.used_fallback, "selector chose backend");

        let discriminator = match decision.backend {
            ChosenBackend::Local => self
                .local_discriminator
                .clone()
                .unwrap_or_else(|| "local:unknown".to_string()),
            ChosenBackend::Wasm => self
                .wasm_discriminator
                .clone()
                .unwrap_or_else(|| "wasm:unknown".to_string()),
        };
        let fingerprint = Fingerprint::compute(&canonical, &discriminator);

        if let Some(artifact) = self.cache.lookup(fingerprint) {
            debug!(%fingerprint, "cache hit");
            return self.finish(generation, Ok(ascii_text(&artifact)));
        }
        debug!(%fingerprint, "cache miss");

        loop {
            match self.cache.begin(fingerprint) {
                Admission::Leader => break,
                Admission::Follower(guard) => {
                    guard.wait().await;
                    if !self.is_current(generation) {
                        return Published::Superseded;
                    }
                    if let Some(artifact) = self.cache.lookup(fingerprint) {
                        return self.finish(generation, Ok(ascii_text(&artifact)));
                    }
                    // The leader we waited on abandoned without committing
                    // (its render failed); loop around to contend for
                    // leadership ourselves.
                }
            }
        }

        let result = match decision {
            Decision {
                backend: ChosenBackend::Local,
                ..
            } => self.render_local(&canonical).await,
            Decision {
                backend: ChosenBackend::Wasm,
                ..
            } => self.render_wasm(&canonical, fingerprint, generation).await,
        };

        match result {
            Ok(bytes) => {
                let ascii_bytes = StlArtifact::detect(bytes).into_ascii();
                let artifact = Arc::new(StlArtifact {
                    encoding: crate::stl::StlEncoding::Ascii,
                    bytes: ascii_bytes.clone(),
                });
                self.cache.commit(fingerprint, artifact);
                self.finish(generation, Ok(String::from_utf8_lossy(&ascii_bytes).into_owned()))
            }
            Err(error) => {
                if !error.is_silent() {
                    warn!(%fingerprint, %error, "render failed, cache entry abandoned");
                }
                self.cache.abandon(fingerprint);
                self.finish(generation, Err(error))
            }
        }
    }

    async fn render_local(&self, scad: &str) -> Result<Vec<u8>, RenderError> {
        let backend = self.local_backend.as_ref().ok_or(RenderError::ToolMissing)?;
        let _permit = self
            .local_semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("local render semaphore was closed");
        backend.render(scad, self.local_timeout).await
    }

    async fn render_wasm(
        &self,
        scad: &str,
        fingerprint: Fingerprint,
        generation: u64,
    ) -> Result<Vec<u8>, RenderError> {
        let backend = self.wasm_backend.as_ref().ok_or(RenderError::ToolMissing)?;
        let sentinel = backend.request_render(fingerprint);

        if self.is_current(generation) {
            self.publish(move |state| {
                state.stl_data = sentinel.clone();
            });
        }

        let request = RenderRequest::new(RequestKind::Render, scad, fingerprint)
            .with_deadline(self.wasm_timeout);
        let pending = self.bus.send(request).await?;
        let id = pending.id();

        {
            let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
            if inner.generation == generation {
                inner.pending_bus_id = Some(id);
            }
        }

        let response = pending.await_response().await;

        {
            let mut inner = self.inner.lock().expect("coordinator mutex poisoned");
            if inner.pending_bus_id == Some(id) {
                inner.pending_bus_id = None;
            }
        }

        let response = response?;
        response.stl.ok_or_else(|| RenderError::Unknown {
            backend: "wasm".to_string(),
            message: "success response carried no STL bytes".to_string(),
        })
    }

    fn finish(&self, generation: u64, result: Result<String, RenderError>) -> Published {
        if !self.is_current(generation) {
            return Published::Superseded;
        }

        match result {
            Ok(stl_data) => self.publish(move |state| {
                state.stl_data = stl_data.clone();
                state.is_loading = false;
                state.renderer_status = RendererStatus::Success;
                state.error_message.clear();
            }),
            Err(error) if error.is_silent() => self.publish(|state| {
                state.is_loading = false;
                state.renderer_status = RendererStatus::Ready;
            }),
            Err(error) => {
                let message = error.to_string();
                self.publish(move |state| {
                    state.is_loading = false;
                    state.renderer_status = RendererStatus::Error;
                    state.error_message = message.clone();
                });
            }
        }
        Published::Terminal
    }
}

fn ascii_text(artifact: &StlArtifact) -> String {
    String::from_utf8_lossy(&artifact.bytes).into_owned()
}
