#![forbid(unsafe_code)]
//! Render coordination engine for a reactive-notebook OpenSCAD widget:
//! routes a stream of SCAD source revisions through a native-process
//! backend, a host-side WASM backend, or an auto-selected hybrid, with
//! content-addressed caching, version/capability detection, and a state
//! machine that publishes `stl_data`/`renderer_status`/`error_message`/
//! `is_loading` back to the host.
//!
//! ## Wiring a coordinator
//! - Build an [`EngineConfig`] via [`EngineConfig::builder`] or
//!   [`EngineConfig::from_toml_str`]: cache budget, per-backend timeouts,
//!   `preferred_backend`, `fallback_enabled`, and the WASM `asset_root`.
//! - Use [`detector::Detector`] to discover a native `openscad` binary
//!   (`PATH` or [`detector::Detector::with_binary_override`]) and a
//!   bundled WASM asset directory, and feed the winners into
//!   [`RenderCoordinator::builder`] via [`CoordinatorBuilder::local_backend`]
//!   / [`CoordinatorBuilder::wasm_backend`] along with the discriminator
//!   string from [`detector::InstallationRecord::fingerprint_discriminator`].
//! - Supply a [`scad_bus::MessageBus`] (built from an outbound channel to
//!   whatever moves envelopes to the remote executor — a real notebook
//!   sync layer or [`scad_bus::MockExecutor`] in tests) via
//!   [`CoordinatorBuilder::bus`].
//! - Drive renders with [`RenderCoordinator::set_scad_code`] whenever the
//!   host observes a new `scad_code` value; observe results via
//!   [`RenderCoordinator::subscribe`] or [`RenderCoordinator::state`].
//!
//! ```rust,no_run
//! use scad_render::{EngineConfig, LocalBackend, RenderCoordinator};
//! use scad_bus::MessageBus;
//! # #[tokio::main]
//! # async fn main() {
//! let config = EngineConfig::builder().build().unwrap();
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! tokio::spawn(async move {
//!     // A real host forwards `rx` to the remote executor and calls
//!     // `bus.resolve(..)` with its responses; tests use `scad_bus::MockExecutor`.
//!     while rx.recv().await.is_some() {}
//! });
//! let coordinator = RenderCoordinator::builder(config)
//!     .local_backend(LocalBackend::new("openscad"), "local:2021.01.27")
//!     .bus(MessageBus::new(tx))
//!     .build();
//! coordinator.set_scad_code("cube([2,2,2]);").await;
//! # }
//! ```
//!
//! ## Error handling
//! Every fallible operation returns [`RenderError`], a `thiserror` enum
//! covering a fixed taxonomy (`ToolMissing`, `AssetMissing`,
//! `SyntaxError`, `GeometryError`, `Timeout`, `Memory`, `Cancelled`,
//! `Unknown`) plus the operational failures specific to spawning and
//! supervising a local backend process (`Spawn`, `Workspace`, `Config`).
//! [`RenderError::is_silent`] marks cancellation as expected control flow
//! rather than a user-facing failure; the coordinator never publishes it
//! as `error_message`.
//!
//! ## Logging
//! This crate only emits `tracing` events/warnings (e.g. a dropped bus
//! response for an unknown request id); it never installs a subscriber,
//! since picking and configuring one is a host concern.
//!
//! ## Scope
//! Parsing or evaluating SCAD, decoding STL into triangles, rendering
//! pixels, and the notebook's reactive graph are out of scope — this
//! crate only coordinates *which* backend renders *which* revision and
//! *when*, and normalizes the resulting bytes to ASCII STL or a sentinel.

pub mod backend;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
mod process;
pub mod scad;
pub mod selector;
pub mod stl;

pub use backend::{LocalBackend, WasmBackend};
pub use cache::{Admission, Cache, FollowerGuard};
pub use config::{EngineConfig, EngineConfigBuilder, PreferredBackend};
pub use coordinator::{
    CoordinatorBuilder, RenderCoordinator, RendererKind, RendererStatus, WidgetState,
};
pub use detector::{
    AssetUrlResolver, Capability, Detector, FileUrlResolver, InstallationKind,
    InstallationRecord, VersionTuple,
};
pub use error::RenderError;
pub use scad::ScadSource;
pub use selector::{ChosenBackend, Decision, HostKind, Selector};
pub use stl::{StlArtifact, StlEncoding};

pub use scad_bus::Fingerprint;
