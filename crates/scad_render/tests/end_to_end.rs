//! Integration tests for the six seeded end-to-end scenarios: cube via the
//! local backend, the WASM sentinel, a cache hit avoiding a second backend
//! invocation, supersession discarding a stale response, preference
//! fallback, and a bus timeout surfacing as a user-visible error.
//!
//! The local backend scenarios shell out to a fixture script standing in
//! for a real `openscad` binary; the WASM scenarios drive
//! [`scad_bus::MockExecutor`] through a forwarding task that mirrors how a
//! real host would bridge the bus's outbound channel to the remote
//! executor.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use scad_bus::{MessageBus, MockExecutor, RemoteExecutor, RenderRequest, ResponseError};
use scad_render::{
    EngineConfig, Fingerprint, HostKind, PreferredBackend, RenderCoordinator, RendererStatus,
    ScadSource, WasmBackend,
};

fn spawn_mock_executor(
    bus: MessageBus,
    mut rx: mpsc::UnboundedReceiver<RenderRequest>,
    executor: Arc<MockExecutor>,
) {
    tokio::spawn(async move {
        while let Some(request) = rx.recv().await {
            let response = executor.execute(request).await;
            bus.resolve(response).await;
        }
    });
}

fn write_valid_wasm_assets(dir: &Path) {
    std::fs::write(
        dir.join("openscad.wasm"),
        [&[0x00, 0x61, 0x73, 0x6d][..], &vec![0u8; 2 * 1024 * 1024][..]].concat(),
    )
    .unwrap();
    std::fs::write(dir.join("openscad.js"), "// runtime").unwrap();
}

/// Builds a coordinator wired to a fresh [`MockExecutor`] for WASM-path
/// scenarios; the returned bus's outbound requests are drained by a
/// background forwarding task for the duration of the test.
fn wasm_coordinator(
    wasm_dir: &Path,
    preferred: PreferredBackend,
    wasm_timeout: Duration,
) -> (RenderCoordinator, Arc<MockExecutor>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let bus = MessageBus::new(tx);
    let executor = Arc::new(MockExecutor::new());
    spawn_mock_executor(bus.clone(), rx, executor.clone());

    let config = EngineConfig::builder()
        .preferred_backend(preferred)
        .wasm_timeout(wasm_timeout)
        .build()
        .unwrap();

    let wasm_backend = WasmBackend::new(wasm_dir, "file:///wasm");
    let coordinator = RenderCoordinator::builder(config)
        .wasm_backend(wasm_backend, "wasm:2022.03.20")
        .bus(bus)
        .host_kind(HostKind::BrowserLike)
        .build();
    (coordinator, executor)
}

fn inert_bus() -> MessageBus {
    let (tx, _rx) = mpsc::unbounded_channel();
    MessageBus::new(tx)
}

#[cfg(unix)]
mod local_backend_scenarios {
    use super::*;
    use scad_render::LocalBackend;
    use std::os::unix::fs::PermissionsExt;

    const CUBE_STL: &str = concat!(
        "solid cube\n",
        "facet normal 0 0 -1\nouter loop\nvertex 0 0 0\nvertex 0 2 0\nvertex 2 2 0\nendloop\nendfacet\n",
        "facet normal 0 0 -1\nouter loop\nvertex 0 0 0\nvertex 2 2 0\nvertex 2 0 0\nendloop\nendfacet\n",
        "facet normal 0 0 1\nouter loop\nvertex 0 0 2\nvertex 2 2 2\nvertex 0 2 2\nendloop\nendfacet\n",
        "facet normal 0 0 1\nouter loop\nvertex 0 0 2\nvertex 2 0 2\nvertex 2 2 2\nendloop\nendfacet\n",
        "facet normal 0 -1 0\nouter loop\nvertex 0 0 0\nvertex 2 0 0\nvertex 2 0 2\nendloop\nendfacet\n",
        "facet normal 0 -1 0\nouter loop\nvertex 0 0 0\nvertex 2 0 2\nvertex 0 0 2\nendloop\nendfacet\n",
        "facet normal 0 1 0\nouter loop\nvertex 0 2 0\nvertex 0 2 2\nvertex 2 2 2\nendloop\nendfacet\n",
        "facet normal 0 1 0\nouter loop\nvertex 0 2 0\nvertex 2 2 2\nvertex 2 2 0\nendloop\nendfacet\n",
        "facet normal -1 0 0\nouter loop\nvertex 0 0 0\nvertex 0 0 2\nvertex 0 2 2\nendloop\nendfacet\n",
        "facet normal -1 0 0\nouter loop\nvertex 0 0 0\nvertex 0 2 2\nvertex 0 2 0\nendloop\nendfacet\n",
        "facet normal 1 0 0\nouter loop\nvertex 2 0 0\nvertex 2 2 2\nvertex 2 0 2\nendloop\nendfacet\n",
        "facet normal 1 0 0\nouter loop\nvertex 2 0 0\nvertex 2 2 0\nvertex 2 2 2\nendloop\nendfacet\n",
        "endsolid cube\n",
    );

    /// Writes a fixture "openscad" that records one invocation per call
    /// (by appending to a counter file next to itself) and always emits
    /// the same 12-facet cube mesh, so cache-hit behavior is observable
    /// from the outside without reaching into backend internals.
    fn write_counting_fixture(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("openscad");
        let script = format!(
            "#!/bin/sh\nscript_dir=$(dirname \"$0\")\necho invoked >> \"$script_dir/invocations.count\"\noutput=\"$2\"\nprintf '%s' '{CUBE_STL}' > \"$output\"\nexit 0\n"
        );
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn local_coordinator(binary: std::path::PathBuf) -> RenderCoordinator {
        let config = EngineConfig::builder()
            .preferred_backend(PreferredBackend::Local)
            .build()
            .unwrap();
        RenderCoordinator::builder(config)
            .local_backend(LocalBackend::new(binary), "local:2021.01.27")
            .bus(inert_bus())
            .build()
    }

    #[tokio::test]
    async fn cube_renders_ascii_stl_with_twelve_facets() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_counting_fixture(dir.path());
        let coordinator = local_coordinator(binary);

        coordinator.set_scad_code("cube([2,2,2]);").await;

        let state = coordinator.state();
        assert_eq!(state.renderer_status, RendererStatus::Success);
        assert!(state.stl_data.starts_with("solid "));
        assert!(state.stl_data.matches("facet normal").count() >= 12);
    }

    #[tokio::test]
    async fn second_identical_render_is_served_from_cache_without_a_second_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let binary = write_counting_fixture(dir.path());
        let coordinator = local_coordinator(binary);

        coordinator.set_scad_code("cube([1,1,1]);").await;
        coordinator.set_scad_code("cube([1,1,1]);").await;

        let counter_path = dir.path().join("invocations.count");
        let invocations = std::fs::read_to_string(&counter_path).unwrap();
        assert_eq!(invocations.lines().count(), 1, "backend should only be invoked once for two identical renders");

        let state = coordinator.state();
        assert_eq!(state.renderer_status, RendererStatus::Success);
    }
}

#[tokio::test]
async fn sentinel_is_published_before_the_executor_responds() {
    let dir = tempfile::tempdir().unwrap();
    write_valid_wasm_assets(dir.path());
    let (coordinator, executor) = wasm_coordinator(dir.path(), PreferredBackend::Wasm, Duration::from_millis(500));
    executor.queue_hang().await;
    let coordinator = Arc::new(coordinator);

    let mut watch = coordinator.subscribe();
    let driver = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.set_scad_code("sphere(r=1);").await }
    });

    let expected_fp = Fingerprint::compute(
        &ScadSource::new("sphere(r=1);").canonicalize(),
        "wasm:2022.03.20",
    );
    let expected_sentinel = format!("WASM_RENDER_REQUEST:{expected_fp}");

    loop {
        watch.changed().await.unwrap();
        if watch.borrow().stl_data == expected_sentinel {
            break;
        }
    }

    // Let the hung request time out so the background driver task can
    // finish cleanly instead of leaking past the end of the test.
    let _ = driver.await;
}

#[tokio::test]
async fn cache_hit_avoids_a_second_wasm_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    write_valid_wasm_assets(dir.path());
    let (coordinator, executor) = wasm_coordinator(dir.path(), PreferredBackend::Wasm, Duration::from_secs(5));
    executor.queue_stl(b"solid a\nendsolid a\n".to_vec()).await;

    coordinator.set_scad_code("cube([1,1,1]);").await;
    coordinator.set_scad_code("cube([1,1,1]);").await;

    let state = coordinator.state();
    assert_eq!(state.stl_data, "solid a\nendsolid a\n");
    assert_eq!(state.renderer_status, RendererStatus::Success);
}

#[tokio::test]
async fn supersession_only_publishes_the_newer_fingerprints_result() {
    let dir = tempfile::tempdir().unwrap();
    write_valid_wasm_assets(dir.path());
    let (coordinator, _executor) = wasm_coordinator(dir.path(), PreferredBackend::Wasm, Duration::from_secs(5));
    let coordinator = Arc::new(coordinator);

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.set_scad_code("cube([1,1,1]);").await }
    });
    // Give the first render a chance to reach the bus await point (it has
    // no other suspension point before that) before dispatching the
    // superseding revision.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    coordinator.set_scad_code("cube([2,2,2]);").await;
    first.await.unwrap();

    let expected_fp = Fingerprint::compute(
        &ScadSource::new("cube([2,2,2]);").canonicalize(),
        "wasm:2022.03.20",
    );
    let state = coordinator.state();
    assert_eq!(state.renderer_status, RendererStatus::Success);
    assert!(
        state.stl_data.trim_end().ends_with(&format!("endsolid {expected_fp}")),
        "published stl_data should reflect only the second (superseding) fingerprint, got {:?}",
        state.stl_data
    );
}

#[tokio::test]
async fn preferred_local_falls_back_to_wasm_when_no_local_tool_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    write_valid_wasm_assets(dir.path());

    let config = EngineConfig::builder()
        .preferred_backend(PreferredBackend::Local)
        .fallback_enabled(true)
        .build()
        .unwrap();

    let (tx, rx) = mpsc::unbounded_channel();
    let bus = MessageBus::new(tx);
    let executor = Arc::new(MockExecutor::new());
    spawn_mock_executor(bus.clone(), rx, executor.clone());
    executor.queue_hang().await;

    let wasm_backend = WasmBackend::new(dir.path(), "file:///wasm");
    let coordinator = RenderCoordinator::builder(config)
        // No `.local_backend(..)` call: the local backend is entirely
        // unconfigured, matching "no local tool present".
        .wasm_backend(wasm_backend, "wasm:2022.03.20")
        .bus(bus)
        .host_kind(HostKind::Native)
        .build();
    let coordinator = Arc::new(coordinator);

    let mut watch = coordinator.subscribe();
    let driver = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.set_scad_code("cube([1,1,1]);").await }
    });

    loop {
        watch.changed().await.unwrap();
        if scad_bus::is_sentinel(&watch.borrow().stl_data) {
            break;
        }
    }

    drop(driver);
}

#[tokio::test]
async fn bus_timeout_surfaces_as_an_error_containing_the_timeout_token() {
    let dir = tempfile::tempdir().unwrap();
    write_valid_wasm_assets(dir.path());
    let (coordinator, executor) = wasm_coordinator(dir.path(), PreferredBackend::Wasm, Duration::from_millis(50));
    executor.queue_hang().await;

    coordinator.set_scad_code("cube([1,1,1]);").await;

    let state = coordinator.state();
    assert_eq!(state.renderer_status, RendererStatus::Error);
    assert!(state.error_message.to_lowercase().contains("timed out") || state.error_message.to_lowercase().contains("timeout"));
    assert!(!state.is_loading);
}

#[tokio::test]
async fn memory_ceiling_error_is_surfaced_without_being_cached() {
    let dir = tempfile::tempdir().unwrap();
    write_valid_wasm_assets(dir.path());
    let (coordinator, executor) = wasm_coordinator(dir.path(), PreferredBackend::Wasm, Duration::from_secs(5));
    executor.queue_error(ResponseError::Memory).await;

    coordinator.set_scad_code("cube([1,1,1]);").await;

    let state = coordinator.state();
    assert_eq!(state.renderer_status, RendererStatus::Error);
}
