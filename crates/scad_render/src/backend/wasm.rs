use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use scad_bus::{format_sentinel, Fingerprint};

use crate::error::RenderError;

const MIN_MODULE_BYTES: u64 = 1024 * 1024;
const WASM_MAGIC: [u8; 4] = *b"\0asm";
const MODULE_FILENAME: &str = "openscad.wasm";
const RUNTIME_FILENAME: &str = "openscad.js";

/// Host side of the WASM backend. Executes no WebAssembly
/// itself: publishes the asset base URL the remote executor fetches the
/// module from, validates that the bundled assets are plausible before a
/// render is attempted, and hands back the `WASM_RENDER_REQUEST:<fingerprint>`
/// sentinel in place of STL bytes.
pub struct WasmBackend {
    asset_root: PathBuf,
    base_url: String,
    request_count: AtomicU64,
}

impl WasmBackend {
    pub fn new(asset_root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            asset_root: asset_root.into(),
            base_url: base_url.into(),
            request_count: AtomicU64::new(0),
        }
    }

    pub fn asset_root(&self) -> &Path {
        &self.asset_root
    }

    pub fn asset_base_url(&self) -> &str {
        &self.base_url
    }

    /// Validates that `openscad.wasm` has a plausible size and the
    /// correct WASM magic header, and that `openscad.js` exists.
    /// Failure here is what drives the selector's fallback decision.
    pub fn validate_assets(&self) -> Result<(), RenderError> {
        validate_wasm_module(&self.asset_root.join(MODULE_FILENAME))?;
        let runtime = self.asset_root.join(RUNTIME_FILENAME);
        if !runtime.is_file() {
            return Err(RenderError::AssetMissing(runtime));
        }
        Ok(())
    }

    /// Produces the sentinel placeholder for `fingerprint` and records
    /// that a render was requested. This is the coordinator→executor
    /// request, not a real render: the actual WASM execution happens on
    /// the remote executor after it recognizes the sentinel.
    pub fn request_render(&self, fingerprint: Fingerprint) -> String {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        format_sentinel(fingerprint)
    }

    /// Number of renders requested through this backend since construction.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}

pub(crate) fn validate_wasm_module(path: &Path) -> Result<(), RenderError> {
    let metadata = fs::metadata(path).map_err(|_| RenderError::AssetMissing(path.to_path_buf()))?;
    if metadata.len() < MIN_MODULE_BYTES {
        return Err(RenderError::AssetMissing(path.to_path_buf()));
    }

    let mut file = fs::File::open(path).map_err(|_| RenderError::AssetMissing(path.to_path_buf()))?;
    let mut header = [0u8; 4];
    file.read_exact(&mut header)
        .map_err(|_| RenderError::AssetMissing(path.to_path_buf()))?;
    if header != WASM_MAGIC {
        return Err(RenderError::AssetMissing(path.to_path_buf()));
    }
    Ok(())
}
