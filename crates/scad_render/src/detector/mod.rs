pub mod types;
pub mod version;

use std::path::{Path, PathBuf};

pub use types::{Capability, InstallationKind, InstallationRecord, VersionTuple};

use crate::backend::wasm::validate_wasm_module;

/// Well-known relative layout a bundled WASM asset directory is expected
/// to follow: `<root>/{openscad.wasm, openscad.js, manifest.json}`.
const WASM_MODULE_FILENAME: &str = "openscad.wasm";
const WASM_RUNTIME_FILENAME: &str = "openscad.js";
const WASM_MANIFEST_FILENAME: &str = "manifest.json";

/// Scans platform-conventional locations for a native OpenSCAD binary and
/// bundled WASM asset directories, producing immutable [`InstallationRecord`]s.
/// Detection results are not cached by this type itself — the engine
/// detects once at startup and holds the resulting records for the life
/// of the process.
pub struct Detector {
    asset_root: Option<PathBuf>,
    binary_override: Option<PathBuf>,
}

impl Detector {
    pub fn new(asset_root: Option<PathBuf>) -> Self {
        Self {
            asset_root,
            binary_override: None,
        }
    }

    /// Overrides PATH lookup with an explicit binary path, e.g. from an
    /// `OPENSCAD_BINARY` environment variable or host-supplied config.
    pub fn with_binary_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_override = Some(path.into());
        self
    }

    /// Locates a native OpenSCAD binary and probes `--version`.
    pub async fn detect_local(&self) -> Option<InstallationRecord> {
        let path = match &self.binary_override {
            Some(path) => Some(path.clone()),
            None => which::which("openscad").ok(),
        }?;

        let output = tokio::process::Command::new(&path)
            .arg("--version")
            .output()
            .await
            .ok()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let version = version::parse_local_version(&text).unwrap_or_default();
        Some(InstallationRecord {
            kind: InstallationKind::Local,
            version,
            path: Some(path),
            capabilities: local_capabilities(version),
            available: true,
        })
    }

    /// Looks for a bundled WASM asset directory at the configured
    /// `asset_root`, falling back to platform-conventional data
    /// directories.
    pub fn detect_wasm(&self) -> Option<InstallationRecord> {
        let candidates = self
            .asset_root
            .clone()
            .into_iter()
            .chain(platform_asset_dirs());

        candidates.into_iter().find_map(|root| wasm_record_at(&root))
    }

    /// All discovered installations, ranked by `(kind_priority, version_desc)`:
    /// local first, then bundled WASM, then a system-wide WASM install, and
    /// newer versions ahead of older ones within the same kind.
    pub async fn detect_all(&self) -> Vec<InstallationRecord> {
        let mut installations = Vec::new();
        if let Some(local) = self.detect_local().await {
            installations.push(local);
        }
        if let Some(wasm) = self.detect_wasm() {
            installations.push(wasm);
        }
        installations.sort_by(|a, b| {
            a.kind
                .default_priority()
                .cmp(&b.kind.default_priority())
                .then_with(|| b.version.as_semver().cmp(&a.version.as_semver()))
        });
        installations
    }

    /// The single preferred installation under the default ranking.
    pub async fn preferred(&self) -> Option<InstallationRecord> {
        self.detect_all().await.into_iter().next()
    }
}

fn wasm_record_at(root: &Path) -> Option<InstallationRecord> {
    let module = root.join(WASM_MODULE_FILENAME);
    let runtime = root.join(WASM_RUNTIME_FILENAME);
    if !runtime.is_file() {
        return None;
    }
    let valid = validate_wasm_module(&module).is_ok();

    let manifest_path = root.join(WASM_MANIFEST_FILENAME);
    let version = std::fs::read_to_string(&manifest_path)
        .ok()
        .and_then(|text| version::parse_wasm_manifest(&text))
        .unwrap_or_default();

    Some(InstallationRecord {
        kind: InstallationKind::WasmBundled,
        version,
        path: Some(root.to_path_buf()),
        capabilities: wasm_capabilities(root),
        available: valid,
    })
}

fn local_capabilities(version: VersionTuple) -> Vec<Capability> {
    let mut capabilities = vec![Capability::Offline, Capability::Binstl, Capability::Fonts];
    if version.major >= 2023 {
        capabilities.push(Capability::Manifold);
    }
    capabilities
}

fn wasm_capabilities(root: &Path) -> Vec<Capability> {
    let mut capabilities = vec![Capability::Offline, Capability::Binstl, Capability::Fonts];
    if root.join("MCAD.zip").is_file() {
        capabilities.push(Capability::Mcad);
    }
    capabilities
}

/// Platform-conventional directories a bundled WASM asset tree might live
/// under when the host did not configure an explicit `asset_root`.
fn platform_asset_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(data_dir) = dirs::data_local_dir() {
        dirs.push(data_dir.join("marimo-openscad").join("wasm"));
    }
    dirs
}

/// Resolves the URL a client-side executor should fetch WASM assets from.
/// Injectable by the host: the correct scheme for non-file hosts (a CDN,
/// a notebook-server-relative path) is underspecified by the source
/// system, so this engine exposes the seam rather than guessing.
pub trait AssetUrlResolver: Send + Sync {
    fn resolve(&self, asset_root: &Path) -> String;
}

/// Default resolver used when the host does not supply one: a `file://`
/// URL, appropriate for a local desktop notebook kernel but not for a
/// hosted/browser-only deployment.
pub struct FileUrlResolver;

impl AssetUrlResolver for FileUrlResolver {
    fn resolve(&self, asset_root: &Path) -> String {
        format!("file://{}", asset_root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_min_wasm(path: &Path, valid_magic: bool, size: usize) {
        let mut file = std::fs::File::create(path).unwrap();
        if valid_magic {
            file.write_all(&[0x00, 0x61, 0x73, 0x6d]).unwrap();
        } else {
            file.write_all(&[0xff, 0xff, 0xff, 0xff]).unwrap();
        }
        let padding = vec![0u8; size.saturating_sub(4)];
        file.write_all(&padding).unwrap();
    }

    #[test]
    fn detects_wasm_bundle_with_valid_assets() {
        let dir = tempfile::tempdir().unwrap();
        write_min_wasm(&dir.path().join(WASM_MODULE_FILENAME), true, 2 * 1024 * 1024);
        std::fs::write(dir.path().join(WASM_RUNTIME_FILENAME), "// runtime").unwrap();
        std::fs::write(
            dir.path().join(WASM_MANIFEST_FILENAME),
            r#"{"version": "2022.03.20"}"#,
        )
        .unwrap();

        let detector = Detector::new(Some(dir.path().to_path_buf()));
        let record = detector.detect_wasm().expect("expected a wasm record");
        assert!(record.available);
        assert_eq!(record.version, VersionTuple { major: 2022, minor: 3, patch: 20 });
        assert_eq!(record.kind, InstallationKind::WasmBundled);
    }

    #[test]
    fn marks_wasm_unavailable_when_module_header_is_wrong() {
        let dir = tempfile::tempdir().unwrap();
        write_min_wasm(&dir.path().join(WASM_MODULE_FILENAME), false, 2 * 1024 * 1024);
        std::fs::write(dir.path().join(WASM_RUNTIME_FILENAME), "// runtime").unwrap();

        let detector = Detector::new(Some(dir.path().to_path_buf()));
        let record = detector.detect_wasm().expect("expected a wasm record");
        assert!(!record.available);
    }

    #[test]
    fn returns_none_when_runtime_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        write_min_wasm(&dir.path().join(WASM_MODULE_FILENAME), true, 2 * 1024 * 1024);
        let detector = Detector::new(Some(dir.path().to_path_buf()));
        assert!(detector.detect_wasm().is_none());
    }

    #[test]
    fn default_ordering_prefers_local_over_wasm() {
        assert!(InstallationKind::Local.default_priority() < InstallationKind::WasmBundled.default_priority());
        assert!(InstallationKind::WasmBundled.default_priority() < InstallationKind::WasmSystem.default_priority());
    }

    #[test]
    fn file_url_resolver_formats_a_file_scheme_url() {
        let resolver = FileUrlResolver;
        let url = resolver.resolve(Path::new("/opt/assets/wasm"));
        assert_eq!(url, "file:///opt/assets/wasm");
    }

    fn record(kind: InstallationKind, version: VersionTuple) -> InstallationRecord {
        InstallationRecord {
            kind,
            version,
            path: None,
            capabilities: Vec::new(),
            available: true,
        }
    }

    #[test]
    fn ranks_by_kind_then_by_newest_version_first() {
        let mut installations = vec![
            record(InstallationKind::WasmBundled, VersionTuple { major: 2023, minor: 1, patch: 0 }),
            record(InstallationKind::Local, VersionTuple { major: 2021, minor: 1, patch: 27 }),
            record(InstallationKind::Local, VersionTuple { major: 2023, minor: 1, patch: 0 }),
        ];
        installations.sort_by(|a, b| {
            a.kind
                .default_priority()
                .cmp(&b.kind.default_priority())
                .then_with(|| b.version.as_semver().cmp(&a.version.as_semver()))
        });
        assert_eq!(installations[0].kind, InstallationKind::Local);
        assert_eq!(installations[0].version.major, 2023);
        assert_eq!(installations[1].kind, InstallationKind::Local);
        assert_eq!(installations[1].version.major, 2021);
        assert_eq!(installations[2].kind, InstallationKind::WasmBundled);
    }
}
