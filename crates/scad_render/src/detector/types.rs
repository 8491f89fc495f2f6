use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which kind of installation an [`InstallationRecord`] describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationKind {
    Local,
    WasmBundled,
    WasmSystem,
}

impl InstallationKind {
    /// Default ranking priority: local outranks wasm-bundled outranks
    /// wasm-system. Lower is preferred. Reversible via configuration by
    /// sorting with a caller-supplied comparator instead.
    pub fn default_priority(self) -> u8 {
        match self {
            InstallationKind::Local => 0,
            InstallationKind::WasmBundled => 1,
            InstallationKind::WasmSystem => 2,
        }
    }
}

/// A capability flag an installation may or may not support.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Manifold,
    Fonts,
    Mcad,
    Binstl,
    Offline,
}

/// Parsed `major.minor.patch` for a detected installation. Kept separate
/// from `semver::Version` because OpenSCAD version strings (`2021.01`)
/// don't always fit semver's three-dotted-integer shape.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VersionTuple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl std::fmt::Display for VersionTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl VersionTuple {
    /// Projects this tuple onto a `semver::Version` purely for comparison,
    /// the same way a CLI's raw version string gets parsed into
    /// `semver::Version` before ranking releases. OpenSCAD's
    /// date-based scheme (`2021.01.27`) happens to fit semver's
    /// major/minor/patch shape even though it isn't semantic versioning.
    pub fn as_semver(self) -> semver::Version {
        semver::Version::new(self.major, self.minor, self.patch)
    }
}

/// Immutable snapshot of one discovered OpenSCAD installation, produced by
/// the detector at startup or on demand and never mutated afterward for
/// the life of the process.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstallationRecord {
    pub kind: InstallationKind,
    pub version: VersionTuple,
    pub path: Option<PathBuf>,
    pub capabilities: Vec<Capability>,
    pub available: bool,
}

impl InstallationRecord {
    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Discriminator string fed into [`scad_bus::Fingerprint::compute`] so
    /// the same SCAD source hashes differently per backend/version.
    pub fn fingerprint_discriminator(&self) -> String {
        let tag = match self.kind {
            InstallationKind::Local => "local",
            InstallationKind::WasmBundled | InstallationKind::WasmSystem => "wasm",
        };
        format!("{tag}:{}", self.version)
    }
}
