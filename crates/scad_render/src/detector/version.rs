use serde::Deserialize;

use super::types::VersionTuple;

/// Parses the version tuple out of `<binary> --version` output, e.g.
/// `"OpenSCAD version 2021.01.27"` or `"OpenSCAD version 2021.01"`.
/// Release dates are treated as `major.minor.patch` with `patch`
/// defaulting to `0` when the third component is absent.
pub fn parse_local_version(output: &str) -> Option<VersionTuple> {
    for token in output.split_whitespace() {
        let candidate = token.trim_matches(|c: char| matches!(c, '(' | ')' | ',' | ';'));
        if let Some(version) = parse_dotted_version(candidate) {
            return Some(version);
        }
    }
    None
}

fn parse_dotted_version(token: &str) -> Option<VersionTuple> {
    let mut parts = token.split('.');
    let major: u64 = parts.next()?.parse().ok()?;
    let minor: u64 = parts.next()?.parse().ok()?;
    let patch: u64 = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }
    // OpenSCAD's date-based scheme uses a 4-digit year; reject short
    // tokens like a random "1.2" that slipped in as an unrelated flag.
    if major < 1000 {
        return None;
    }
    Some(VersionTuple { major, minor, patch })
}

#[derive(Deserialize)]
struct WasmManifest {
    version: Option<String>,
}

/// Parses the `version` field out of a bundled `manifest.json`.
pub fn parse_wasm_manifest(json_text: &str) -> Option<VersionTuple> {
    let manifest: WasmManifest = serde_json::from_str(json_text).ok()?;
    let raw = manifest.version?;
    parse_dotted_version(raw.trim_start_matches('v'))
}
