use crate::Fingerprint;

/// Transport-safe placeholder the WASM backend returns in place of STL
/// bytes: `WASM_RENDER_REQUEST:<fingerprint>`.
///
/// It is the coordinator→executor request, straddling the synchronous
/// backend interface and the asynchronous execution boundary without
/// forcing a typed "future" through the widget sync layer.
pub const SENTINEL_PREFIX: &str = "WASM_RENDER_REQUEST:";

/// ASCII STL always begins with this literal, which is how a consumer
/// distinguishes a sentinel from real mesh content without parsing.
pub const STL_ASCII_PREFIX: &str = "solid ";

/// Formats the sentinel token for a fingerprint. Deterministic in the
/// fingerprint alone, so two renders of the same SCAD source produce an
/// identical sentinel.
pub fn format_sentinel(fingerprint: Fingerprint) -> String {
    format!("{SENTINEL_PREFIX}{fingerprint}")
}

/// Parses a sentinel token back into its fingerprint. Returns `None` for
/// anything that is not exactly `WASM_RENDER_REQUEST:<signed integer>`.
pub fn parse_sentinel(value: &str) -> Option<Fingerprint> {
    let rest = value.strip_prefix(SENTINEL_PREFIX)?;
    rest.parse::<Fingerprint>().ok()
}

/// True when `value` looks like a sentinel by prefix alone (used by the
/// remote executor to route `stl_data` without attempting to parse STL).
pub fn is_sentinel(value: &str) -> bool {
    value.starts_with(SENTINEL_PREFIX)
}

/// True when `value` looks like ASCII STL content by prefix alone.
pub fn is_ascii_stl(value: &str) -> bool {
    value.starts_with(STL_ASCII_PREFIX)
}
