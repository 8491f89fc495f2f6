use std::fmt;

use serde::{Deserialize, Serialize};

/// Content-derived cache key: a signed 64-bit digest over a canonicalized
/// SCAD source plus a backend discriminator (e.g. `local:2021.01` or
/// `wasm:2022.03.20`).
///
/// Equal fingerprints imply equivalent render outputs for a given backend
/// version; fingerprints are the cache key for [`crate::Cache`]-style
/// consumers and the payload of the [`Sentinel`] wire token.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(i64);

impl Fingerprint {
    /// Computes a stable digest over canonicalized SCAD source and a
    /// backend discriminator string (e.g. `"local:2021.01"`).
    ///
    /// Uses FNV-1a rather than reusing a language-runtime `hash()` builtin:
    /// the original Python implementation hashed with the interpreter's
    /// per-process-salted `hash()`, which is unstable across processes and
    /// therefore unsuitable as a durable cache key (see DESIGN.md).
    pub fn compute(canonical_source: &str, backend_discriminator: &str) -> Self {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = FNV_OFFSET;
        for byte in canonical_source
            .as_bytes()
            .iter()
            .chain(b":".iter())
            .chain(backend_discriminator.as_bytes().iter())
        {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        Fingerprint(hash as i64)
    }

    /// Returns the raw signed value, e.g. for persistence or logging.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Wraps a raw value directly; used by tests and snapshot round-trips.
    pub const fn from_raw(value: i64) -> Self {
        Fingerprint(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Fingerprint {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Fingerprint)
    }
}
