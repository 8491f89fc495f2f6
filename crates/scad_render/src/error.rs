use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use scad_bus::BusError;

/// Errors surfaced by the render coordination engine: the backend error
/// taxonomy, extended with the operational failures specific to spawning
/// and supervising a local backend process.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Neither the local binary nor the WASM assets could be located.
    #[error("no usable OpenSCAD installation found (local binary or WASM assets)")]
    ToolMissing,

    /// A configured asset path (WASM module, manifest, asset root) does
    /// not exist or is not readable.
    #[error("required asset missing: {}", .0.display())]
    AssetMissing(PathBuf),

    /// The backend reported a parse/syntax failure in the SCAD source.
    #[error("SCAD syntax error: {message}")]
    SyntaxError { message: String },

    /// The backend parsed the source but could not produce valid
    /// geometry from it (e.g. a non-manifold result, empty mesh).
    #[error("SCAD geometry error: {message}")]
    GeometryError { message: String },

    /// The backend or bus exceeded its allotted deadline.
    #[error("render timed out after {0:?}")]
    Timeout(Duration),

    /// The backend reported exceeding a configured memory ceiling.
    #[error("render exceeded the configured memory ceiling")]
    Memory,

    /// The render was superseded by a newer request before it completed.
    /// Silent by design: matched explicitly by the coordinator, never
    /// surfaced to a user as a failure.
    #[error("render was cancelled (superseded)")]
    Cancelled,

    /// Catch-all for backend failures that do not map to a more specific
    /// variant, tagged with which backend produced it.
    #[error("{backend} backend reported an error: {message}")]
    Unknown { backend: String, message: String },

    /// Failed to spawn the local backend's subprocess.
    #[error("failed to spawn `{}`: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while preparing the scoped render workspace or reading
    /// the backend's output artifact.
    #[error("workspace I/O error: {0}")]
    Workspace(#[source] std::io::Error),

    /// Catch-all for bus-level failures with no closer `RenderError`
    /// analogue (a dropped/unknown response id, a closed outbound
    /// channel, an executor error the bus could not classify further).
    #[error(transparent)]
    Bus(BusError),

    /// A configuration value failed validation (e.g. malformed TOML, a
    /// cache budget of zero).
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Converts a bus-level error into the matching render error variant
/// rather than always collapsing into `RenderError::Bus`, so a
/// WASM/remote-sourced syntax or geometry error surfaces the same way a
/// local-backend one does (spec §7: `SyntaxError`/`GeometryError` are
/// surfaced verbatim regardless of which backend produced them).
impl From<BusError> for RenderError {
    fn from(error: BusError) -> Self {
        match error {
            BusError::Timeout(deadline) => RenderError::Timeout(deadline),
            BusError::Cancelled => RenderError::Cancelled,
            BusError::Memory => RenderError::Memory,
            BusError::SyntaxError { message } => RenderError::SyntaxError { message },
            BusError::GeometryError { message } => RenderError::GeometryError { message },
            other => RenderError::Bus(other),
        }
    }
}

impl RenderError {
    /// True for errors that are expected control flow rather than
    /// failures and must never be shown to the end user.
    pub fn is_silent(&self) -> bool {
        match self {
            RenderError::Cancelled => true,
            RenderError::Bus(inner) => inner.is_silent(),
            _ => false,
        }
    }
}
