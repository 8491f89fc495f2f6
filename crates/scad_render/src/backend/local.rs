use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command;
use tokio::time;
use tracing::debug;

use crate::error::RenderError;
use crate::process::{spawn_with_retry, tee_stream, ConsoleTarget};

/// Invokes a native OpenSCAD binary over a scoped temporary workspace.
/// Every exit path — success, classified failure, timeout,
/// or an early return from `?` — drops the [`TempDir`] and releases the
/// workspace, including on panic/unwind, since `TempDir`'s `Drop` runs
/// during unwinding.
pub struct LocalBackend {
    binary: PathBuf,
    invocation_count: AtomicU64,
}

impl LocalBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            invocation_count: AtomicU64::new(0),
        }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary
    }

    /// Number of times the subprocess was actually spawned since
    /// construction. Exposed for tests (e.g. confirming a cache hit serves
    /// a second identical render without re-invoking the backend).
    pub fn invocation_count(&self) -> u64 {
        self.invocation_count.load(Ordering::Relaxed)
    }

    /// Renders `scad` and returns the raw STL bytes OpenSCAD produced
    /// (ASCII or binary, whichever this installation defaults to).
    /// Classifies non-zero exits into syntax, geometry, and tool errors;
    /// `ToolMissing` is returned when the binary itself cannot be spawned
    /// at all.
    pub async fn render(&self, scad: &str, deadline: Duration) -> Result<Vec<u8>, RenderError> {
        self.invocation_count.fetch_add(1, Ordering::Relaxed);
        let workspace = tempfile::tempdir().map_err(RenderError::Workspace)?;
        self.render_in(&workspace, scad, deadline).await
    }

    async fn render_in(
        &self,
        workspace: &TempDir,
        scad: &str,
        deadline: Duration,
    ) -> Result<Vec<u8>, RenderError> {
        let input_path = workspace.path().join("input.scad");
        let output_path = workspace.path().join("output.stl");
        std::fs::write(&input_path, scad).map_err(RenderError::Workspace)?;

        let mut command = Command::new(&self.binary);
        command
            .arg("-o")
            .arg(&output_path)
            .arg(&input_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), "spawning local openscad backend");
        let mut child = match spawn_with_retry(&mut command, &self.binary) {
            Ok(child) => child,
            Err(RenderError::Spawn { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                return Err(RenderError::ToolMissing);
            }
            Err(error) => return Err(error),
        };

        let stdout = child.stdout.take().expect("stdout piped at spawn");
        let stderr = child.stderr.take().expect("stderr piped at spawn");

        let stdout_task = tokio::spawn(tee_stream(stdout, ConsoleTarget::Stdout, false));
        let stderr_task = tokio::spawn(tee_stream(stderr, ConsoleTarget::Stderr, false));

        let wait = async {
            let status = child.wait().await.map_err(RenderError::Workspace)?;
            let stderr_bytes = stderr_task
                .await
                .map_err(|_| RenderError::Unknown {
                    backend: "local".to_string(),
                    message: "stderr capture task panicked".to_string(),
                })?
                .map_err(RenderError::Workspace)?;
            let _ = stdout_task.await;
            Ok::<_, RenderError>((status, stderr_bytes))
        };

        let (status, stderr_bytes) = match time::timeout(deadline, wait).await {
            Ok(result) => result?,
            Err(_) => return Err(RenderError::Timeout(deadline)),
        };

        if !status.success() {
            let message = String::from_utf8_lossy(&stderr_bytes).into_owned();
            return Err(classify_failure(&message));
        }

        std::fs::read(&output_path).map_err(RenderError::Workspace)
    }
}

/// Classifies OpenSCAD's stderr on a non-zero exit into one of the error
/// kinds above. Text matching against a real binary's wording is
/// inherently heuristic; unmatched failures fall through to `Unknown`
/// rather than being misclassified.
fn classify_failure(stderr: &str) -> RenderError {
    let lower = stderr.to_lowercase();
    if lower.contains("parser error") || lower.contains("syntax error") || lower.contains("parse error") {
        RenderError::SyntaxError {
            message: stderr.to_string(),
        }
    } else if lower.contains("non-manifold")
        || lower.contains("empty geometry")
        || lower.contains("current top level object is empty")
    {
        RenderError::GeometryError {
            message: stderr.to_string(),
        }
    } else if lower.contains("no such file or directory") || lower.contains("command not found") {
        RenderError::ToolMissing
    } else {
        RenderError::Unknown {
            backend: "local".to_string(),
            message: stderr.to_string(),
        }
    }
}
