//! File injection into the sandbox.
//!
//! Writes a batch of generated files under the project root, creating
//! parent directories and verifying every write by reading the content
//! back. Injection is best-effort per file: a bad path or a failed
//! verification marks that file failed and the batch moves on. Only an
//! unreachable platform aborts.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::platform::{ExecRequest, PlatformError, SandboxHandle};

/// One generated file to place in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the project root
    pub path: String,
    pub content: String,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Content size in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }
}

/// Per-file outcome of one injection batch.
#[derive(Debug, Default)]
pub struct InjectionReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

impl InjectionReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Reject paths that would escape the project root or break shell quoting.
fn validate_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("empty path");
    }
    if path.starts_with('/') {
        return Err("absolute path");
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err("path traversal");
    }
    if path.contains('\'') || path.contains('\n') || path.contains('\0') {
        return Err("unsupported character in path");
    }
    Ok(())
}

/// Write `files` under `project_root`, verifying each by read-back.
///
/// Individual failures are collected in the report; only a transport
/// error returns `Err` and aborts the batch.
pub async fn inject(
    sandbox: &dyn SandboxHandle,
    project_root: &str,
    files: &[FileEntry],
) -> Result<InjectionReport, PlatformError> {
    let root = project_root.trim_end_matches('/');
    let mut report = InjectionReport::default();

    for file in files {
        if let Err(reason) = validate_path(&file.path) {
            warn!(path = %file.path, "Rejecting file: {reason}");
            report.failed.push(file.path.clone());
            continue;
        }

        let full_path = format!("{root}/{}", file.path);

        if let Err(e) = ensure_parent_dir(sandbox, &full_path).await {
            if e.is_transport() {
                return Err(e);
            }
            warn!(path = %file.path, "Failed to create parent directory: {e}");
            report.failed.push(file.path.clone());
            continue;
        }

        if let Err(e) = sandbox.write_file(&full_path, &file.content).await {
            if e.is_transport() {
                return Err(e);
            }
            warn!(path = %file.path, "Failed to write file: {e}");
            report.failed.push(file.path.clone());
            continue;
        }

        // Verify the write round-trips byte for byte
        match sandbox.read_file(&full_path).await {
            Ok(stored) if stored == file.content => {
                debug!(path = %file.path, bytes = file.size(), "Injected file");
                report.succeeded.push(file.path.clone());
            }
            Ok(_) => {
                warn!(path = %file.path, "Read-back verification mismatch");
                report.failed.push(file.path.clone());
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                warn!(path = %file.path, "Read-back failed: {e}");
                report.failed.push(file.path.clone());
            }
        }
    }

    if !report.failed.is_empty() {
        match sandbox.list_dir(root).await {
            Ok(entries) => debug!(?entries, "Project root contents after partial injection"),
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => debug!("Could not list project root: {e}"),
        }
    }

    debug!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        "Injection batch complete"
    );

    Ok(report)
}

async fn ensure_parent_dir(
    sandbox: &dyn SandboxHandle,
    full_path: &str,
) -> Result<(), PlatformError> {
    let Some((dir, _)) = full_path.rsplit_once('/') else {
        return Ok(());
    };

    let output = sandbox
        .exec(ExecRequest::new(format!("mkdir -p '{dir}'")))
        .await?;

    if !output.success() {
        return Err(PlatformError::api(
            500,
            format!("mkdir failed: {}", output.stderr.trim()),
        ));
    }

    Ok(())
}
