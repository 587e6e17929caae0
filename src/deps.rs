//! Dependency manifest updates and install.
//!
//! Merges requested packages into the project's `package.json` and runs
//! the configured install command. Install problems are surfaced as
//! warnings rather than failures; a server that cannot start because of
//! them is caught by validation downstream.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::InstallConfig;
use crate::platform::{ExecRequest, PlatformError, SandboxHandle};

/// Split a requirement like `react@19.0.0` into name and version.
///
/// A bare name means `latest`. Scoped packages keep their leading `@`.
pub(crate) fn parse_requirement(spec: &str) -> (String, String) {
    match spec.char_indices().skip(1).find(|(_, c)| *c == '@') {
        Some((at, _)) => (spec[..at].to_string(), spec[at + 1..].to_string()),
        None => (spec.to_string(), "latest".to_string()),
    }
}

/// Merge `requirements` into the manifest and run the install command.
///
/// Requested versions win over versions already in the manifest. With no
/// requirements this is a no-op. Only a transport error returns `Err`.
pub async fn add_dependencies(
    sandbox: &dyn SandboxHandle,
    project_root: &str,
    config: &InstallConfig,
    requirements: &[String],
) -> Result<(), PlatformError> {
    if requirements.is_empty() {
        debug!("No extra dependencies requested, skipping install");
        return Ok(());
    }

    let root = project_root.trim_end_matches('/');
    let manifest_path = format!("{root}/package.json");

    match read_manifest(sandbox, &manifest_path).await? {
        Some(mut manifest) => {
            let deps = manifest
                .as_object_mut()
                .and_then(|obj| {
                    obj.entry("dependencies")
                        .or_insert_with(|| json!({}))
                        .as_object_mut()
                });
            match deps {
                Some(deps) => {
                    for spec in requirements {
                        let (name, version) = parse_requirement(spec);
                        deps.insert(name, json!(version));
                    }
                }
                None => warn!("Manifest has a non-object dependencies field, skipping merge"),
            }

            let mut content = serde_json::to_string_pretty(&manifest)
                .map_err(|e| PlatformError::protocol(format!("manifest encode: {e}")))?;
            content.push('\n');
            sandbox.write_file(&manifest_path, &content).await?;
            debug!(count = requirements.len(), "Merged dependencies into manifest");
        }
        None => warn!("Could not load manifest, installing without merge"),
    }

    let output = sandbox
        .exec(
            ExecRequest::new(&config.command)
                .cwd(root)
                .timeout(config.timeout()),
        )
        .await;

    match output {
        Ok(output) if output.success() => {
            debug!("Install completed");
        }
        Ok(output) => {
            warn!(
                exit_code = output.exit_code,
                "Install command failed: {}",
                output.stderr.trim()
            );
        }
        Err(e) if e.is_transport() => return Err(e),
        Err(e) if e.is_timeout() => {
            warn!("Install timed out, continuing with a partial install");
        }
        Err(e) => warn!("Install did not complete: {e}"),
    }

    Ok(())
}

/// Read and parse the manifest, treating anything unreadable as absent.
async fn read_manifest(
    sandbox: &dyn SandboxHandle,
    path: &str,
) -> Result<Option<Value>, PlatformError> {
    let content = match sandbox.read_file(path).await {
        Ok(content) => content,
        Err(e) if e.is_transport() => return Err(e),
        Err(e) => {
            warn!("Failed to read manifest: {e}");
            return Ok(None);
        }
    };

    match serde_json::from_str::<Value>(&content) {
        Ok(value) if value.is_object() => Ok(Some(value)),
        Ok(_) => {
            warn!("Manifest is not a JSON object");
            Ok(None)
        }
        Err(e) => {
            warn!("Manifest is not valid JSON: {e}");
            Ok(None)
        }
    }
}
