//! Repair assistant invocation.
//!
//! The assistant is a black box that takes a structured description of
//! a broken file and may return corrected content. The default backend
//! shells out to a local CLI with the prompt piped via stdin.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::classify::ErrorCategory;
use crate::config::RepairConfig;

/// One structured request for a corrected file.
#[derive(Debug, Clone)]
pub struct FixRequest {
    pub file_path: String,
    /// Full current content of the broken file
    pub content: String,
    pub category: ErrorCategory,
    pub error_message: String,
    pub log_excerpt: String,
    pub line: Option<u32>,
}

/// External repair capability.
#[async_trait]
pub trait FixAssistant: Send + Sync {
    /// Produce corrected file content, or `None` when no fix is offered.
    async fn generate_fix(&self, request: &FixRequest) -> Option<String>;
}

/// Assistant backed by a local CLI; the prompt is piped via stdin and
/// stdout is taken as the reply.
pub struct CliAssistant {
    command: String,
    timeout: Duration,
}

impl CliAssistant {
    pub fn new(config: &RepairConfig) -> Self {
        Self {
            command: config.assistant_command.clone(),
            timeout: config.assistant_timeout(),
        }
    }

    fn build_prompt(request: &FixRequest) -> String {
        let mut prompt = String::new();
        prompt.push_str("Fix the following error in a generated web project.\n\n");
        prompt.push_str(&format!("File: {}\n", request.file_path));
        if let Some(line) = request.line {
            prompt.push_str(&format!("Line: {line}\n"));
        }
        prompt.push_str(&format!(
            "Error ({}): {}\n\n",
            request.category, request.error_message
        ));
        prompt.push_str("Recent server log:\n```\n");
        prompt.push_str(request.log_excerpt.trim_end());
        prompt.push_str("\n```\n\n");
        prompt.push_str("Current file content:\n```\n");
        prompt.push_str(&request.content);
        prompt.push_str("\n```\n\n");
        prompt.push_str(
            "Reply with the complete corrected file content and nothing else.\n",
        );
        prompt
    }
}

#[async_trait]
impl FixAssistant for CliAssistant {
    async fn generate_fix(&self, request: &FixRequest) -> Option<String> {
        let argv = match shell_words::split(&self.command) {
            Ok(argv) if !argv.is_empty() => argv,
            Ok(_) => {
                warn!("Assistant command is empty");
                return None;
            }
            Err(e) => {
                warn!("Invalid assistant command {:?}: {e}", self.command);
                return None;
            }
        };

        debug!(command = %argv[0], file = %request.file_path, "Invoking repair assistant");

        let mut child = match tokio::process::Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn assistant '{}': {e}", argv[0]);
                return None;
            }
        };

        let prompt = Self::build_prompt(request);
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!("Failed to write assistant prompt: {e}");
                return None;
            }
            if let Err(e) = stdin.flush().await {
                warn!("Failed to flush assistant prompt: {e}");
                return None;
            }
        }

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Assistant did not complete: {e}");
                return None;
            }
            Err(_) => {
                warn!("Assistant timed out after {}s", self.timeout.as_secs());
                return None;
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                "Assistant failed with exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
            return None;
        }

        let reply = String::from_utf8_lossy(&output.stdout).to_string();
        if reply.trim().is_empty() {
            debug!("Assistant returned an empty reply");
            return None;
        }

        debug!(bytes = reply.len(), "Assistant replied");
        Some(reply)
    }
}
