//! Sandbox platform client.
//!
//! Everything the pipeline does inside an ephemeral environment goes
//! through the two traits here: [`SandboxPlatform`] creates or looks up
//! environments, [`SandboxHandle`] executes commands and moves files
//! inside one. Production talks HTTP ([`HttpPlatform`]); tests script a
//! fake.

mod error;
mod http;

#[cfg(test)]
pub(crate) mod fake;

pub use error::PlatformError;
pub use http::HttpPlatform;

use async_trait::async_trait;
use std::time::Duration;

/// A shell command to run inside a sandbox.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    /// Command line, passed to the sandbox shell
    pub command: String,
    /// Working directory, platform default when unset
    pub cwd: Option<String>,
    /// Execution timeout; the platform default applies when unset
    pub timeout: Option<Duration>,
    /// Detach and return immediately instead of waiting for exit
    pub background: bool,
}

impl ExecRequest {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            timeout: None,
            background: false,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn background(mut self) -> Self {
        self.background = true;
        self
    }
}

/// Result of a completed (or detached) command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    /// Returns true if the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Public preview address for a sandbox port.
#[derive(Debug, Clone)]
pub struct PreviewInfo {
    pub url: String,
    /// Auth token for platforms that gate preview access
    pub token: Option<String>,
}

/// Creates and looks up sandboxes.
#[async_trait]
pub trait SandboxPlatform: Send + Sync {
    /// Provision a new sandbox from a template.
    async fn create(&self, template: &str) -> Result<Box<dyn SandboxHandle>, PlatformError>;

    /// Attach to an existing sandbox by id.
    async fn connect(&self, id: &str) -> Result<Box<dyn SandboxHandle>, PlatformError>;
}

/// One ephemeral environment: command execution, file IO, preview, teardown.
#[async_trait]
pub trait SandboxHandle: Send + Sync {
    /// Platform-assigned identifier.
    fn id(&self) -> &str;

    /// Run a shell command inside the sandbox.
    async fn exec(&self, request: ExecRequest) -> Result<ExecOutput, PlatformError>;

    /// Write a file, creating parent directories.
    async fn write_file(&self, path: &str, content: &str) -> Result<(), PlatformError>;

    /// Read a file's content.
    async fn read_file(&self, path: &str) -> Result<String, PlatformError>;

    /// List entries directly under a directory.
    async fn list_dir(&self, path: &str) -> Result<Vec<String>, PlatformError>;

    /// Public URL (and auth token, if any) for a port.
    async fn preview_url(&self, port: u16) -> Result<PreviewInfo, PlatformError>;

    /// Tear the sandbox down.
    async fn terminate(&self) -> Result<(), PlatformError>;
}
