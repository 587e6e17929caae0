//! Background dev server control.
//!
//! The server runs detached inside the sandbox with output redirected
//! to a log file. All control afterwards is indirect: pid discovery,
//! signals, resource sampling, and log reads through shell commands.

use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::platform::{ExecOutput, ExecRequest, PlatformError, SandboxHandle};

/// Owned handle for the supervised server process.
pub struct DevServer<'a> {
    sandbox: &'a dyn SandboxHandle,
    config: &'a ServerConfig,
    pid: Option<u32>,
    killed: bool,
}

impl<'a> DevServer<'a> {
    pub fn new(sandbox: &'a dyn SandboxHandle, config: &'a ServerConfig) -> Self {
        Self {
            sandbox,
            config,
            pid: None,
            killed: false,
        }
    }

    /// Launch the server detached, output captured to the log file.
    pub async fn start(&mut self) -> Result<(), PlatformError> {
        let command = format!(
            "cd {} && exec {} > {} 2>&1",
            self.config.project_root, self.config.command, self.config.log_path
        );
        info!(command = %self.config.command, "Starting dev server");

        if self.run_soft(ExecRequest::new(command).background()).await?.is_none() {
            warn!("Server start command did not complete");
        }
        Ok(())
    }

    /// Resolve the server pid, cached after the first successful lookup.
    pub async fn pid(&mut self) -> Result<Option<u32>, PlatformError> {
        if self.pid.is_some() {
            return Ok(self.pid);
        }

        let request = ExecRequest::new(format!("pgrep -f -n '{}'", self.config.command));
        if let Some(output) = self.run_soft(request).await? {
            if output.success() {
                self.pid = output.stdout.trim().parse::<u32>().ok();
                debug!(pid = ?self.pid, "Resolved server pid");
            }
        }
        Ok(self.pid)
    }

    /// Whether the process currently accepts signals.
    pub async fn is_alive(&mut self) -> Result<bool, PlatformError> {
        let Some(pid) = self.pid().await? else {
            return Ok(false);
        };
        let output = self.run_soft(ExecRequest::new(format!("kill -0 {pid}"))).await?;
        Ok(output.map(|o| o.success()).unwrap_or(false))
    }

    /// Current CPU utilization of the server process, if measurable.
    pub async fn cpu_percent(&mut self) -> Result<Option<f64>, PlatformError> {
        let Some(pid) = self.pid().await? else {
            return Ok(None);
        };

        let request = ExecRequest::new(format!("ps -p {pid} -o %cpu="));
        let Some(output) = self.run_soft(request).await? else {
            return Ok(None);
        };
        if !output.success() {
            return Ok(None);
        }
        Ok(output.stdout.trim().parse::<f64>().ok())
    }

    /// Last `lines` lines of the captured server output.
    pub async fn log_tail(&self, lines: u32) -> Result<String, PlatformError> {
        let request = ExecRequest::new(format!("tail -n {lines} {}", self.config.log_path));
        match self.run_soft(request).await? {
            Some(output) if output.success() => Ok(output.stdout),
            _ => Ok(String::new()),
        }
    }

    /// Drop captured output that has already been acted on.
    pub async fn truncate_log(&self) -> Result<(), PlatformError> {
        let request = ExecRequest::new(format!(": > {}", self.config.log_path));
        self.run_soft(request).await?;
        Ok(())
    }

    /// Force-terminate the server. Issued at most once per handle.
    pub async fn kill(&mut self) -> Result<(), PlatformError> {
        if self.killed {
            return Ok(());
        }
        self.killed = true;

        let command = match self.pid().await? {
            Some(pid) => format!("kill -9 {pid}"),
            None => format!("pkill -9 -f '{}'", self.config.command),
        };
        info!(command = %command, "Killing server process");
        self.run_soft(ExecRequest::new(command)).await?;
        Ok(())
    }

    /// Run a command, absorbing everything except transport errors.
    async fn run_soft(&self, request: ExecRequest) -> Result<Option<ExecOutput>, PlatformError> {
        match self.sandbox.exec(request).await {
            Ok(output) => Ok(Some(output)),
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                debug!("Sandbox command did not complete: {e}");
                Ok(None)
            }
        }
    }
}
