//! Tear down a sandbox and close out its session record.

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::config::Config;
use crate::platform::{HttpPlatform, SandboxPlatform};
use crate::session::SandboxSession;

/// Entry point: terminates the sandbox behind a session id.
pub async fn run(session_id: String) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;

    let api_key = config.platform.resolve_api_key()?;
    let platform = HttpPlatform::new(config.platform.clone(), api_key)
        .context("Failed to build platform client")?;

    let handle = platform
        .connect(&session_id)
        .await
        .with_context(|| format!("Failed to reach sandbox {session_id}"))?;
    handle
        .terminate()
        .await
        .with_context(|| format!("Failed to terminate sandbox {session_id}"))?;

    info!(session = %session_id, "Sandbox terminated");

    let state_dir = cwd.join(&config.state_dir);
    if let Some(mut session) = SandboxSession::load(&state_dir, &session_id)? {
        session.mark_failed("terminated");
        session.save(&state_dir)?;
    }

    println!("\n{} Sandbox {} terminated.", "✓".green(), session_id.cyan());

    Ok(())
}
