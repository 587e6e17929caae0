//! Print the public preview address for a running sandbox.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::platform::{HttpPlatform, SandboxPlatform};

/// Entry point: resolves and prints the preview URL for a session.
pub async fn run(session_id: String, port: Option<u16>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;

    let api_key = config.platform.resolve_api_key()?;
    let platform = HttpPlatform::new(config.platform.clone(), api_key)
        .context("Failed to build platform client")?;

    let handle = platform
        .connect(&session_id)
        .await
        .with_context(|| format!("Failed to reach sandbox {session_id}"))?;
    let preview = handle
        .preview_url(port.unwrap_or(config.server.port))
        .await
        .context("Failed to resolve preview address")?;

    println!(
        "\n{}  {}",
        "Preview:".yellow().bold(),
        preview.url.cyan().bold()
    );
    if let Some(token) = preview.token {
        println!("{}    {}", "Token:".yellow().bold(), token.dimmed());
    }

    Ok(())
}
