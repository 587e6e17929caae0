//! Remove persisted session records.

use std::fmt::Write;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::session::SandboxSession;

/// Format the clean result as a displayable string.
pub fn format_result(removed: usize) -> String {
    let mut out = String::new();
    if removed == 0 {
        writeln!(&mut out, "\n{} No session records to clean.", "ℹ".blue()).unwrap();
    } else {
        writeln!(
            &mut out,
            "\n{} Removed {} session record(s).",
            "✓".green(),
            removed.to_string().cyan()
        )
        .unwrap();
    }
    out
}

/// Entry point: deletes every session record under the state directory.
pub async fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;

    let removed = SandboxSession::clean(&cwd.join(&config.state_dir))?;
    print!("{}", format_result(removed));

    Ok(())
}
