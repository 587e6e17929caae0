//! Show persisted provisioning sessions, newest first.

use std::fmt::Write;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::Config;
use crate::session::{SandboxSession, SessionState};

/// Format session records as a displayable listing.
pub fn format_sessions(sessions: &[SandboxSession]) -> String {
    let mut out = String::new();

    if sessions.is_empty() {
        writeln!(&mut out, "\n{} No sessions recorded.", "ℹ".blue()).unwrap();
        writeln!(
            &mut out,
            "  Run {} to provision one.",
            "medbay provision <bundle>".green()
        )
        .unwrap();
        return out;
    }

    writeln!(&mut out, "\n{}", "━".repeat(50).dimmed()).unwrap();
    writeln!(&mut out, "{}", "   🚑 Sandbox Sessions".yellow().bold()).unwrap();
    writeln!(&mut out, "{}", "━".repeat(50).dimmed()).unwrap();

    for session in sessions {
        let state = match session.state {
            SessionState::Ready => session.state.to_string().green().bold(),
            SessionState::Failed => session.state.to_string().red().bold(),
            _ => session.state.to_string().yellow(),
        };
        writeln!(&mut out, "\n  {}  {}", session.id.cyan().bold(), state).unwrap();
        writeln!(
            &mut out,
            "    Created:  {}",
            session
                .created_at
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string()
                .dimmed()
        )
        .unwrap();
        if let Some(url) = &session.base_url {
            writeln!(&mut out, "    URL:      {}", url.cyan()).unwrap();
        }
        if session.attempts > 0 {
            writeln!(
                &mut out,
                "    Repairs:  {}",
                session.attempts.to_string().cyan()
            )
            .unwrap();
        }
        if let Some(reason) = &session.failure_reason {
            writeln!(&mut out, "    Reason:   {}", reason.red()).unwrap();
        }
    }

    out
}

/// Entry point: lists sessions from the state directory.
pub async fn run() -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd)?;

    let sessions = SandboxSession::list(&cwd.join(&config.state_dir))?;
    print!("{}", format_sessions(&sessions));

    Ok(())
}
