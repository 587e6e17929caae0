//! Provision a sandbox from a generated project bundle.
//!
//! Reads the bundle the code generator produced, wires the real platform
//! client into the pipeline, and drives one session to a terminal state.
//! Parsing and formatting are pure; IO happens at the edges.

use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::assistant::CliAssistant;
use crate::config::Config;
use crate::notify::Notifier;
use crate::orchestrate::{Orchestrator, ProvisionOutcome, ProvisionRequest};
use crate::platform::HttpPlatform;
use crate::supervise::HttpProbe;

/// Parse a provisioning bundle from disk.
fn load_request(path: &Path) -> Result<ProvisionRequest> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundle: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse bundle: {}", path.display()))
}

fn print_banner(config: &Config, bundle: &Path, request: &ProvisionRequest) {
    println!("\n{}", "━".repeat(50).dimmed());
    println!("{}", "   🚑 Medbay Provisioning".yellow().bold());
    println!("{}", "━".repeat(50).dimmed());

    println!("  Bundle:     {}", bundle.display().to_string().cyan());
    println!("  Template:   {}", config.platform.template.cyan());
    println!("  Files:      {}", request.files.len().to_string().cyan());
    println!(
        "  Packages:   {}",
        request.dependencies.len().to_string().cyan()
    );
    println!("  Server:     {}", config.server.command.cyan());
    println!(
        "  Budget:     {}",
        format!("{} validation iterations", config.validation.max_iterations).cyan()
    );
    println!("{}", "━".repeat(50).dimmed());
}

/// Format the terminal outcome as a displayable string.
fn format_outcome(outcome: &ProvisionOutcome) -> String {
    let mut out = String::new();
    writeln!(&mut out, "\n{}", "━".repeat(50).dimmed()).unwrap();
    match outcome {
        ProvisionOutcome::Ready { session, url } => {
            writeln!(&mut out, "{}", "   ✓ Environment Ready".green().bold()).unwrap();
            writeln!(&mut out, "{}", "━".repeat(50).dimmed()).unwrap();
            writeln!(&mut out, "  Session:  {}", session.id.cyan()).unwrap();
            writeln!(&mut out, "  URL:      {}", url.cyan().bold()).unwrap();
            writeln!(
                &mut out,
                "  Repairs:  {}",
                session.attempts.to_string().cyan()
            )
            .unwrap();
        }
        ProvisionOutcome::Failed {
            session,
            reason,
            last_classification,
        } => {
            writeln!(&mut out, "{}", "   ✗ Provisioning Failed".red().bold()).unwrap();
            writeln!(&mut out, "{}", "━".repeat(50).dimmed()).unwrap();
            writeln!(&mut out, "  Session:  {}", session.id.cyan()).unwrap();
            writeln!(&mut out, "  Reason:   {}", reason.red()).unwrap();
            if let Some(classification) = last_classification {
                writeln!(
                    &mut out,
                    "  Error:    {}",
                    classification.to_string().dimmed()
                )
                .unwrap();
            }
            writeln!(
                &mut out,
                "  Repairs:  {}",
                session.attempts.to_string().cyan()
            )
            .unwrap();
        }
    }
    out
}

/// Entry point: provisions one sandbox from a bundle file.
pub async fn run(bundle: PathBuf, config_dir: Option<PathBuf>) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let project_dir = config_dir.unwrap_or(cwd);

    let mut config = Config::load(&project_dir).context("Failed to load medbay.toml")?;
    config.state_dir = project_dir.join(&config.state_dir);

    let request = load_request(&bundle)?;
    print_banner(&config, &bundle, &request);

    let api_key = config.platform.resolve_api_key()?;
    let platform = HttpPlatform::new(config.platform.clone(), api_key)
        .context("Failed to build platform client")?;
    let assistant = CliAssistant::new(&config.repair);
    let probe = HttpProbe::new(config.validation.probe_timeout());
    let notifier = Notifier::new(config.notifications.clone());

    let orchestrator = Orchestrator::new(
        Arc::new(platform),
        Arc::new(assistant),
        Arc::new(probe),
        notifier,
        config,
    );

    let outcome = orchestrator
        .provision(request)
        .await
        .context("Provisioning aborted")?;

    print!("{}", format_outcome(&outcome));

    if let ProvisionOutcome::Failed { reason, .. } = &outcome {
        bail!("Provisioning failed: {reason}");
    }

    Ok(())
}
