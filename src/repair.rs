//! Repair of classified errors.
//!
//! Strategies are tried cheapest first: a small catalogue of exact
//! pattern fixes, then the external assistant. Without an identified
//! affected file the engine declines outright rather than guessing
//! which file to touch. Repair never raises; any error during an
//! attempt is treated as a decline so the supervisor loop stays the
//! single authority on terminal failure.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::assistant::{FixAssistant, FixRequest};
use crate::classify::{ErrorCategory, ErrorClassification};
use crate::platform::{PlatformError, SandboxHandle};

/// Import lines the pattern strategy knows how to insert.
const KNOWN_IMPORTS: &[(&str, &str)] = &[
    ("React", "import React from 'react';"),
    ("useState", "import { useState } from 'react';"),
    ("useEffect", "import { useEffect } from 'react';"),
    ("useRouter", "import { useRouter } from 'next/navigation';"),
    ("Link", "import Link from 'next/link';"),
    ("Image", "import Image from 'next/image';"),
];

/// Which repair strategy produced (or declined) a patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairStrategy {
    PatternFix,
    AssistantFix,
    None,
}

impl fmt::Display for RepairStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PatternFix => "pattern fix",
            Self::AssistantFix => "assistant fix",
            Self::None => "none",
        };
        write!(f, "{name}")
    }
}

/// Outcome of one repair invocation.
#[derive(Debug, Clone)]
pub struct RepairAttempt {
    pub classification: ErrorClassification,
    pub strategy: RepairStrategy,
    pub succeeded: bool,
    pub patched_content: Option<String>,
}

impl RepairAttempt {
    fn declined(classification: ErrorClassification) -> Self {
        Self {
            classification,
            strategy: RepairStrategy::None,
            succeeded: false,
            patched_content: None,
        }
    }
}

pub struct RepairEngine {
    assistant: Arc<dyn FixAssistant>,
}

impl RepairEngine {
    pub fn new(assistant: Arc<dyn FixAssistant>) -> Self {
        Self { assistant }
    }

    /// Attempt to repair the classified error in place.
    pub async fn repair(
        &self,
        sandbox: &dyn SandboxHandle,
        project_root: &str,
        classification: &ErrorClassification,
        log_excerpt: &str,
    ) -> RepairAttempt {
        let Some(affected) = classification.affected_file.clone() else {
            debug!("No affected file identified, declining repair");
            return RepairAttempt::declined(classification.clone());
        };

        match self
            .try_repair(sandbox, project_root, &affected, classification, log_excerpt)
            .await
        {
            Ok(attempt) => attempt,
            Err(e) => {
                warn!(file = %affected, "Repair attempt errored, declining: {e}");
                RepairAttempt::declined(classification.clone())
            }
        }
    }

    async fn try_repair(
        &self,
        sandbox: &dyn SandboxHandle,
        project_root: &str,
        affected: &str,
        classification: &ErrorClassification,
        log_excerpt: &str,
    ) -> Result<RepairAttempt, PlatformError> {
        let path = resolve_path(project_root, affected);
        let content = sandbox.read_file(&path).await?;

        if let Some(patched) = pattern_fix(classification, &content) {
            sandbox.write_file(&path, &patched).await?;
            info!(file = %affected, "Applied pattern fix");
            return Ok(RepairAttempt {
                classification: classification.clone(),
                strategy: RepairStrategy::PatternFix,
                succeeded: true,
                patched_content: Some(patched),
            });
        }

        let request = FixRequest {
            file_path: affected.to_string(),
            content: content.clone(),
            category: classification.category,
            error_message: classification.message.clone(),
            log_excerpt: log_excerpt.to_string(),
            line: classification.line,
        };

        if let Some(reply) = self.assistant.generate_fix(&request).await {
            if let Some(patched) = extract_patch(&reply, &content) {
                sandbox.write_file(&path, &patched).await?;
                info!(file = %affected, "Applied assistant fix");
                return Ok(RepairAttempt {
                    classification: classification.clone(),
                    strategy: RepairStrategy::AssistantFix,
                    succeeded: true,
                    patched_content: Some(patched),
                });
            }
            debug!("Assistant reply had no usable file content");
        }

        Ok(RepairAttempt::declined(classification.clone()))
    }
}

fn resolve_path(project_root: &str, affected: &str) -> String {
    if affected.starts_with('/') {
        affected.to_string()
    } else {
        format!("{}/{}", project_root.trim_end_matches('/'), affected)
    }
}

/// Apply a narrow textual fix when its exact precondition holds.
fn pattern_fix(classification: &ErrorClassification, content: &str) -> Option<String> {
    match classification.category {
        ErrorCategory::MissingImport => {
            let identifier = classification.message.split_whitespace().next()?;
            let import_line = KNOWN_IMPORTS
                .iter()
                .find(|(name, _)| *name == identifier)
                .map(|(_, line)| *line)?;

            let already_imported = content
                .lines()
                .any(|line| line.contains("import") && line.contains(identifier));
            if already_imported {
                return None;
            }
            Some(insert_import(content, import_line))
        }
        ErrorCategory::SyntaxError | ErrorCategory::CompileFailure => {
            if !classification.message.to_lowercase().contains("unexpected end") {
                return None;
            }
            let opens = content.matches('{').count();
            let closes = content.matches('}').count();
            let deficit = opens.saturating_sub(closes);
            if deficit == 0 {
                return None;
            }

            let mut patched = content.to_string();
            if !patched.ends_with('\n') {
                patched.push('\n');
            }
            for _ in 0..deficit {
                patched.push_str("}\n");
            }
            Some(patched)
        }
        _ => None,
    }
}

/// Insert an import after a leading directive line, else at the top.
fn insert_import(content: &str, import_line: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    let directive = lines.iter().position(|line| {
        matches!(
            line.trim(),
            "'use client'" | "'use client';" | "\"use client\"" | "\"use client\";"
        )
    });

    let at = directive.map(|i| i + 1).unwrap_or(0);
    lines.insert(at, import_line);

    let mut patched = lines.join("\n");
    patched.push('\n');
    patched
}

/// Pull corrected file content out of an assistant reply.
///
/// Tried in order: a fenced code block, a "Fixed Code:" label, then the
/// raw reply if it reads like source and differs from the original.
pub(crate) fn extract_patch(reply: &str, original: &str) -> Option<String> {
    if let Some(captures) = Regex::new(r"```[a-zA-Z]*\n([\s\S]*?)```")
        .ok()
        .and_then(|re| re.captures(reply))
    {
        if let Some(code) = captures.get(1) {
            let code = code.as_str();
            if !code.trim().is_empty() {
                return Some(with_trailing_newline(code));
            }
        }
    }

    if let Some((_, rest)) = reply.split_once("Fixed Code:") {
        let code = rest.trim();
        if !code.is_empty() {
            return Some(with_trailing_newline(code));
        }
    }

    let trimmed = reply.trim();
    if looks_like_source(trimmed) && trimmed != original.trim() {
        return Some(with_trailing_newline(trimmed));
    }

    None
}

fn looks_like_source(text: &str) -> bool {
    let first = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim_start();

    const PREFIXES: [&str; 10] = [
        "import ", "export ", "const ", "let ", "function ", "'use ", "\"use ", "//", "/*", "<",
    ];
    PREFIXES.iter().any(|prefix| first.starts_with(prefix))
}

fn with_trailing_newline(code: &str) -> String {
    let mut out = code.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
