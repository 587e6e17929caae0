use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const SESSIONS_DIR: &str = "sessions";

/// Lifecycle state of one provisioning session.
///
/// Sessions move forward only; the single allowed cycle is
/// `Validating` ⇄ `Repairing`, bounded by the validation budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Creating,
    Injecting,
    InstallingDeps,
    Starting,
    Validating,
    Repairing,
    Ready,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Creating => "creating",
            Self::Injecting => "injecting",
            Self::InstallingDeps => "installing-deps",
            Self::Starting => "starting",
            Self::Validating => "validating",
            Self::Repairing => "repairing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One provisioning attempt against one sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSession {
    /// Platform-assigned sandbox id
    pub id: String,
    pub state: SessionState,
    /// Reachable address once ready
    pub base_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    /// Repair iterations consumed
    pub attempts: u32,
    /// Terminal reason when failed
    pub failure_reason: Option<String>,
}

impl SandboxSession {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: SessionState::Creating,
            base_url: None,
            created_at: Utc::now(),
            ready_at: None,
            attempts: 0,
            failure_reason: None,
        }
    }

    /// Move to the next lifecycle state.
    pub fn transition(&mut self, state: SessionState) {
        debug!(session = %self.id, from = %self.state, to = %state, "Session state transition");
        self.state = state;
    }

    pub fn mark_ready(&mut self, url: impl Into<String>) {
        self.transition(SessionState::Ready);
        self.base_url = Some(url.into());
        self.ready_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.transition(SessionState::Failed);
        self.failure_reason = Some(reason.into());
    }

    fn record_path(state_dir: &Path, id: &str) -> PathBuf {
        state_dir.join(SESSIONS_DIR).join(format!("{id}.toml"))
    }

    /// Persist the session record.
    pub fn save(&self, state_dir: &Path) -> Result<()> {
        let record_path = Self::record_path(state_dir, &self.id);

        if let Some(parent) = record_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize session")?;

        fs::write(&record_path, content)
            .with_context(|| format!("Failed to write session record: {}", record_path.display()))?;

        Ok(())
    }

    /// Load one session record if it exists.
    pub fn load(state_dir: &Path, id: &str) -> Result<Option<Self>> {
        let record_path = Self::record_path(state_dir, id);

        if !record_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&record_path)
            .with_context(|| format!("Failed to read session record: {}", record_path.display()))?;

        let session: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse session record: {}", record_path.display()))?;

        Ok(Some(session))
    }

    /// List all persisted sessions, newest first. Unparsable records are
    /// skipped with a warning.
    pub fn list(state_dir: &Path) -> Result<Vec<Self>> {
        let sessions_dir = state_dir.join(SESSIONS_DIR);

        if !sessions_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in fs::read_dir(&sessions_dir)
            .with_context(|| format!("Failed to read: {}", sessions_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read: {}", path.display()))?;
            match toml::from_str::<Self>(&content) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), "Skipping unparsable session record: {e}"),
            }
        }

        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Remove all persisted session records, returning how many were deleted.
    pub fn clean(state_dir: &Path) -> Result<usize> {
        let sessions_dir = state_dir.join(SESSIONS_DIR);

        if !sessions_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&sessions_dir)
            .with_context(|| format!("Failed to read: {}", sessions_dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
                continue;
            }
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete: {}", path.display()))?;
            removed += 1;
        }

        Ok(removed)
    }
}
