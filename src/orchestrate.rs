//! Top-level provisioning lifecycle.
//!
//! One orchestrator call drives a session from sandbox creation to a
//! terminal Ready or Failed state: inject files, materialize env,
//! install dependencies, then hand the sandbox to the supervisor. All
//! collaborators are injected so the whole pipeline runs against fakes
//! in tests. The orchestrator is the only writer to the session record
//! and the only publisher of lifecycle events.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::assistant::FixAssistant;
use crate::classify::ErrorClassification;
use crate::config::Config;
use crate::inject::{self, FileEntry};
use crate::notify::{Notifier, SessionEvent};
use crate::platform::{PlatformError, SandboxHandle, SandboxPlatform};
use crate::repair::RepairEngine;
use crate::session::{SandboxSession, SessionState};
use crate::supervise::{LivenessProbe, Supervisor, SupervisorOutcome};
use crate::{deps, envfile};

/// Inputs for one provisioning run, as supplied by the code generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Extra package requirements, `name` or `name@version`
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Values for the required environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// What the caller gets back for every expected failure category.
/// Only an unreachable platform surfaces as an error instead.
#[derive(Debug)]
pub enum ProvisionOutcome {
    Ready {
        session: SandboxSession,
        url: String,
    },
    Failed {
        session: SandboxSession,
        reason: String,
        last_classification: Option<ErrorClassification>,
    },
}

pub struct Orchestrator {
    platform: Arc<dyn SandboxPlatform>,
    assistant: Arc<dyn FixAssistant>,
    probe: Arc<dyn LivenessProbe>,
    notifier: Notifier,
    config: Config,
}

impl Orchestrator {
    pub fn new(
        platform: Arc<dyn SandboxPlatform>,
        assistant: Arc<dyn FixAssistant>,
        probe: Arc<dyn LivenessProbe>,
        notifier: Notifier,
        config: Config,
    ) -> Self {
        Self {
            platform,
            assistant,
            probe,
            notifier,
            config,
        }
    }

    /// Provision one environment end to end.
    pub async fn provision(
        &self,
        request: ProvisionRequest,
    ) -> Result<ProvisionOutcome, PlatformError> {
        info!(template = %self.config.platform.template, "Creating sandbox");
        let handle = self.platform.create(&self.config.platform.template).await?;

        let mut session = SandboxSession::new(handle.id());
        info!(session = %session.id, "Sandbox created");
        self.notifier
            .publish(&session.id, &SessionEvent::Creating)
            .await;

        let deadline = self.config.session_deadline();
        let driven = tokio::time::timeout(
            deadline,
            self.drive(handle.as_ref(), &mut session, &request),
        )
        .await;

        let outcome = match driven {
            Ok(Ok(supervised)) => supervised,
            Ok(Err(e)) => {
                error!(session = %session.id, "Sandbox became unreachable: {e}");
                let reason = e.to_string();
                session.mark_failed(reason.clone());
                self.persist(&session);
                self.notifier
                    .publish(&session.id, &SessionEvent::Failed { reason })
                    .await;
                return Err(e);
            }
            Err(_) => {
                warn!(
                    session = %session.id,
                    "Session deadline of {}s exceeded",
                    deadline.as_secs()
                );
                SupervisorOutcome::Failed {
                    reason: "timeout".to_string(),
                    last_classification: None,
                    attempts: session.attempts,
                }
            }
        };

        match outcome {
            SupervisorOutcome::Ready {
                url,
                iterations,
                attempts,
            } => {
                info!(session = %session.id, url = %url, iterations, "Environment ready");
                session.attempts = attempts;
                session.mark_ready(url.clone());
                self.persist(&session);
                self.notifier
                    .publish(&session.id, &SessionEvent::Ready { url: url.clone() })
                    .await;
                Ok(ProvisionOutcome::Ready { session, url })
            }
            SupervisorOutcome::Failed {
                reason,
                last_classification,
                attempts,
            } => {
                warn!(session = %session.id, reason = %reason, "Provisioning failed");
                session.attempts = attempts;
                session.mark_failed(reason.clone());
                self.persist(&session);
                self.notifier
                    .publish(&session.id, &SessionEvent::Failed {
                        reason: reason.clone(),
                    })
                    .await;
                Ok(ProvisionOutcome::Failed {
                    session,
                    reason,
                    last_classification,
                })
            }
        }
    }

    /// Run the pipeline stages against a created sandbox.
    async fn drive(
        &self,
        sandbox: &dyn SandboxHandle,
        session: &mut SandboxSession,
        request: &ProvisionRequest,
    ) -> Result<SupervisorOutcome, PlatformError> {
        let root = &self.config.server.project_root;

        session.transition(SessionState::Injecting);
        self.persist(session);
        let report = inject::inject(sandbox, root, &request.files).await?;
        if !report.all_succeeded() {
            warn!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "Injection was partial"
            );
        }
        // The env file is written even after partial injection so a
        // degraded environment still starts with traceable config
        envfile::materialize(sandbox, root, &self.config.env, &request.env).await?;

        session.transition(SessionState::InstallingDeps);
        self.persist(session);
        deps::add_dependencies(sandbox, root, &self.config.install, &request.dependencies)
            .await?;

        session.transition(SessionState::Starting);
        self.persist(session);

        let repair = RepairEngine::new(Arc::clone(&self.assistant));
        Supervisor::new(sandbox, &self.config, &repair, self.probe.as_ref())
            .run(session)
            .await
    }

    fn persist(&self, session: &SandboxSession) {
        if let Err(e) = session.save(&self.config.state_dir) {
            warn!(session = %session.id, "Failed to record session: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::assistant::mock::MockAssistant;
    use crate::config::NotificationConfig;
    use crate::platform::fake::{exec_ok, FakePlatform, FakeSandbox};
    use crate::supervise::probe::scripted::ScriptedProbe;

    fn test_config(state_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.state_dir = state_dir.path().join("state");
        config.validation.max_iterations = 5;
        config.validation.interval_secs = 0;
        config
    }

    fn orchestrator(
        sandbox: FakeSandbox,
        assistant: MockAssistant,
        probe: ScriptedProbe,
        config: Config,
    ) -> Orchestrator {
        Orchestrator::new(
            Arc::new(FakePlatform::new(sandbox)),
            Arc::new(assistant),
            Arc::new(probe),
            Notifier::new(NotificationConfig::default()),
            config,
        )
    }

    fn request() -> ProvisionRequest {
        let mut env = HashMap::new();
        env.insert(
            "DATABASE_URL".to_string(),
            "postgres://localhost/app".to_string(),
        );
        ProvisionRequest {
            files: vec![FileEntry::new(
                "app/page.tsx",
                "export default function Page() {}\n",
            )],
            dependencies: vec!["zustand@5.0.0".to_string()],
            env,
        }
    }

    #[tokio::test]
    async fn test_provision_happy_path() {
        let state = TempDir::new().unwrap();
        let config = test_config(&state);
        let sandbox = FakeSandbox::new();
        sandbox
            .write_file("/home/user/app/package.json", "{\"dependencies\":{}}")
            .await
            .unwrap();
        sandbox.script("tail -n", exec_ok("✓ Ready in 2.3s\n"));
        let handle = sandbox.clone();

        let orchestrator = orchestrator(
            sandbox,
            MockAssistant::new(),
            ScriptedProbe::always(true),
            config.clone(),
        );
        let outcome = orchestrator.provision(request()).await.unwrap();

        let session = match outcome {
            ProvisionOutcome::Ready { session, url } => {
                assert_eq!(url, "https://3000-sb-fake.preview.fake.dev");
                session
            }
            other => panic!("expected ready, got {other:?}"),
        };
        assert_eq!(session.state, SessionState::Ready);
        assert!(session.ready_at.is_some());

        // Files, env, and dependencies all landed in the sandbox
        assert_eq!(
            handle.file("/home/user/app/app/page.tsx").unwrap(),
            "export default function Page() {}\n"
        );
        assert!(handle
            .file("/home/user/app/.env.local")
            .unwrap()
            .contains("DATABASE_URL=postgres://localhost/app"));
        assert!(handle
            .file("/home/user/app/package.json")
            .unwrap()
            .contains("zustand"));
        assert!(handle
            .exec_history()
            .iter()
            .any(|cmd| cmd.contains("npm install")));

        // Terminal state was persisted for later status lookups
        let record = SandboxSession::load(&config.state_dir, &session.id)
            .unwrap()
            .unwrap();
        assert_eq!(record.state, SessionState::Ready);
        assert_eq!(
            record.base_url.as_deref(),
            Some("https://3000-sb-fake.preview.fake.dev")
        );
    }

    #[tokio::test]
    async fn test_create_failure_leaves_no_record() {
        let state = TempDir::new().unwrap();
        let config = test_config(&state);

        let orchestrator = Orchestrator::new(
            Arc::new(FakePlatform::unreachable()),
            Arc::new(MockAssistant::new()),
            Arc::new(ScriptedProbe::always(true)),
            Notifier::new(NotificationConfig::default()),
            config.clone(),
        );

        let err = orchestrator.provision(request()).await.unwrap_err();
        assert!(err.is_transport());
        assert!(SandboxSession::list(&config.state_dir).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_forces_timeout_failure() {
        let state = TempDir::new().unwrap();
        let mut config = test_config(&state);
        // Zero budget everywhere makes the overall deadline elapse first
        config.validation.injection_timeout_secs = 0;
        config.install.timeout_secs = 0;
        config.validation.max_iterations = 0;
        let sandbox = FakeSandbox::new();
        sandbox.set_exec_delay(Duration::from_millis(50));

        let orchestrator = orchestrator(
            sandbox,
            MockAssistant::new(),
            ScriptedProbe::always(true),
            config.clone(),
        );
        let outcome = orchestrator.provision(request()).await.unwrap();

        match outcome {
            ProvisionOutcome::Failed {
                session, reason, ..
            } => {
                assert_eq!(reason, "timeout");
                assert_eq!(session.state, SessionState::Failed);
                assert_eq!(session.failure_reason.as_deref(), Some("timeout"));

                let record = SandboxSession::load(&config.state_dir, &session.id)
                    .unwrap()
                    .unwrap();
                assert_eq!(record.state, SessionState::Failed);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_loss_mid_pipeline_records_failure() {
        let state = TempDir::new().unwrap();
        let config = test_config(&state);
        let sandbox = FakeSandbox::new();
        sandbox.set_fail_transport(true);

        let orchestrator = orchestrator(
            sandbox,
            MockAssistant::new(),
            ScriptedProbe::always(true),
            config.clone(),
        );

        let err = orchestrator.provision(request()).await.unwrap_err();
        assert!(err.is_transport());

        let sessions = SandboxSession::list(&config.state_dir).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].state, SessionState::Failed);
        assert!(sessions[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("unreachable"));
    }

    #[tokio::test]
    async fn test_env_file_written_after_partial_injection() {
        let state = TempDir::new().unwrap();
        let config = test_config(&state);
        let sandbox = FakeSandbox::new();
        sandbox.script("tail -n", exec_ok("✓ Ready in 2.3s\n"));
        let handle = sandbox.clone();

        let mut request = request();
        request.files.push(FileEntry::new("../escape.ts", "nope"));
        request.dependencies.clear();

        let orchestrator = orchestrator(
            sandbox,
            MockAssistant::new(),
            ScriptedProbe::always(true),
            config,
        );
        let outcome = orchestrator.provision(request).await.unwrap();

        assert!(matches!(outcome, ProvisionOutcome::Ready { .. }));
        assert!(handle.file("/home/user/app/.env.local").is_some());
    }
}
