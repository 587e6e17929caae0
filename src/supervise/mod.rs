//! Dev server supervision.
//!
//! After the server is launched, a single sequential validation loop
//! drives everything: sample CPU for runaway detection, classify the
//! latest log tail, repair classified errors in place, and probe for
//! liveness. The loop's iteration budget is shared between validation
//! and repair, so repairs never extend the overall wait.

pub mod probe;
pub mod process;
pub mod runaway;

use tracing::{debug, info, warn};

use crate::classify::{ErrorClassification, LogAssessment, LogClassifier};
use crate::config::Config;
use crate::platform::{PlatformError, PreviewInfo, SandboxHandle};
use crate::repair::RepairEngine;
use crate::session::{SandboxSession, SessionState};

pub use probe::{HttpProbe, LivenessProbe};
pub use process::DevServer;
pub use runaway::RunawayDetector;

/// Terminal verdict of one supervision run.
#[derive(Debug)]
pub enum SupervisorOutcome {
    Ready {
        url: String,
        iterations: u32,
        attempts: u32,
    },
    Failed {
        reason: String,
        last_classification: Option<ErrorClassification>,
        attempts: u32,
    },
}

pub struct Supervisor<'a> {
    sandbox: &'a dyn SandboxHandle,
    config: &'a Config,
    repair: &'a RepairEngine,
    probe: &'a dyn LivenessProbe,
}

impl<'a> Supervisor<'a> {
    pub fn new(
        sandbox: &'a dyn SandboxHandle,
        config: &'a Config,
        repair: &'a RepairEngine,
        probe: &'a dyn LivenessProbe,
    ) -> Self {
        Self {
            sandbox,
            config,
            repair,
            probe,
        }
    }

    /// Start the server and validate until healthy, failed, or out of
    /// budget. Only a transport error returns `Err`.
    pub async fn run(
        &self,
        session: &mut SandboxSession,
    ) -> Result<SupervisorOutcome, PlatformError> {
        let mut server = DevServer::new(self.sandbox, &self.config.server);
        server.start().await?;
        session.transition(SessionState::Validating);

        let classifier = LogClassifier::new();
        let mut detector = RunawayDetector::new(self.config.runaway.clone());
        let mut preview: Option<PreviewInfo> = None;
        let mut last_classification: Option<ErrorClassification> = None;
        let mut attempts: u32 = 0;

        for iteration in 1..=self.config.validation.max_iterations {
            debug!(iteration, "Validation cycle");

            if let Some(cpu) = server.cpu_percent().await? {
                debug!(cpu, "CPU sample");
                if detector.record(cpu) {
                    warn!(cpu, "Runaway process detected, killing server");
                    server.kill().await?;
                    return Ok(SupervisorOutcome::Failed {
                        reason: "runaway process".to_string(),
                        last_classification,
                        attempts,
                    });
                }
            }

            let tail = server.log_tail(self.config.repair.log_tail_lines).await?;
            match classifier.classify(&tail) {
                LogAssessment::Errored(classification) => {
                    info!(%classification, "Classified server error, attempting repair");
                    session.transition(SessionState::Repairing);
                    last_classification = Some(classification.clone());
                    attempts += 1;
                    session.attempts = attempts;

                    let attempt = self
                        .repair
                        .repair(
                            self.sandbox,
                            &self.config.server.project_root,
                            &classification,
                            &tail,
                        )
                        .await;

                    if attempt.succeeded {
                        let patched_bytes = attempt.patched_content.as_ref().map_or(0, String::len);
                        info!(strategy = %attempt.strategy, patched_bytes, "Repair applied, revalidating");
                        server.truncate_log().await?;
                        session.transition(SessionState::Validating);
                    } else {
                        return Ok(SupervisorOutcome::Failed {
                            reason: format!("unrepairable error: {}", attempt.classification),
                            last_classification,
                            attempts,
                        });
                    }
                }
                LogAssessment::Compiling | LogAssessment::Clean => {
                    if preview.is_none() {
                        preview = self.preview_info().await?;
                    }
                    if let Some(info) = &preview {
                        if self.probe.check(info).await {
                            info!(url = %info.url, iteration, "Server is healthy");
                            return Ok(SupervisorOutcome::Ready {
                                url: info.url.clone(),
                                iterations: iteration,
                                attempts,
                            });
                        }
                        debug!("Liveness probe not answering yet");
                    }
                }
            }

            tokio::time::sleep(self.config.validation.interval()).await;
        }

        let alive = server.is_alive().await?;
        warn!(alive, attempts, "Validation budget exhausted");
        Ok(SupervisorOutcome::Failed {
            reason: "health check timeout".to_string(),
            last_classification,
            attempts,
        })
    }

    async fn preview_info(&self) -> Result<Option<PreviewInfo>, PlatformError> {
        match self.sandbox.preview_url(self.config.server.port).await {
            Ok(info) => Ok(Some(info)),
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                debug!("Preview URL not available yet: {e}");
                Ok(None)
            }
        }
    }
}
