//! Scripted fake sandbox for testing.
//!
//! Keeps an in-memory filesystem and an ordered command log, and
//! answers exec calls from scripted response sequences so pipeline
//! tests can drive every supervisor outcome without a real platform.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ExecOutput, ExecRequest, PlatformError, PreviewInfo, SandboxHandle, SandboxPlatform};

/// Shorthand for a successful exec output.
pub(crate) fn exec_ok(stdout: &str) -> ExecOutput {
    ExecOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

/// Shorthand for a failed exec output.
pub(crate) fn exec_failed(exit_code: i32, stderr: &str) -> ExecOutput {
    ExecOutput {
        exit_code,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// One scripted response sequence, matched by command substring.
struct Script {
    needle: String,
    outputs: Vec<ExecOutput>,
    next: usize,
}

#[derive(Default)]
struct FakeState {
    files: HashMap<String, String>,
    exec_log: Vec<String>,
    scripts: Vec<Script>,
    corrupt_paths: Vec<String>,
    fail_transport: bool,
    terminated: bool,
    exec_delay: Option<Duration>,
}

/// A fake sandbox with an in-memory filesystem and scripted exec responses.
///
/// Clones share state, so tests can keep one clone for assertions while
/// the pipeline owns another.
#[derive(Clone)]
pub(crate) struct FakeSandbox {
    id: Arc<String>,
    state: Arc<Mutex<FakeState>>,
    exec_count: Arc<AtomicUsize>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self {
            id: Arc::new("sb-fake".to_string()),
            state: Arc::new(Mutex::new(FakeState::default())),
            exec_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script a single response for commands containing `needle`.
    /// Repeated matches keep returning the same output.
    pub fn script(&self, needle: &str, output: ExecOutput) {
        self.script_seq(needle, vec![output]);
    }

    /// Script a response sequence for commands containing `needle`.
    /// The final output repeats once the sequence is exhausted.
    pub fn script_seq(&self, needle: &str, outputs: Vec<ExecOutput>) {
        let mut state = self.state.lock().unwrap();
        state.scripts.push(Script {
            needle: needle.to_string(),
            outputs,
            next: 0,
        });
    }

    /// Make every subsequent operation fail as unreachable.
    pub fn set_fail_transport(&self, fail: bool) {
        self.state.lock().unwrap().fail_transport = fail;
    }

    /// Sleep before every exec, for deadline tests.
    pub fn set_exec_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exec_delay = Some(delay);
    }

    /// Store corrupted content for this path, so read-back verification fails.
    pub fn corrupt_path(&self, path: &str) {
        self.state.lock().unwrap().corrupt_paths.push(path.to_string());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().unwrap().files.get(path).cloned()
    }

    pub fn exec_history(&self) -> Vec<String> {
        self.state.lock().unwrap().exec_log.clone()
    }

    pub fn exec_count(&self) -> usize {
        self.exec_count.load(Ordering::SeqCst)
    }

    /// Number of force-kill commands issued.
    pub fn kill_count(&self) -> usize {
        self.exec_history()
            .iter()
            .filter(|cmd| cmd.contains("kill -9"))
            .count()
    }

    pub fn terminated(&self) -> bool {
        self.state.lock().unwrap().terminated
    }

    fn check_transport(&self) -> Result<(), PlatformError> {
        if self.state.lock().unwrap().fail_transport {
            return Err(PlatformError::unreachable("fake transport down"));
        }
        Ok(())
    }
}

#[async_trait]
impl SandboxHandle for FakeSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(&self, request: ExecRequest) -> Result<ExecOutput, PlatformError> {
        let delay = self.state.lock().unwrap().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.exec_count.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        state.exec_log.push(request.command.clone());
        if state.fail_transport {
            return Err(PlatformError::unreachable("fake transport down"));
        }

        for script in &mut state.scripts {
            if request.command.contains(&script.needle) {
                let index = script.next.min(script.outputs.len() - 1);
                script.next += 1;
                return Ok(script.outputs[index].clone());
            }
        }

        Ok(exec_ok(""))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), PlatformError> {
        self.check_transport()?;
        let mut state = self.state.lock().unwrap();
        let stored = if state.corrupt_paths.iter().any(|p| p == path) {
            format!("{content}\u{0}")
        } else {
            content.to_string()
        };
        state.files.insert(path.to_string(), stored);
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, PlatformError> {
        self.check_transport()?;
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| PlatformError::api(404, format!("no such file: {path}")))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, PlatformError> {
        self.check_transport()?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let state = self.state.lock().unwrap();
        let mut entries: Vec<String> = state
            .files
            .keys()
            .filter_map(|p| p.strip_prefix(&prefix))
            .map(|rest| rest.split('/').next().unwrap_or(rest).to_string())
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }

    async fn preview_url(&self, port: u16) -> Result<PreviewInfo, PlatformError> {
        self.check_transport()?;
        Ok(PreviewInfo {
            url: format!("https://{port}-{}.preview.fake.dev", self.id),
            token: Some("fake-preview-token".to_string()),
        })
    }

    async fn terminate(&self) -> Result<(), PlatformError> {
        self.check_transport()?;
        self.state.lock().unwrap().terminated = true;
        Ok(())
    }
}

/// Platform returning clones of one fake sandbox.
#[derive(Clone)]
pub(crate) struct FakePlatform {
    sandbox: FakeSandbox,
    fail_create: bool,
}

impl FakePlatform {
    pub fn new(sandbox: FakeSandbox) -> Self {
        Self {
            sandbox,
            fail_create: false,
        }
    }

    /// Platform whose create call fails as unreachable.
    pub fn unreachable() -> Self {
        Self {
            sandbox: FakeSandbox::new(),
            fail_create: true,
        }
    }
}

#[async_trait]
impl SandboxPlatform for FakePlatform {
    async fn create(&self, _template: &str) -> Result<Box<dyn SandboxHandle>, PlatformError> {
        if self.fail_create {
            return Err(PlatformError::unreachable("fake platform down"));
        }
        Ok(Box::new(self.sandbox.clone()))
    }

    async fn connect(&self, _id: &str) -> Result<Box<dyn SandboxHandle>, PlatformError> {
        if self.fail_create {
            return Err(PlatformError::unreachable("fake platform down"));
        }
        Ok(Box::new(self.sandbox.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_round_trip() {
        let sandbox = FakeSandbox::new();
        sandbox.write_file("app/page.tsx", "export {}").await.unwrap();
        assert_eq!(sandbox.read_file("app/page.tsx").await.unwrap(), "export {}");
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let sandbox = FakeSandbox::new();
        let err = sandbox.read_file("nope.ts").await.unwrap_err();
        assert!(!err.is_transport());
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn test_scripted_sequence_repeats_last() {
        let sandbox = FakeSandbox::new();
        sandbox.script_seq("ps -p", vec![exec_ok("10.0"), exec_ok("95.0")]);

        let first = sandbox.exec(ExecRequest::new("ps -p 42 -o %cpu=")).await.unwrap();
        let second = sandbox.exec(ExecRequest::new("ps -p 42 -o %cpu=")).await.unwrap();
        let third = sandbox.exec(ExecRequest::new("ps -p 42 -o %cpu=")).await.unwrap();

        assert_eq!(first.stdout, "10.0");
        assert_eq!(second.stdout, "95.0");
        assert_eq!(third.stdout, "95.0");
        assert_eq!(sandbox.exec_count(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let sandbox = FakeSandbox::new();
        sandbox.set_fail_transport(true);
        let err = sandbox.exec(ExecRequest::new("ls")).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_corrupt_path_breaks_round_trip() {
        let sandbox = FakeSandbox::new();
        sandbox.corrupt_path("bad.tsx");
        sandbox.write_file("bad.tsx", "content").await.unwrap();
        assert_ne!(sandbox.read_file("bad.tsx").await.unwrap(), "content");
    }

    #[tokio::test]
    async fn test_list_dir() {
        let sandbox = FakeSandbox::new();
        sandbox.write_file("app/page.tsx", "a").await.unwrap();
        sandbox.write_file("app/layout.tsx", "b").await.unwrap();
        sandbox.write_file("app/components/nav.tsx", "c").await.unwrap();

        let entries = sandbox.list_dir("app").await.unwrap();
        assert_eq!(entries, vec!["components", "layout.tsx", "page.tsx"]);
    }
}
