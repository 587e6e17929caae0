use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "medbay.toml";

/// Environment variable consulted when `[platform].api_key` is not set.
pub const API_KEY_ENV: &str = "MEDBAY_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub env: EnvConfig,
    #[serde(default)]
    pub install: InstallConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub runaway: RunawayConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Directory for session records, relative to the working directory
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            server: ServerConfig::default(),
            env: EnvConfig::default(),
            install: InstallConfig::default(),
            validation: ValidationConfig::default(),
            runaway: RunawayConfig::default(),
            repair: RepairConfig::default(),
            notifications: NotificationConfig::default(),
            state_dir: default_state_dir(),
        }
    }
}

/// Sandbox platform API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the sandbox platform API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key; falls back to the MEDBAY_API_KEY environment variable
    #[serde(default)]
    pub api_key: Option<String>,

    /// Template identifier for new sandboxes
    #[serde(default = "default_template")]
    pub template: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for sandbox creation in seconds
    #[serde(default = "default_create_timeout")]
    pub create_timeout_secs: u64,

    /// Minutes of inactivity before the platform stops the sandbox (0 = never)
    #[serde(default)]
    pub auto_stop_minutes: u32,

    /// Resource sizing for new sandboxes
    #[serde(default)]
    pub resources: ResourceConfig,

    /// Labels attached to new sandboxes
    #[serde(default = "default_labels")]
    pub labels: BTreeMap<String, String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            template: default_template(),
            request_timeout_secs: default_request_timeout(),
            create_timeout_secs: default_create_timeout(),
            auto_stop_minutes: 0,
            resources: ResourceConfig::default(),
            labels: default_labels(),
        }
    }
}

impl PlatformConfig {
    /// Resolve the API key from config or environment.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(API_KEY_ENV).with_context(|| {
            format!("No platform API key: set [platform].api_key or {API_KEY_ENV}")
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// CPU cores
    #[serde(default = "default_cpus")]
    pub cpus: u32,

    /// Memory in GiB
    #[serde(default = "default_memory_gb")]
    pub memory_gb: u32,

    /// Disk in GiB
    #[serde(default = "default_disk_gb")]
    pub disk_gb: u32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cpus: default_cpus(),
            memory_gb: default_memory_gb(),
            disk_gb: default_disk_gb(),
        }
    }
}

/// Dev server configuration inside the sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Command that starts the dev server
    #[serde(default = "default_server_command")]
    pub command: String,

    /// Port the server listens on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Project root inside the sandbox
    #[serde(default = "default_project_root")]
    pub project_root: String,

    /// File the server's combined output is captured to
    #[serde(default = "default_log_path")]
    pub log_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: default_server_command(),
            port: default_port(),
            project_root: default_project_root(),
            log_path: default_log_path(),
        }
    }
}

/// Environment file materialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Variable names that must appear in the env file
    #[serde(default = "default_required_vars")]
    pub required: Vec<String>,

    /// Env file path, relative to the project root
    #[serde(default = "default_env_file")]
    pub file_path: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            required: default_required_vars(),
            file_path: default_env_file(),
        }
    }
}

/// Dependency install configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Install command run after the manifest is updated
    #[serde(default = "default_install_command")]
    pub command: String,

    /// Install timeout in seconds
    #[serde(default = "default_install_timeout")]
    pub timeout_secs: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            command: default_install_command(),
            timeout_secs: default_install_timeout(),
        }
    }
}

impl InstallConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Validation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum validation iterations (shared with repairs)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Seconds between validation iterations
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Liveness probe timeout in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// File injection budget in seconds
    #[serde(default = "default_injection_timeout")]
    pub injection_timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            interval_secs: default_interval(),
            probe_timeout_secs: default_probe_timeout(),
            injection_timeout_secs: default_injection_timeout(),
        }
    }
}

impl ValidationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn injection_timeout(&self) -> Duration {
        Duration::from_secs(self.injection_timeout_secs)
    }
}

/// Runaway process detection thresholds.
///
/// Tuning parameters, not a contract: sampling granularity and hardware
/// class shift what "pinned" looks like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunawayConfig {
    /// CPU percentage at or above which a full window triggers a kill
    #[serde(default = "default_kill_threshold")]
    pub kill_threshold: f64,

    /// CPU percentage counted as a high sample
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f64,

    /// Number of consecutive samples considered
    #[serde(default = "default_window")]
    pub window: usize,

    /// High samples required within the window
    #[serde(default = "default_min_high_samples")]
    pub min_high_samples: usize,
}

impl Default for RunawayConfig {
    fn default() -> Self {
        Self {
            kill_threshold: default_kill_threshold(),
            high_threshold: default_high_threshold(),
            window: default_window(),
            min_high_samples: default_min_high_samples(),
        }
    }
}

/// Repair engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairConfig {
    /// Command line for the repair assistant (prompt is piped to stdin)
    #[serde(default = "default_assistant_command")]
    pub assistant_command: String,

    /// Assistant invocation timeout in seconds
    #[serde(default = "default_assistant_timeout")]
    pub assistant_timeout_secs: u64,

    /// Log lines pulled per classification pass
    #[serde(default = "default_log_tail_lines")]
    pub log_tail_lines: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            assistant_command: default_assistant_command(),
            assistant_timeout_secs: default_assistant_timeout(),
            log_tail_lines: default_log_tail_lines(),
        }
    }
}

impl RepairConfig {
    pub fn assistant_timeout(&self) -> Duration {
        Duration::from_secs(self.assistant_timeout_secs)
    }
}

/// Lifecycle event notifications
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook receiving lifecycle events; accepts a bare URL or "webhook:<url>"
    #[serde(default)]
    pub webhook: Option<String>,
}

// Default value functions

fn default_base_url() -> String {
    "https://api.sandboxes.dev".to_string()
}

fn default_template() -> String {
    "nextjs-dev".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_create_timeout() -> u64 {
    120
}

fn default_cpus() -> u32 {
    2
}

fn default_memory_gb() -> u32 {
    4
}

fn default_disk_gb() -> u32 {
    8
}

fn default_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("managed-by".to_string(), "medbay".to_string())])
}

fn default_server_command() -> String {
    "npm run dev".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_project_root() -> String {
    "/home/user/app".to_string()
}

fn default_log_path() -> String {
    "/tmp/dev-server.log".to_string()
}

fn default_required_vars() -> Vec<String> {
    vec![
        "NEXT_PUBLIC_SUPABASE_URL".to_string(),
        "NEXT_PUBLIC_SUPABASE_ANON_KEY".to_string(),
        "SUPABASE_SERVICE_ROLE_KEY".to_string(),
        "DATABASE_URL".to_string(),
    ]
}

fn default_env_file() -> String {
    ".env.local".to_string()
}

fn default_install_command() -> String {
    "npm install --legacy-peer-deps".to_string()
}

fn default_install_timeout() -> u64 {
    300
}

fn default_max_iterations() -> u32 {
    30
}

fn default_interval() -> u64 {
    1
}

fn default_probe_timeout() -> u64 {
    2
}

fn default_injection_timeout() -> u64 {
    60
}

fn default_kill_threshold() -> f64 {
    90.0
}

fn default_high_threshold() -> f64 {
    85.0
}

fn default_window() -> usize {
    3
}

fn default_min_high_samples() -> usize {
    2
}

fn default_assistant_command() -> String {
    "claude -p".to_string()
}

fn default_assistant_timeout() -> u64 {
    120
}

fn default_log_tail_lines() -> u32 {
    50
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".medbay")
}

impl Config {
    /// Load configuration from file, using defaults if not found
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Overall wall-clock budget for one provisioning session:
    /// injection + dependency install + the full validation loop.
    pub fn session_deadline(&self) -> Duration {
        self.validation.injection_timeout()
            + self.install.timeout()
            + self.validation.interval() * self.validation.max_iterations
    }
}
