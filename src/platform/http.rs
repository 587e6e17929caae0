//! HTTP implementation of the sandbox platform traits.
//!
//! Talks to the platform's REST API: one resource per sandbox, exec and
//! file endpoints under it. Connection failures map to
//! [`PlatformError::Unreachable`]; everything else stays a per-operation
//! outcome.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{ExecOutput, ExecRequest, PlatformError, PreviewInfo, SandboxHandle, SandboxPlatform};
use crate::config::PlatformConfig;

const API_KEY_HEADER: &str = "X-API-Key";

/// Client for the sandbox platform REST API.
pub struct HttpPlatform {
    client: Client,
    base_url: String,
    api_key: String,
    config: PlatformConfig,
}

#[derive(Debug, Serialize)]
struct CreateSandboxRequest<'a> {
    template: &'a str,
    name: String,
    auto_stop_minutes: u32,
    resources: ResourceSpec,
    labels: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct ResourceSpec {
    cpus: u32,
    memory_gb: u32,
    disk_gb: u32,
}

#[derive(Debug, Deserialize)]
struct SandboxInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct ExecApiRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cwd: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
    background: bool,
}

#[derive(Debug, Deserialize)]
struct ExecApiResponse {
    #[serde(default)]
    exit_code: i32,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

#[derive(Debug, Serialize)]
struct WriteFileRequest<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReadFileResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ListDirResponse {
    entries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PreviewResponse {
    url: String,
    #[serde(default)]
    token: Option<String>,
}

impl HttpPlatform {
    /// Build a client from platform configuration and a resolved API key.
    pub fn new(config: PlatformConfig, api_key: String) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PlatformError::protocol(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
            config,
        })
    }

    fn handle(&self, id: String) -> HttpSandbox {
        HttpSandbox {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            request_timeout: self.config.request_timeout(),
            id,
        }
    }
}

#[async_trait]
impl SandboxPlatform for HttpPlatform {
    async fn create(&self, template: &str) -> Result<Box<dyn SandboxHandle>, PlatformError> {
        let url = format!("{}/sandboxes", self.base_url);
        let name = format!(
            "medbay-{}",
            uuid::Uuid::new_v4().to_string().split('-').next().unwrap_or("0")
        );
        let request = CreateSandboxRequest {
            template,
            name,
            auto_stop_minutes: self.config.auto_stop_minutes,
            resources: ResourceSpec {
                cpus: self.config.resources.cpus,
                memory_gb: self.config.resources.memory_gb,
                disk_gb: self.config.resources.disk_gb,
            },
            labels: &self.config.labels,
        };

        debug!(url = %url, template = %template, "Creating sandbox");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(self.config.create_timeout())
            .json(&request)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.config.create_timeout()))?;

        let info: SandboxInfo = decode_json(response).await?;
        debug!(id = %info.id, "Sandbox created");

        Ok(Box::new(self.handle(info.id)))
    }

    async fn connect(&self, id: &str) -> Result<Box<dyn SandboxHandle>, PlatformError> {
        let url = format!("{}/sandboxes/{}", self.base_url, id);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.config.request_timeout()))?;

        let info: SandboxInfo = decode_json(response).await?;

        Ok(Box::new(self.handle(info.id)))
    }
}

/// Handle for one remote sandbox.
pub struct HttpSandbox {
    client: Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    id: String,
}

impl HttpSandbox {
    fn url(&self, suffix: &str) -> String {
        format!("{}/sandboxes/{}{}", self.base_url, self.id, suffix)
    }
}

#[async_trait]
impl SandboxHandle for HttpSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(&self, request: ExecRequest) -> Result<ExecOutput, PlatformError> {
        let url = self.url("/exec");
        // Give the HTTP layer headroom over the in-sandbox timeout
        let http_timeout = request
            .timeout
            .map_or(self.request_timeout, |t| t + Duration::from_secs(5));

        let api_request = ExecApiRequest {
            command: &request.command,
            cwd: request.cwd.as_deref(),
            timeout_secs: request.timeout.map(|t| t.as_secs()),
            background: request.background,
        };

        debug!(command = %request.command, background = request.background, "Executing command");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(http_timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| map_request_error(e, http_timeout))?;

        let api_response: ExecApiResponse = decode_json(response).await?;

        Ok(ExecOutput {
            exit_code: api_response.exit_code,
            stdout: api_response.stdout,
            stderr: api_response.stderr,
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), PlatformError> {
        let url = self.url("/files");
        let request = WriteFileRequest { path, content };

        let response = self
            .client
            .put(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.request_timeout))?;

        check_status(response).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String, PlatformError> {
        let url = self.url("/files");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| map_request_error(e, self.request_timeout))?;

        let body: ReadFileResponse = decode_json(response).await?;
        Ok(body.content)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<String>, PlatformError> {
        let url = self.url("/files/list");

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| map_request_error(e, self.request_timeout))?;

        let body: ListDirResponse = decode_json(response).await?;
        Ok(body.entries)
    }

    async fn preview_url(&self, port: u16) -> Result<PreviewInfo, PlatformError> {
        let url = self.url(&format!("/preview/{port}"));

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.request_timeout))?;

        let body: PreviewResponse = decode_json(response).await?;
        Ok(PreviewInfo {
            url: body.url,
            token: body.token,
        })
    }

    async fn terminate(&self) -> Result<(), PlatformError> {
        let url = self.url("");

        debug!(id = %self.id, "Terminating sandbox");

        let response = self
            .client
            .delete(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.request_timeout))?;

        check_status(response).await?;
        Ok(())
    }
}

/// Map a reqwest error onto the platform taxonomy.
fn map_request_error(e: reqwest::Error, timeout: Duration) -> PlatformError {
    if e.is_timeout() {
        PlatformError::timeout(timeout)
    } else if e.is_connect() {
        PlatformError::unreachable(e.to_string())
    } else {
        PlatformError::protocol(e.to_string())
    }
}

/// Fail on non-success status, carrying the response body.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PlatformError::api(status.as_u16(), body))
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PlatformError> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| PlatformError::protocol(e.to_string()))
}
