//! Server liveness probing.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::platform::PreviewInfo;

/// Header carrying the preview auth token, when the platform issues one.
pub const PREVIEW_TOKEN_HEADER: &str = "x-preview-token";

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// True when the server answers on its public address.
    async fn check(&self, target: &PreviewInfo) -> bool;
}

/// Probe via a plain HTTP GET against the preview address.
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpProbe {
    async fn check(&self, target: &PreviewInfo) -> bool {
        let mut request = self.client.get(&target.url).timeout(self.timeout);
        if let Some(token) = &target.token {
            request = request.header(PREVIEW_TOKEN_HEADER, token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "Probe answered non-success");
                false
            }
            Err(e) => {
                debug!("Probe failed: {e}");
                false
            }
        }
    }
}
