use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::config::SandboxConfig;

use super::{SandboxClient, SandboxOutput};

#[derive(Debug, Serialize)]
struct RunCodeRequest<'a> {
    code: &'a str,
    language: &'a str,
}

/// HTTP client for the remote sandbox service.
pub struct HttpSandbox {
    http: Client,
    base_url: String,
    api_key: String,
}

impl HttpSandbox {
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build sandbox HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl SandboxClient for HttpSandbox {
    async fn run_code(&self, source: &str, language: &str) -> Result<SandboxOutput> {
        let url = format!("{}/run", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&RunCodeRequest {
                code: source,
                language,
            })
            .send()
            .await
            .context("Sandbox request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Sandbox returned {}: {}", status, text);
        }

        response
            .json::<SandboxOutput>()
            .await
            .context("Failed to decode sandbox response")
    }
}
