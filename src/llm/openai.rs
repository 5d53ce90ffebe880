//! OpenAI-compatible chat completion client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;

use super::{ChatClient, ChatMessage, ChatOptions, Role};

/// Wire format for one chat message.
#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

/// Chat completion request body.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ApiMessage,
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatClient {
    http: Client,
    base_url: String,
    api_key: String,
    project: Option<String>,
}

impl OpenAiCompatClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build inference HTTP client")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            project: config.project.clone(),
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let body = ChatCompletionRequest {
            model: options.model.clone(),
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: role_name(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body);
        if let Some(project) = &self.project {
            request = request.header("OpenAI-Project", project);
        }

        let response = request
            .send()
            .await
            .context("Chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat endpoint returned {}: {}", status, text);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to decode chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Chat completion response had no choices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_skips_unset_options() {
        let body = ChatCompletionRequest {
            model: "openai/gpt-4o".to_string(),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
            temperature: None,
            max_tokens: Some(2048),
            top_p: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"max_tokens\":2048"));
        assert!(!json.contains("temperature"));
        assert!(!json.contains("top_p"));
    }
}
