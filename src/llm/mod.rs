//! Chat transport for the inference endpoint.
//!
//! The factory treats the LLM as a black-box `chat(messages, options) -> text`
//! operation behind the [`ChatClient`] trait. All implementations share a
//! process-wide admission semaphore so at most [`MAX_IN_FLIGHT`] calls are in
//! flight at any instant.

mod openai;

pub use openai::OpenAiCompatClient;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

/// Cap on concurrent in-flight chat calls across the whole process.
pub const MAX_IN_FLIGHT: usize = 10;

static ADMISSION: Lazy<Arc<Semaphore>> = Lazy::new(|| Arc::new(Semaphore::new(MAX_IN_FLIGHT)));

/// Message role in a chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged entry in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call options for a chat completion.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl ChatOptions {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

/// Black-box chat completion endpoint.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send the conversation and return the assistant's text.
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String>;
}

/// Admission-controlled wrapper around any [`ChatClient`].
///
/// The permit is held as an owned guard for the duration of the inner call,
/// so it is released on success, on error, and when the future is dropped
/// mid-flight (cancellation).
pub struct RateLimited<C> {
    inner: C,
    semaphore: Arc<Semaphore>,
}

impl<C: ChatClient> RateLimited<C> {
    /// Wrap a client with the process-wide admission semaphore.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            semaphore: ADMISSION.clone(),
        }
    }

    /// Wrap a client with a caller-supplied semaphore (tests).
    pub fn with_semaphore(inner: C, semaphore: Arc<Semaphore>) -> Self {
        Self { inner, semaphore }
    }
}

#[async_trait]
impl<C: ChatClient> ChatClient for RateLimited<C> {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let _permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("LLM admission semaphore closed"))?;
        self.inner.chat(messages, options).await
    }
}

/// Tracing decorator for chat calls.
///
/// Purely observational: records call shape and outcome at debug level and
/// forwards everything unchanged. Its absence or failure has no behavioral
/// effect.
pub struct Traced<C> {
    inner: C,
}

impl<C: ChatClient> Traced<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: ChatClient> ChatClient for Traced<C> {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        debug!(
            model = %options.model,
            messages = messages.len(),
            "chat call"
        );
        let result = self.inner.chat(messages, options).await;
        match &result {
            Ok(text) => debug!(response_chars = text.len(), "chat ok"),
            Err(e) => debug!(error = %e, "chat failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowClient {
        in_flight: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatClient for SlowClient {
        async fn chat(&self, _messages: &[ChatMessage], _options: &ChatOptions) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn test_admission_caps_in_flight_calls() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let client = Arc::new(RateLimited::with_semaphore(
            SlowClient {
                in_flight: Arc::clone(&in_flight),
                max_seen: Arc::clone(&max_seen),
            },
            Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        ));

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move {
                    client
                        .chat(&[ChatMessage::user("hi")], &ChatOptions::for_model("m"))
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= MAX_IN_FLIGHT);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_permit_released_when_call_is_dropped() {
        struct Hang;

        #[async_trait]
        impl ChatClient for Hang {
            async fn chat(&self, _m: &[ChatMessage], _o: &ChatOptions) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let semaphore = Arc::new(Semaphore::new(1));
        let client = Arc::new(RateLimited::with_semaphore(Hang, Arc::clone(&semaphore)));

        let hung = tokio::spawn({
            let client = Arc::clone(&client);
            async move {
                let _ = client
                    .chat(&[ChatMessage::user("hi")], &ChatOptions::for_model("m"))
                    .await;
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(semaphore.available_permits(), 0);

        hung.abort();
        let _ = hung.await;
        assert_eq!(semaphore.available_permits(), 1);
    }
}
