use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::models::Session;

/// Stage labels for structured progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopStage {
    Director,
    Generator,
    Injector,
    Executor,
    Verdict,
    Done,
}

/// One structured progress event emitted during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopEvent {
    pub iteration: u32,
    pub stage: LoopStage,
    pub message: String,
}

/// Sink for structured progress events.
pub type LogSink = Arc<dyn Fn(LoopEvent) + Send + Sync>;

/// Options for one orchestrated session.
#[derive(Clone)]
pub struct OrchestrateOptions {
    /// Upper bound on full refinement rounds
    pub max_iterations: u32,
    /// Inner retry budget for code extraction within one generator call
    pub max_retries: u32,
    pub language: String,
    pub model: String,
    /// Used for file paths and trace namespacing
    pub agent_name: String,
    pub system_prompt: Option<String>,
    pub judging_criteria: Option<String>,
    pub log_sink: Option<LogSink>,
    /// Checked between suspension points and raced against in-flight calls
    pub cancel: Option<CancellationToken>,
    /// Final code of a prior persisted session when continuing an agent
    pub prior_code: Option<String>,
}

impl OrchestrateOptions {
    pub fn new(agent_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            max_iterations: 3,
            max_retries: 3,
            language: "typescript".to_string(),
            model: model.into(),
            agent_name: agent_name.into(),
            system_prompt: None,
            judging_criteria: None,
            log_sink: None,
            cancel: None,
            prior_code: None,
        }
    }
}

impl fmt::Debug for OrchestrateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestrateOptions")
            .field("max_iterations", &self.max_iterations)
            .field("max_retries", &self.max_retries)
            .field("language", &self.language)
            .field("model", &self.model)
            .field("agent_name", &self.agent_name)
            .finish_non_exhaustive()
    }
}

/// Fatal orchestration failure.
///
/// Carries the stamped session so callers still receive the complete case
/// file: every attempt, the last error classification, and the last output.
#[derive(Debug, thiserror::Error)]
#[error("session for agent '{}' failed: {}", .session.agent_name, .source)]
pub struct OrchestrateError {
    pub session: Box<Session>,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}
