use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Execution
// ============================================================================

/// Classification of a sandbox execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Syntactic or type error reported by the sandbox toolchain
    Compilation,
    /// The code ran and reported its own failure via the JSON convention
    Runtime,
    /// Transport error or sandbox-reported infrastructure error
    Sandbox,
    /// No error
    #[default]
    None,
}

/// Result of running one attempt's code in the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub success: bool,
    /// Combined stdout/stderr captured by the sandbox
    pub output: String,
    /// First stdout line that parses as a JSON object, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_output: Option<Value>,
    #[serde(default)]
    pub error_type: ErrorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    pub fn succeeded(output: String, parsed_output: Option<Value>) -> Self {
        Self {
            success: true,
            output,
            parsed_output,
            error_type: ErrorType::None,
            error: None,
        }
    }

    pub fn failed(
        output: String,
        parsed_output: Option<Value>,
        error_type: ErrorType,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            output,
            parsed_output,
            error_type,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Attempt
// ============================================================================

/// One Director → Generator → Executor pass within a session.
///
/// Attempts are appended in iteration order and never reordered or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    /// 1-indexed, strictly monotonic, no gaps
    pub attempt_number: u32,
    pub timestamp: DateTime<Utc>,
    /// The prompt used for this iteration, as refined by the Director
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub extraction_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
    /// Director critical feedback carried into the next attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    /// Number of underlying chat calls the generator spent on this attempt
    #[serde(default)]
    pub llm_calls: u32,
}

impl Attempt {
    pub fn new(attempt_number: u32, prompt: impl Into<String>) -> Self {
        Self {
            attempt_number,
            timestamp: Utc::now(),
            prompt: Some(prompt.into()),
            extraction_success: false,
            raw_response: None,
            extracted_code: None,
            error: None,
            execution: None,
            recommendation: None,
            llm_calls: 0,
        }
    }

    /// Whether this attempt's execution succeeded.
    pub fn execution_succeeded(&self) -> bool {
        self.execution.as_ref().is_some_and(|e| e.success)
    }
}

// ============================================================================
// Session
// ============================================================================

/// File paths written by the persister for an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFiles {
    pub index_file: String,
    pub metadata_file: String,
}

/// One entry per orchestrated run of an agent (initial run + continuations).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinuationEntry {
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub attempt_count: u32,
}

/// Wall-clock spent per stage, accumulated across all iterations.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageTimings {
    pub director: Duration,
    pub generator: Duration,
    pub executor: Duration,
    pub total: Duration,
}

/// The complete, inspectable case file of one orchestrator invocation.
///
/// Exclusively owned by the session loop while it runs, then handed to the
/// persister for write and to the caller read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(rename = "versionID")]
    pub version_id: String,
    pub agent_name: String,
    /// The original user task, verbatim
    #[serde(rename = "ogprompt")]
    pub original_task: String,
    pub timestamp: DateTime<Utc>,
    pub language: String,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    pub was_executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judging_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<SessionFiles>,
    /// Timeline of runs that contributed attempts to this agent
    #[serde(default)]
    pub sessions: Vec<ContinuationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub success: bool,
    #[serde(skip)]
    pub timings: StageTimings,
}

impl Session {
    pub fn new(agent_name: impl Into<String>, task: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            version_id: uuid::Uuid::new_v4().to_string(),
            agent_name: agent_name.into(),
            original_task: task.into(),
            timestamp: Utc::now(),
            language: language.into(),
            attempts: Vec::new(),
            was_executed: false,
            final_code: None,
            agent_description: None,
            system_prompt: None,
            judging_criteria: None,
            files: None,
            sessions: Vec::new(),
            error: None,
            stack_trace: None,
            success: false,
            timings: StageTimings::default(),
        }
    }

    pub fn last_attempt(&self) -> Option<&Attempt> {
        self.attempts.last()
    }

    pub fn last_attempt_mut(&mut self) -> Option<&mut Attempt> {
        self.attempts.last_mut()
    }

    /// Next attempt number, continuing monotonically from prior attempts.
    pub fn next_attempt_number(&self) -> u32 {
        self.attempts.last().map(|a| a.attempt_number).unwrap_or(0) + 1
    }

    /// Record the run that produced the current tail of `attempts`.
    pub fn record_run(&mut self, prompt: &str, attempt_count: u32) {
        self.sessions.push(ContinuationEntry {
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            attempt_count,
        });
    }

    /// Stamp a fatal error on the session before it is surfaced to the caller.
    pub fn stamp_error(&mut self, error: impl Into<String>, stack_trace: impl Into<String>) {
        self.error = Some(error.into());
        self.stack_trace = Some(stack_trace.into());
        self.success = false;
    }
}

/// File extension for a sandbox language.
pub fn language_extension(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "typescript" => "ts",
        "javascript" => "js",
        "python" => "py",
        _ => "txt",
    }
}
