mod code_utils;
mod director;
mod executor;
mod generator;
mod json_utils;

pub use code_utils::extract_code;
pub use director::LlmDirector;
pub use executor::SandboxRunner;
pub use generator::{GenerationOutcome, LlmGenerator};
pub use json_utils::{extract_json_block, parse_json_lenient};

use async_trait::async_trait;

use crate::models::{Attempt, Execution, PromptRefinement, Verdict};

/// Facts about the previous attempt fed back into prompt refinement.
#[derive(Debug, Clone, Default)]
pub struct PreviousAttemptFacts {
    pub prompt: Option<String>,
    pub code: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Context for the Director's prompt-improvement duty.
#[derive(Debug, Clone)]
pub struct RefinementContext {
    pub task: String,
    pub language: String,
    pub agent_name: String,
    pub system_prompt: Option<String>,
    pub judging_criteria: Option<String>,
    /// Final code of a prior persisted session when continuing an agent
    pub prior_code: Option<String>,
    pub previous: Option<PreviousAttemptFacts>,
}

/// Context for the Director's retry-or-stop verdict.
#[derive(Debug, Clone, Copy)]
pub struct VerdictContext {
    pub current_iteration: u32,
    pub max_iterations: u32,
}

/// The prompt strategist: improves prompts, judges attempts, names results.
///
/// Every duty degrades to a safe default internally; a Director call never
/// kills the refinement loop.
#[async_trait]
pub trait Director: Send + Sync {
    /// Refine the task prompt, optionally steering with prior-attempt facts.
    async fn improve_prompt(&self, ctx: &RefinementContext) -> PromptRefinement;

    /// Decide whether the loop should retry given the full attempt history.
    async fn verdict(&self, task: &str, attempts: &[Attempt], ctx: VerdictContext) -> Verdict;

    /// Produce a one-line human description of the finished agent.
    async fn describe(&self, agent_name: &str, task: &str, final_code: Option<&str>) -> String;
}

/// The code author: prompts the LLM and extracts code from the response.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate code for the prompt. Extraction failure is a structured
    /// outcome, never an error.
    async fn generate(&self, prompt: &str, language: &str) -> GenerationOutcome;
}

/// The observer: runs code remotely and classifies the outcome.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Execute code in the sandbox. Transport failures are captured as
    /// sandbox-classified executions, never propagated.
    async fn execute(&self, code: &str, language: &str) -> Execution;
}
