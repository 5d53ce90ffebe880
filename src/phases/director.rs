use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::llm::{ChatClient, ChatMessage, ChatOptions};
use crate::models::{Attempt, PromptRefinement, Verdict};

use super::{Director, RefinementContext, VerdictContext, parse_json_lenient};

/// Length of the task excerpt used in the deterministic description fallback.
const FALLBACK_DESCRIPTION_CHARS: usize = 60;

/// Director implementation backed by the chat endpoint.
///
/// Centralizes all LLM-mediated judgment: prompt refinement, the retry
/// verdict, and the agent description. It never sees or edits utility
/// source, and every duty degrades to a safe default on any failure.
pub struct LlmDirector {
    client: Arc<dyn ChatClient>,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImprovementReply {
    improved_prompt: String,
    #[serde(default)]
    improvements: Vec<String>,
    #[serde(default)]
    critical_feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerdictReply {
    should_retry: bool,
    #[serde(default)]
    reasoning: String,
}

impl LlmDirector {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            options: ChatOptions::for_model(model),
        }
    }

    fn improvement_system_prompt(ctx: &RefinementContext) -> String {
        let mut prompt = format!(
            r#"You are the prompt strategist for an automated code factory.
Your job is to rewrite a user's task description into a precise, executable
specification for a {} code generator.

Rules:
- Preserve the user's intent exactly; never add features they did not ask for
- Make inputs, outputs, and edge cases explicit
- The generated program must print a single JSON object to stdout with a
  boolean "success" field plus its result fields

Return ONLY a JSON object:
```json
{{
  "improvedPrompt": "the rewritten prompt",
  "improvements": ["what you changed and why"],
  "criticalFeedback": "the single most important issue to fix, or null"
}}
```"#,
            ctx.language
        );

        if let Some(system) = &ctx.system_prompt {
            prompt.push_str(&format!("\n\nOperator system prompt:\n{}", system));
        }
        if let Some(criteria) = &ctx.judging_criteria {
            prompt.push_str(&format!("\n\nJudging criteria:\n{}", criteria));
        }
        prompt
    }

    fn improvement_user_prompt(ctx: &RefinementContext) -> String {
        let mut prompt = format!(
            "## Task\n{}\n\n## Target agent\n{}\n",
            ctx.task, ctx.agent_name
        );

        if let Some(code) = &ctx.prior_code {
            prompt.push_str(&format!(
                "\n## Existing agent code (this run continues it)\n```\n{}\n```\n",
                code
            ));
        }

        if let Some(prev) = &ctx.previous {
            prompt.push_str("\n## Previous attempt\n");
            if let Some(p) = &prev.prompt {
                prompt.push_str(&format!("Prompt used:\n{}\n\n", p));
            }
            if let Some(c) = &prev.code {
                prompt.push_str(&format!("Generated code:\n```\n{}\n```\n\n", c));
            }
            if let Some(o) = &prev.output {
                prompt.push_str(&format!("Execution output:\n{}\n\n", o));
            }
            if let Some(e) = &prev.error {
                prompt.push_str(&format!("Error:\n{}\n\n", e));
            }
            prompt.push_str(
                "Refine the prompt so the next attempt avoids the failure above.\n",
            );
        }

        prompt
    }

    fn verdict_prompt(
        task: &str,
        attempts: &[Attempt],
        ctx: VerdictContext,
    ) -> String {
        let mut history = String::new();
        for attempt in attempts {
            history.push_str(&format!("### Attempt {}\n", attempt.attempt_number));
            if let Some(p) = &attempt.prompt {
                history.push_str(&format!("Prompt: {}\n", p));
            }
            if let Some(c) = &attempt.extracted_code {
                history.push_str(&format!("Code:\n```\n{}\n```\n", c));
            }
            match &attempt.execution {
                Some(exec) => {
                    history.push_str(&format!(
                        "Execution: success={}, errorType={:?}\nOutput:\n{}\n",
                        exec.success, exec.error_type, exec.output
                    ));
                    if let Some(e) = &exec.error {
                        history.push_str(&format!("Error: {}\n", e));
                    }
                }
                None => history.push_str("Execution: not run\n"),
            }
            history.push('\n');
        }

        format!(
            r#"You are judging an automated code-refinement loop.

## User goal
{}

## Attempt history
{}
## Loop position
Iteration {} of {}.

Decide whether another refinement round is worthwhile. Retry only if:
- the last execution was not a success AND the error kind leaves plausible
  room to improve within the remaining iterations, OR
- the execution succeeded but the output clearly fails the user's stated goal.

Otherwise stop (success, or no realistic path to improvement).

Return ONLY a JSON object:
```json
{{
  "shouldRetry": true,
  "reasoning": "one or two sentences"
}}
```"#,
            task, history, ctx.current_iteration, ctx.max_iterations
        )
    }

    /// Deterministic description used whenever the LLM call or parse fails.
    fn fallback_description(agent_name: &str, task: &str) -> String {
        let excerpt: String = task.chars().take(FALLBACK_DESCRIPTION_CHARS).collect();
        format!("{}: {}", agent_name, excerpt)
    }
}

#[async_trait]
impl Director for LlmDirector {
    async fn improve_prompt(&self, ctx: &RefinementContext) -> PromptRefinement {
        let messages = vec![
            ChatMessage::system(Self::improvement_system_prompt(ctx)),
            ChatMessage::user(Self::improvement_user_prompt(ctx)),
        ];

        let response = match self.client.chat(&messages, &self.options).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Director improvement call failed, using original prompt: {}", e);
                return PromptRefinement::fallback(ctx.task.clone());
            }
        };

        let parsed = parse_json_lenient(&response)
            .and_then(|v| serde_json::from_value::<ImprovementReply>(v).ok());

        match parsed {
            Some(reply) => {
                debug!(
                    improvements = reply.improvements.len(),
                    "Director refined prompt"
                );
                PromptRefinement {
                    original_prompt: ctx.task.clone(),
                    improved_prompt: reply.improved_prompt,
                    improvements: reply.improvements,
                    critical_feedback: reply.critical_feedback.filter(|f| !f.is_empty()),
                    success: true,
                }
            }
            None => {
                warn!("Could not parse Director improvement reply, using original prompt");
                PromptRefinement::fallback(ctx.task.clone())
            }
        }
    }

    async fn verdict(&self, task: &str, attempts: &[Attempt], ctx: VerdictContext) -> Verdict {
        let messages = vec![ChatMessage::user(Self::verdict_prompt(task, attempts, ctx))];

        let response = match self.client.chat(&messages, &self.options).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Director verdict call failed, stopping loop: {}", e);
                return Verdict::stop(format!("Verdict call failed: {}", e));
            }
        };

        let parsed = parse_json_lenient(&response)
            .and_then(|v| serde_json::from_value::<VerdictReply>(v).ok());

        match parsed {
            Some(reply) => {
                info!(
                    should_retry = reply.should_retry,
                    "Director verdict: {}", reply.reasoning
                );
                Verdict {
                    should_retry: reply.should_retry,
                    reasoning: reply.reasoning,
                }
            }
            None => {
                warn!("Could not parse Director verdict reply, stopping loop");
                Verdict::stop("Could not parse verdict response")
            }
        }
    }

    async fn describe(&self, agent_name: &str, task: &str, final_code: Option<&str>) -> String {
        let code_section = final_code
            .map(|c| format!("\n## Final code\n```\n{}\n```\n", c))
            .unwrap_or_default();
        let prompt = format!(
            r#"Write a one-line description (under 100 characters) of what this
agent does, suitable for a capability catalog. Respond with ONLY the
description, no quotes.

## Agent name
{}

## Original task
{}
{}"#,
            agent_name, task, code_section
        );

        match self.client.chat(&[ChatMessage::user(prompt)], &self.options).await {
            Ok(text) => {
                let line = text.lines().find(|l| !l.trim().is_empty());
                match line {
                    Some(l) => l.trim().trim_matches('"').to_string(),
                    None => Self::fallback_description(agent_name, task),
                }
            }
            Err(e) => {
                warn!("Description call failed, using fallback: {}", e);
                Self::fallback_description(agent_name, task)
            }
        }
    }
}
