use serde::{Deserialize, Serialize};

/// Outcome of the Director's prompt-improvement duty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRefinement {
    /// The prompt the user (or previous iteration) supplied
    pub original_prompt: String,
    /// The prompt the generator will actually receive
    pub improved_prompt: String,
    /// Textual improvements the Director claims to have made
    #[serde(default)]
    pub improvements: Vec<String>,
    /// Primary steering signal carried into the next iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_feedback: Option<String>,
    /// False when the Director response could not be parsed
    pub success: bool,
}

impl PromptRefinement {
    /// Degraded refinement: the original prompt is used verbatim.
    pub fn fallback(original: impl Into<String>) -> Self {
        let original = original.into();
        Self {
            improved_prompt: original.clone(),
            original_prompt: original,
            improvements: Vec::new(),
            critical_feedback: None,
            success: false,
        }
    }
}

/// The Director's retry-or-stop decision after an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub should_retry: bool,
    pub reasoning: String,
}

impl Verdict {
    /// Default verdict when the Director response could not be parsed.
    pub fn stop(reasoning: impl Into<String>) -> Self {
        Self {
            should_retry: false,
            reasoning: reasoning.into(),
        }
    }
}
