use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::llm::{ChatClient, ChatMessage, ChatOptions};

use super::{Generator, extract_code};

/// Reminder appended when a response arrives without an extractable block.
const WRAP_REMINDER: &str =
    "Your previous response did not contain a code block. Respond again with \
     the complete program wrapped in <code>...</code> tags and nothing else.";

/// Outcome of one generation request, including extraction retries.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub success: bool,
    /// Last raw LLM response, kept for the case file
    pub raw_response: Option<String>,
    /// Extracted code, verbatim minus surrounding whitespace
    pub code: Option<String>,
    /// Underlying chat calls spent on this attempt
    pub llm_calls: u32,
    pub error: Option<String>,
}

/// Generator implementation backed by the chat endpoint.
///
/// A pure synthesizer: it never executes, parses, or semantically validates
/// the code it extracts.
pub struct LlmGenerator {
    client: Arc<dyn ChatClient>,
    options: ChatOptions,
    max_retries: u32,
    /// Capability block from the utility registry, baked into the system prompt
    utility_prompt: String,
}

impl LlmGenerator {
    pub fn new(
        client: Arc<dyn ChatClient>,
        model: impl Into<String>,
        max_retries: u32,
        utility_prompt: impl Into<String>,
    ) -> Self {
        Self {
            client,
            options: ChatOptions::for_model(model),
            max_retries: max_retries.max(1),
            utility_prompt: utility_prompt.into(),
        }
    }

    fn system_prompt(&self, language: &str) -> String {
        let mut prompt = format!(
            r#"You are a code generator. Write a complete, self-contained {} program
that accomplishes the user's task.

Output contract:
- The program must print exactly one JSON object to stdout as its final line,
  with a boolean "success" field plus its result fields, e.g.
  {{"success": true, "result": 120}}
- On failure the program prints {{"success": false, "error": "..."}} itself
- No placeholder code, no TODOs, no reading from stdin

Response format:
- Respond with the complete program wrapped in <code>...</code> tags
- No explanation outside the tags"#,
            language
        );

        if !self.utility_prompt.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&self.utility_prompt);
        }
        prompt
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, prompt: &str, language: &str) -> GenerationOutcome {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt(language)),
            ChatMessage::user(prompt.to_string()),
        ];

        let mut llm_calls = 0;
        let mut last_response = None;

        while llm_calls < self.max_retries {
            llm_calls += 1;
            let response = match self.client.chat(&messages, &self.options).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Generator chat call failed: {}", e);
                    return GenerationOutcome {
                        success: false,
                        raw_response: last_response,
                        code: None,
                        llm_calls,
                        error: Some(format!("Chat call failed: {}", e)),
                    };
                }
            };

            if let Some(code) = extract_code(&response) {
                debug!(calls = llm_calls, chars = code.len(), "Extracted code");
                return GenerationOutcome {
                    success: true,
                    raw_response: Some(response),
                    code: Some(code),
                    llm_calls,
                    error: None,
                };
            }

            warn!(
                call = llm_calls,
                "No code block in generator response, re-prompting"
            );
            messages.push(ChatMessage::assistant(response.clone()));
            messages.push(ChatMessage::user(WRAP_REMINDER.to_string()));
            last_response = Some(response);
        }

        GenerationOutcome {
            success: false,
            raw_response: last_response,
            code: None,
            llm_calls,
            error: Some(format!(
                "No code block found after {} attempts",
                self.max_retries
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::Mutex;

    struct ScriptedChat {
        replies: Mutex<Vec<String>>,
        calls: Mutex<Vec<usize>>,
    }

    impl ScriptedChat {
        fn new(replies: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().map(String::from).collect()),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn chat(&self, messages: &[ChatMessage], _o: &ChatOptions) -> Result<String> {
            self.calls.lock().unwrap().push(messages.len());
            Ok(self.replies.lock().unwrap().remove(0))
        }
    }

    #[tokio::test]
    async fn test_first_call_success() {
        let chat = ScriptedChat::new(vec!["<code>console.log('{\"success\":true}')</code>"]);
        let generator = LlmGenerator::new(chat, "m", 3, "");

        let outcome = generator.generate("print success", "typescript").await;
        assert!(outcome.success);
        assert_eq!(outcome.llm_calls, 1);
        assert_eq!(
            outcome.code.as_deref(),
            Some("console.log('{\"success\":true}')")
        );
    }

    #[tokio::test]
    async fn test_retries_until_code_appears() {
        let chat = ScriptedChat::new(vec![
            "I think the answer is 42.",
            "Still no code, sorry.",
            "<code>print(42)</code>",
        ]);
        let generator = LlmGenerator::new(Arc::clone(&chat) as Arc<dyn ChatClient>, "m", 3, "");

        let outcome = generator.generate("answer", "python").await;
        assert!(outcome.success);
        assert_eq!(outcome.llm_calls, 3);
        assert_eq!(outcome.code.as_deref(), Some("print(42)"));
        // Each retry carries the prior exchange plus the wrap reminder
        assert_eq!(*chat.calls.lock().unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_structured_failure_after_budget_exhausted() {
        let chat = ScriptedChat::new(vec!["no", "nope", "never"]);
        let generator = LlmGenerator::new(chat, "m", 3, "");

        let outcome = generator.generate("answer", "python").await;
        assert!(!outcome.success);
        assert!(outcome.code.is_none());
        assert_eq!(outcome.llm_calls, 3);
        assert_eq!(outcome.raw_response.as_deref(), Some("never"));
        assert!(outcome.error.as_deref().unwrap().contains("No code block"));
    }
}
