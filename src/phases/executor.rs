use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{ErrorType, Execution};
use crate::sandbox::SandboxClient;

use super::CodeExecutor;

/// Stdout markers reported by the sandbox infrastructure itself.
const SANDBOX_SENTINELS: &[&str] = &["DaytonaError", "Sandbox Error", "API Error"];

/// Stdout markers from the language toolchain.
const COMPILATION_MARKERS: &[&str] = &["error TS", "SyntaxError:", "Cannot find name"];

/// Executor implementation over the remote sandbox.
///
/// A pure observer: it runs what it is given and classifies what came back.
pub struct SandboxRunner {
    sandbox: Arc<dyn SandboxClient>,
}

impl SandboxRunner {
    pub fn new(sandbox: Arc<dyn SandboxClient>) -> Self {
        Self { sandbox }
    }
}

/// First stdout line that parses as a JSON object.
fn first_json_object_line(output: &str) -> Option<Value> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .find_map(|line| {
            serde_json::from_str::<Value>(line)
                .ok()
                .filter(|v| v.is_object())
        })
}

/// Classify a sandbox run's stdout. Precedence: sandbox sentinel, then
/// compilation marker, then the runtime JSON convention; anything else is a
/// success, including plain-text and empty output.
fn classify(output: String) -> Execution {
    for sentinel in SANDBOX_SENTINELS {
        if output.contains(sentinel) {
            return Execution::failed(
                output.clone(),
                first_json_object_line(&output),
                ErrorType::Sandbox,
                format!("Sandbox reported an error ({})", sentinel),
            );
        }
    }

    for marker in COMPILATION_MARKERS {
        if output.contains(marker) {
            return Execution::failed(
                output.clone(),
                first_json_object_line(&output),
                ErrorType::Compilation,
                format!("Compilation error ({})", marker),
            );
        }
    }

    let parsed = first_json_object_line(&output);
    if let Some(value) = &parsed
        && value.get("success") == Some(&Value::Bool(false))
    {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Program reported failure")
            .to_string();
        return Execution::failed(output, parsed.clone(), ErrorType::Runtime, message);
    }

    Execution::succeeded(output, parsed)
}

#[async_trait]
impl CodeExecutor for SandboxRunner {
    async fn execute(&self, code: &str, language: &str) -> Execution {
        match self.sandbox.run_code(code, language).await {
            Ok(output) => {
                let execution = classify(output.result);
                info!(
                    success = execution.success,
                    error_type = ?execution.error_type,
                    "Sandbox run classified"
                );
                execution
            }
            Err(e) => {
                warn!("Sandbox transport failed: {}", e);
                Execution::failed(String::new(), None, ErrorType::Sandbox, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxOutput;
    use anyhow::Result;

    struct FixedSandbox(Result<SandboxOutput>);

    #[async_trait]
    impl SandboxClient for FixedSandbox {
        async fn run_code(&self, _source: &str, _language: &str) -> Result<SandboxOutput> {
            match &self.0 {
                Ok(out) => Ok(out.clone()),
                Err(e) => Err(anyhow::anyhow!("{}", e)),
            }
        }
    }

    async fn run(output: &str) -> Execution {
        let runner = SandboxRunner::new(Arc::new(FixedSandbox(Ok(SandboxOutput {
            result: output.to_string(),
            exit: Some(0),
        }))));
        runner.execute("code", "typescript").await
    }

    #[tokio::test]
    async fn test_sandbox_sentinel_wins_over_everything() {
        let exec = run("DaytonaError: workspace quota exceeded\nerror TS2304").await;
        assert!(!exec.success);
        assert_eq!(exec.error_type, ErrorType::Sandbox);
    }

    #[tokio::test]
    async fn test_compilation_marker() {
        let exec = run("src/index.ts(3,5): error TS2304: Cannot find name 'foo'.").await;
        assert!(!exec.success);
        assert_eq!(exec.error_type, ErrorType::Compilation);
    }

    #[tokio::test]
    async fn test_runtime_failure_via_json_convention() {
        let exec = run("{\"success\": false, \"error\": \"division by zero\"}").await;
        assert!(!exec.success);
        assert_eq!(exec.error_type, ErrorType::Runtime);
        assert_eq!(exec.error.as_deref(), Some("division by zero"));
    }

    #[tokio::test]
    async fn test_json_success_retains_parsed_output() {
        let exec = run("starting up\n{\"success\": true, \"result\": 120}").await;
        assert!(exec.success);
        assert_eq!(exec.error_type, ErrorType::None);
        let parsed = exec.parsed_output.unwrap();
        assert_eq!(parsed["result"], 120);
    }

    #[tokio::test]
    async fn test_plain_text_and_empty_output_are_success() {
        assert!(run("hello world").await.success);
        assert!(run("").await.success);
    }

    #[tokio::test]
    async fn test_transport_error_is_captured_not_propagated() {
        let runner = SandboxRunner::new(Arc::new(FixedSandbox(Err(anyhow::anyhow!(
            "connection refused"
        )))));
        let exec = runner.execute("code", "typescript").await;
        assert!(!exec.success);
        assert_eq!(exec.error_type, ErrorType::Sandbox);
        assert!(exec.error.as_deref().unwrap().contains("connection refused"));
    }
}
