use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the factory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FoundryConfig {
    pub inference: InferenceConfig,
    pub sandbox: SandboxConfig,
    pub loop_config: LoopConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// API key for the chat endpoint (usually supplied via environment)
    pub api_key: String,
    /// Optional project identifier forwarded with each request
    pub project: Option<String>,
    /// Base URL of the OpenAI-compatible chat endpoint
    pub base_url: String,
    /// Default model identifier
    pub model: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// API key for the sandbox service
    pub api_key: String,
    /// Base URL of the code-execution endpoint
    pub base_url: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Maximum full refinement rounds before giving up
    pub max_iterations: u32,
    /// Inner retry budget for code extraction within one generator call
    pub max_retries: u32,
    /// Target language for generated artifacts
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for persisted agents
    pub agents_dir: PathBuf,
    /// Root directory for hand-authored builtin utilities
    pub utils_dir: PathBuf,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            project: None,
            base_url: "https://api.inference.wandb.ai/v1".to_string(),
            model: "openai/gpt-4o".to_string(),
            timeout_secs: 120,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://app.daytona.io/api".to_string(),
            timeout_secs: 300,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_retries: 3,
            language: "typescript".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            agents_dir: PathBuf::from("agents"),
            utils_dir: PathBuf::from("utils"),
        }
    }
}

impl Default for FoundryConfig {
    fn default() -> Self {
        Self {
            inference: InferenceConfig::default(),
            sandbox: SandboxConfig::default(),
            loop_config: LoopConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl FoundryConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FoundryConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, falling back to the platform config location and
    /// then to defaults if no file exists
    pub fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            Some(p) => Err(anyhow::anyhow!("Config file not found: {:?}", p)),
            None => {
                let fallback = dirs::config_dir().map(|d| d.join("agent-foundry/config.yaml"));
                match fallback {
                    Some(p) if p.exists() => Self::from_file(&p),
                    _ => Ok(Self::default()),
                }
            }
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Environment variables (FOUNDRY_*) override config file values but are
    /// themselves overridden by CLI arguments.
    ///
    /// Supported environment variables:
    /// - FOUNDRY_INFERENCE_API_KEY: API key for the chat endpoint
    /// - FOUNDRY_INFERENCE_PROJECT: Project identifier for the chat endpoint
    /// - FOUNDRY_SANDBOX_API_KEY: API key for the sandbox service
    /// - FOUNDRY_SANDBOX_URL: Base URL of the sandbox service
    /// - FOUNDRY_MODEL: Model identifier override
    /// - FOUNDRY_MAX_ITERATIONS: Maximum refinement rounds
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("FOUNDRY_INFERENCE_API_KEY")
            && !val.is_empty()
        {
            self.inference.api_key = val;
        }

        if let Ok(val) = std::env::var("FOUNDRY_INFERENCE_PROJECT")
            && !val.is_empty()
        {
            self.inference.project = Some(val);
        }

        if let Ok(val) = std::env::var("FOUNDRY_SANDBOX_API_KEY")
            && !val.is_empty()
        {
            self.sandbox.api_key = val;
        }

        if let Ok(val) = std::env::var("FOUNDRY_SANDBOX_URL")
            && !val.is_empty()
        {
            self.sandbox.base_url = val;
        }

        if let Ok(val) = std::env::var("FOUNDRY_MODEL")
            && !val.is_empty()
        {
            self.inference.model = val;
        }

        if let Ok(val) = std::env::var("FOUNDRY_MAX_ITERATIONS")
            && let Ok(max) = val.parse::<u32>()
            && max > 0
        {
            self.loop_config.max_iterations = max;
        }

        self
    }

    /// Load configuration with environment variable overrides applied.
    ///
    /// Priority: config file < env vars < CLI args
    /// (CLI args override everything, applied separately in main.rs)
    pub fn load_with_env(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        Self::load_or_default(path).map(|c| c.apply_env_overrides())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FoundryConfig::default();
        assert_eq!(config.loop_config.max_iterations, 3);
        assert_eq!(config.loop_config.max_retries, 3);
        assert_eq!(config.loop_config.language, "typescript");
        assert_eq!(config.storage.agents_dir, PathBuf::from("agents"));
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = r#"
inference:
  model: "openai/gpt-4.1"
sandbox:
  base_url: "http://localhost:9000"
"#;
        let config: FoundryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.inference.model, "openai/gpt-4.1");
        assert_eq!(config.sandbox.base_url, "http://localhost:9000");
        assert_eq!(config.loop_config.max_iterations, 3);
    }
}
