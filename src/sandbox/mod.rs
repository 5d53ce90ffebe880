//! Remote code-execution transport.
//!
//! The sandbox is a black-box `run_code(source, language)` service that
//! installs declared dependencies, executes the code, and returns combined
//! stdout/stderr. No streaming and no cross-call filesystem persistence are
//! assumed.

mod http;

pub use http::HttpSandbox;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Raw output of one sandbox run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxOutput {
    /// Combined stdout/stderr
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit: Option<i32>,
}

/// Black-box remote execution endpoint.
#[async_trait]
pub trait SandboxClient: Send + Sync {
    async fn run_code(&self, source: &str, language: &str) -> Result<SandboxOutput>;
}
