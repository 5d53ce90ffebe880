pub mod config;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod persist;
pub mod phases;
pub mod registry;
pub mod sandbox;
pub mod slug;

// Re-export main types
pub use config::FoundryConfig;
pub use models::{Attempt, Execution, PromptRefinement, Session, Verdict};
pub use orchestrator::{LoopEvent, OrchestrateError, OrchestrateOptions, SessionLoop};
pub use persist::{AgentStore, PersistOptions, PersistOutcome, merge};
pub use phases::{LlmDirector, LlmGenerator, SandboxRunner};
pub use registry::{UtilityDescriptor, UtilityKind, UtilityRegistry};

// Re-export slug utilities
pub use slug::{slugify, slugify_truncate};
