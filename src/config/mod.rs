mod settings;

pub use settings::{
    FoundryConfig, InferenceConfig, LoopConfig, SandboxConfig, StorageConfig,
};
