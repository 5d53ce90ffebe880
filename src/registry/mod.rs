//! Registry of reusable utilities available to generated code.
//!
//! Two kinds of utility exist: hand-authored *builtins* under the stdlib
//! directory, and *agents* produced by previous successful sessions. The
//! registry discovers both, teaches the generator about them via a prompt
//! block, and resolves them for source injection.

mod injector;
mod loader;

pub use injector::{RegistryError, inject, install_preamble, utility_banner};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Snapshot of the utility map, shared read-only across sessions.
pub type UtilityMap = Arc<HashMap<String, Arc<UtilityDescriptor>>>;

/// Where a utility came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtilityKind {
    /// Hand-authored under the stdlib directory
    Builtin,
    /// Derived from a previously persisted, successfully executed session
    Agent,
}

/// A reusable capability generated code can call.
#[derive(Debug, Clone)]
pub struct UtilityDescriptor {
    /// Unique across the registry
    pub name: String,
    pub kind: UtilityKind,
    pub description: String,
    /// Original user task, for agent utilities
    pub original_task: Option<String>,
    /// Injectable source, prepended verbatim to generated code
    pub source: String,
    /// External packages the source needs inside the sandbox
    pub dependencies: Vec<String>,
    /// API documentation shown to the generator
    pub docs: String,
    /// Entry-point identifier substrings used for detection
    pub identifiers: Vec<String>,
    /// Injected whenever any other utility is (tracing-style helpers)
    pub auto_include: bool,
    pub location: PathBuf,
}

/// Lazy, refreshable utility cache.
///
/// Refresh builds a complete new map and publishes it with a single swap, so
/// concurrent readers always observe a coherent snapshot.
pub struct UtilityRegistry {
    utils_dir: PathBuf,
    agents_dir: PathBuf,
    snapshot: RwLock<Option<UtilityMap>>,
}

impl UtilityRegistry {
    pub fn new(utils_dir: impl Into<PathBuf>, agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            utils_dir: utils_dir.into(),
            agents_dir: agents_dir.into(),
            snapshot: RwLock::new(None),
        }
    }

    /// Current snapshot, scanning the directories on first use.
    pub async fn snapshot(&self) -> Result<UtilityMap> {
        let current = self
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(map) = current {
            return Ok(map);
        }
        self.refresh().await
    }

    /// Rescan both directories and publish a fresh snapshot.
    ///
    /// Name collisions between an agent and an existing builtin are resolved
    /// in favor of the builtin.
    pub async fn refresh(&self) -> Result<UtilityMap> {
        let mut map: HashMap<String, Arc<UtilityDescriptor>> = HashMap::new();

        for utility in loader::load_builtins(&self.utils_dir).await? {
            map.insert(utility.name.clone(), Arc::new(utility));
        }
        for utility in loader::load_agents(&self.agents_dir).await? {
            if map.contains_key(&utility.name) {
                info!(
                    name = %utility.name,
                    "Agent utility shadowed by builtin with the same name"
                );
                continue;
            }
            map.insert(utility.name.clone(), Arc::new(utility));
        }

        info!(count = map.len(), "Utility registry refreshed");

        let published: UtilityMap = Arc::new(map);
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&published));
        Ok(published)
    }

    pub async fn get(&self, name: &str) -> Result<Option<Arc<UtilityDescriptor>>> {
        Ok(self.snapshot().await?.get(name).cloned())
    }

    /// Capability block concatenated into the generator's system prompt.
    pub async fn utility_prompt(&self) -> Result<String> {
        let snapshot = self.snapshot().await?;
        if snapshot.is_empty() {
            return Ok(String::new());
        }

        let mut utilities: Vec<_> = snapshot.values().collect();
        utilities.sort_by(|a, b| a.name.cmp(&b.name));

        let mut block = String::from(
            "## Available utilities\n\
             The following capabilities already exist. Call them directly; their\n\
             source is injected above your code before execution.\n",
        );
        for utility in utilities {
            let kind = match utility.kind {
                UtilityKind::Builtin => "builtin",
                UtilityKind::Agent => "agent",
            };
            block.push_str(&format!(
                "\n### {} ({})\n{}\n",
                utility.name, kind, utility.description
            ));
            if !utility.docs.is_empty() {
                block.push_str(&format!("API:\n{}\n", utility.docs.trim_end()));
            }
        }
        Ok(block)
    }

    /// Utilities whose declared entry-point identifiers appear in the code.
    ///
    /// Substring matching can false-positive inside comments or strings; any
    /// genuinely called identifier is always detected. When anything is
    /// detected, every auto-include utility joins the set. The result is
    /// sorted by name.
    pub async fn detect(&self, code: &str) -> Result<Vec<Arc<UtilityDescriptor>>> {
        let snapshot = self.snapshot().await?;
        let mut detected: Vec<Arc<UtilityDescriptor>> = snapshot
            .values()
            .filter(|u| {
                u.identifiers
                    .iter()
                    .any(|id| !id.is_empty() && code.contains(id.as_str()))
            })
            .cloned()
            .collect();

        if !detected.is_empty() {
            for utility in snapshot.values() {
                if utility.auto_include && !detected.iter().any(|u| u.name == utility.name) {
                    detected.push(Arc::clone(utility));
                }
            }
        }

        detected.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Session;
    use std::fs;
    use tempfile::TempDir;

    fn write_builtin(
        root: &std::path::Path,
        name: &str,
        identifiers: &[&str],
        auto_include: bool,
    ) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let ids = identifiers
            .iter()
            .map(|i| format!("\"{}\"", i))
            .collect::<Vec<_>>()
            .join(", ");
        fs::write(
            dir.join("utility.yaml"),
            format!(
                "name: {name}\ndescription: test utility {name}\ndocs: \"{name}(x)\"\nidentifiers: [{ids}]\ndependencies: [\"left-pad\"]\nsource: source.ts\nauto_include: {auto_include}\n"
            ),
        )
        .unwrap();
        fs::write(
            dir.join("source.ts"),
            format!("function {}() {{ return 1; }}", identifiers.first().unwrap_or(&name)),
        )
        .unwrap();
    }

    fn write_agent(root: &std::path::Path, name: &str, success: bool) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let mut session = Session::new(name, format!("task for {}", name), "typescript");
        session.success = success;
        session.was_executed = success;
        session.final_code = Some(format!("function {}() {{}}", name));
        session.agent_description = Some(format!("{} does things", name));
        fs::write(
            dir.join("agent.json"),
            serde_json::to_string_pretty(&session).unwrap(),
        )
        .unwrap();
        fs::write(dir.join("index.ts"), format!("function {}() {{}}", name)).unwrap();
    }

    #[tokio::test]
    async fn test_discovers_builtins_and_agents() {
        let utils = TempDir::new().unwrap();
        let agents = TempDir::new().unwrap();
        write_builtin(utils.path(), "wandb-chat", &["wandbChat"], false);
        write_agent(agents.path(), "fact", true);

        let registry = UtilityRegistry::new(utils.path(), agents.path());
        let snapshot = registry.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["wandb-chat"].kind, UtilityKind::Builtin);
        assert_eq!(snapshot["fact"].kind, UtilityKind::Agent);
        assert_eq!(
            snapshot["fact"].original_task.as_deref(),
            Some("task for fact")
        );
    }

    #[tokio::test]
    async fn test_failed_agents_are_not_utilities() {
        let utils = TempDir::new().unwrap();
        let agents = TempDir::new().unwrap();
        write_agent(agents.path(), "broken", false);

        let registry = UtilityRegistry::new(utils.path(), agents.path());
        assert!(registry.snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_agent_names_are_slugified_for_detection() {
        let utils = TempDir::new().unwrap();
        let agents = TempDir::new().unwrap();
        write_agent(agents.path(), "Fact Helper", true);

        let registry = UtilityRegistry::new(utils.path(), agents.path());
        let snapshot = registry.snapshot().await.unwrap();
        assert!(snapshot.contains_key("fact-helper"));
        assert_eq!(
            snapshot["fact-helper"].identifiers,
            vec!["fact-helper".to_string()]
        );

        let detected = registry
            .detect("const out = await runAgent(\"fact-helper\");")
            .await
            .unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(detected[0].name, "fact-helper");
    }

    #[tokio::test]
    async fn test_builtin_wins_name_collision() {
        let utils = TempDir::new().unwrap();
        let agents = TempDir::new().unwrap();
        write_builtin(utils.path(), "fact", &["factHelper"], false);
        write_agent(agents.path(), "fact", true);

        let registry = UtilityRegistry::new(utils.path(), agents.path());
        let snapshot = registry.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["fact"].kind, UtilityKind::Builtin);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_agents() {
        let utils = TempDir::new().unwrap();
        let agents = TempDir::new().unwrap();

        let registry = UtilityRegistry::new(utils.path(), agents.path());
        assert!(registry.snapshot().await.unwrap().is_empty());

        write_agent(agents.path(), "late", true);
        assert!(registry.snapshot().await.unwrap().is_empty());
        assert_eq!(registry.refresh().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_detection_and_auto_include() {
        let utils = TempDir::new().unwrap();
        let agents = TempDir::new().unwrap();
        write_builtin(utils.path(), "wandb-chat", &["wandbChat"], false);
        write_builtin(utils.path(), "weave", &["weaveTrace"], true);
        write_builtin(utils.path(), "stagehand", &["createStagehand"], false);

        let registry = UtilityRegistry::new(utils.path(), agents.path());

        let detected = registry
            .detect("const reply = await wandbChat([{role: 'user'}]);")
            .await
            .unwrap();
        let names: Vec<_> = detected.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["wandb-chat", "weave"]);

        // Nothing referenced: nothing injected, not even auto-includes
        assert!(registry.detect("console.log(1)").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_utility_prompt_lists_capabilities() {
        let utils = TempDir::new().unwrap();
        let agents = TempDir::new().unwrap();
        write_builtin(utils.path(), "wandb-chat", &["wandbChat"], false);
        write_agent(agents.path(), "fact", true);

        let registry = UtilityRegistry::new(utils.path(), agents.path());
        let prompt = registry.utility_prompt().await.unwrap();
        assert!(prompt.contains("### fact (agent)"));
        assert!(prompt.contains("### wandb-chat (builtin)"));
        assert!(prompt.contains("wandb-chat(x)"));
    }
}
