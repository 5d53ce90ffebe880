//! Directory scanning for builtin and agent utilities.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::models::{Session, language_extension};
use crate::slug::slugify;

use super::{UtilityDescriptor, UtilityKind};

/// Manifest file every builtin utility directory must contain.
const BUILTIN_MANIFEST: &str = "utility.yaml";

/// Metadata file marking a persisted agent directory.
const AGENT_METADATA: &str = "agent.json";

#[derive(Debug, Deserialize)]
struct BuiltinManifest {
    name: String,
    description: String,
    #[serde(default)]
    docs: String,
    identifiers: Vec<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    /// Source file name relative to the utility directory
    source: String,
    #[serde(default)]
    auto_include: bool,
}

/// Scan the stdlib directory for hand-authored builtin utilities.
///
/// A missing directory is an empty registry, not an error. Malformed entries
/// are skipped with a warning so one bad manifest cannot hide the rest.
pub(super) async fn load_builtins(dir: &Path) -> Result<Vec<UtilityDescriptor>> {
    let mut utilities = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => {
            debug!("No builtin utility directory at {:?}", dir);
            return Ok(utilities);
        }
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match load_builtin(&path).await {
            Ok(Some(utility)) => utilities.push(utility),
            Ok(None) => {}
            Err(e) => warn!("Skipping builtin utility at {:?}: {}", path, e),
        }
    }
    Ok(utilities)
}

async fn load_builtin(dir: &Path) -> Result<Option<UtilityDescriptor>> {
    let manifest_path = dir.join(BUILTIN_MANIFEST);
    if !manifest_path.exists() {
        return Ok(None);
    }

    let manifest_text = fs::read_to_string(&manifest_path)
        .await
        .context("Failed to read utility manifest")?;
    let manifest: BuiltinManifest =
        serde_yaml::from_str(&manifest_text).context("Failed to parse utility manifest")?;

    let source_path = dir.join(&manifest.source);
    let source = fs::read_to_string(&source_path)
        .await
        .with_context(|| format!("Failed to read utility source {:?}", source_path))?;

    Ok(Some(UtilityDescriptor {
        name: manifest.name,
        kind: UtilityKind::Builtin,
        description: manifest.description,
        original_task: None,
        source,
        dependencies: manifest.dependencies,
        docs: manifest.docs,
        identifiers: manifest.identifiers,
        auto_include: manifest.auto_include,
        location: dir.to_path_buf(),
    }))
}

/// Scan the agents directory for previously persisted, successful sessions.
pub(super) async fn load_agents(dir: &Path) -> Result<Vec<UtilityDescriptor>> {
    let mut utilities = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => {
            debug!("No agents directory at {:?}", dir);
            return Ok(utilities);
        }
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        match load_agent(&path).await {
            Ok(Some(utility)) => utilities.push(utility),
            Ok(None) => {}
            Err(e) => warn!("Skipping agent at {:?}: {}", path, e),
        }
    }
    Ok(utilities)
}

async fn load_agent(dir: &Path) -> Result<Option<UtilityDescriptor>> {
    let metadata_path = dir.join(AGENT_METADATA);
    if !metadata_path.exists() {
        return Ok(None);
    }

    let metadata_text = fs::read_to_string(&metadata_path)
        .await
        .context("Failed to read agent metadata")?;
    let session: Session =
        serde_json::from_str(&metadata_text).context("Failed to parse agent metadata")?;

    // Only sessions that actually ran to success become capabilities
    if !session.success || !session.was_executed {
        return Ok(None);
    }

    let index_path = dir.join(format!("index.{}", language_extension(&session.language)));
    let source = match fs::read_to_string(&index_path).await {
        Ok(source) => source,
        Err(_) => session
            .final_code
            .clone()
            .context("Agent has neither an index file nor final code")?,
    };

    // The slug is both the registry key (what builtin collisions are judged
    // against) and the detection identifier generated code must mention
    let name = slugify(&session.agent_name);
    if name.is_empty() {
        anyhow::bail!("Agent name {:?} slugifies to nothing", session.agent_name);
    }
    let description = session
        .agent_description
        .clone()
        .unwrap_or_else(|| session.original_task.chars().take(60).collect());

    Ok(Some(UtilityDescriptor {
        identifiers: vec![name.clone()],
        docs: format!(
            "Generated agent. Original task: {}",
            session.original_task
        ),
        description,
        original_task: Some(session.original_task),
        source,
        dependencies: Vec::new(),
        name,
        kind: UtilityKind::Agent,
        auto_include: false,
        location: dir.to_path_buf(),
    }))
}
