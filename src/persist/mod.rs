//! Durable artifacts for completed sessions, and continuation support.
//!
//! Each agent directory is self-describing: `agent.json` alone reconstructs
//! the session. The caller guarantees at most one writer per agent directory
//! at a time; `iterations/` is append-only.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::info;

use crate::models::{Session, SessionFiles, language_extension};
use crate::slug::slugify;

/// Options for persisting a session.
#[derive(Debug, Clone, Default)]
pub struct PersistOptions {
    /// Override the store root; used when promoting an agent to the stdlib
    pub base_dir: Option<PathBuf>,
    /// Allow replacing an existing agent's index and metadata
    pub overwrite: bool,
    /// Prior session to merge with before writing (continuation)
    pub merge_with: Option<Session>,
}

/// Structured result of a persist call. Persistence failures are reported
/// here, never raised; the in-memory session is unaffected either way.
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    pub success: bool,
    pub index_file: Option<PathBuf>,
    pub metadata_file: Option<PathBuf>,
    pub error: Option<String>,
}

/// File-based store for persisted agents.
pub struct AgentStore {
    agents_dir: PathBuf,
}

impl AgentStore {
    pub fn new(agents_dir: impl Into<PathBuf>) -> Self {
        Self {
            agents_dir: agents_dir.into(),
        }
    }

    fn agent_dir(&self, base: Option<&Path>, agent_name: &str) -> PathBuf {
        base.unwrap_or(&self.agents_dir).join(slugify(agent_name))
    }

    /// Write a completed session's artifacts.
    pub async fn persist(&self, session: &Session, options: &PersistOptions) -> PersistOutcome {
        match self.persist_inner(session, options).await {
            Ok((index_file, metadata_file)) => PersistOutcome {
                success: true,
                index_file: Some(index_file),
                metadata_file: Some(metadata_file),
                error: None,
            },
            Err(e) => PersistOutcome {
                success: false,
                index_file: None,
                metadata_file: None,
                error: Some(format!("{:#}", e)),
            },
        }
    }

    async fn persist_inner(
        &self,
        session: &Session,
        options: &PersistOptions,
    ) -> Result<(PathBuf, PathBuf)> {
        let mut session = session.clone();
        if let Some(prior) = &options.merge_with {
            session = merge(prior.clone(), session);
        }

        let dir = self.agent_dir(options.base_dir.as_deref(), &session.agent_name);
        let ext = language_extension(&session.language);
        let index_file = dir.join(format!("index.{}", ext));
        let metadata_file = dir.join("agent.json");

        if metadata_file.exists() && !options.overwrite && options.merge_with.is_none() {
            anyhow::bail!(
                "Agent {:?} already exists (pass overwrite or merge to replace)",
                session.agent_name
            );
        }

        fs::create_dir_all(&dir)
            .await
            .context("Failed to create agent directory")?;

        fs::write(&index_file, session.final_code.clone().unwrap_or_default())
            .await
            .context("Failed to write agent index")?;

        // Snapshot each attempt's code; existing snapshots are never rewritten
        let iterations_dir = dir.join("iterations");
        fs::create_dir_all(&iterations_dir)
            .await
            .context("Failed to create iterations directory")?;
        let existing = snapshot_prefixes(&iterations_dir).await?;
        for attempt in &session.attempts {
            let Some(code) = &attempt.extracted_code else {
                continue;
            };
            let prefix = format!("iteration-{}-", attempt.attempt_number);
            if existing.iter().any(|name| name.starts_with(&prefix)) {
                continue;
            }
            let path = iterations_dir.join(format!(
                "{}{}.{}",
                prefix,
                attempt.timestamp.timestamp_millis(),
                ext
            ));
            fs::write(&path, code)
                .await
                .context("Failed to write iteration snapshot")?;
        }

        session.files = Some(SessionFiles {
            index_file: index_file.to_string_lossy().into_owned(),
            metadata_file: metadata_file.to_string_lossy().into_owned(),
        });
        let json =
            serde_json::to_string_pretty(&session).context("Failed to serialize session")?;
        fs::write(&metadata_file, json)
            .await
            .context("Failed to write agent metadata")?;

        info!(agent = %session.agent_name, dir = ?dir, "Persisted agent");
        Ok((index_file, metadata_file))
    }

    /// Load a previously persisted session, if the agent exists.
    pub async fn load(&self, agent_name: &str) -> Result<Option<Session>> {
        let metadata_file = self.agent_dir(None, agent_name).join("agent.json");
        let text = match fs::read_to_string(&metadata_file).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("Failed to read agent metadata"),
        };
        let session: Session = serde_json::from_str(&text)
            .with_context(|| format!("Corrupt agent metadata at {:?}", metadata_file))?;
        Ok(Some(session))
    }
}

async fn snapshot_prefixes(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Ok(names),
    };
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Merge a continuation run into the prior persisted session.
///
/// Appends the new attempts with monotonic renumbering, keeps the newest
/// final code, description, and agent name, and unions the run timeline.
pub fn merge(prior: Session, new: Session) -> Session {
    let mut merged = prior;

    for mut attempt in new.attempts {
        attempt.attempt_number = merged.next_attempt_number();
        merged.attempts.push(attempt);
    }

    merged.version_id = new.version_id;
    merged.agent_name = new.agent_name;
    merged.language = new.language;
    merged.was_executed = merged.was_executed || new.was_executed;
    merged.success = new.success;
    if new.final_code.is_some() {
        merged.final_code = new.final_code;
    }
    if new.agent_description.is_some() {
        merged.agent_description = new.agent_description;
    }
    if new.system_prompt.is_some() {
        merged.system_prompt = new.system_prompt;
    }
    if new.judging_criteria.is_some() {
        merged.judging_criteria = new.judging_criteria;
    }
    merged.sessions.extend(new.sessions);
    merged.error = new.error;
    merged.stack_trace = new.stack_trace;
    merged.files = None;
    merged
}
