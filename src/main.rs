use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use agent_foundry::llm::{ChatClient, OpenAiCompatClient, RateLimited, Traced};
use agent_foundry::sandbox::HttpSandbox;
use agent_foundry::{
    AgentStore, FoundryConfig, LlmDirector, LlmGenerator, OrchestrateOptions, PersistOptions,
    SandboxRunner, Session, SessionLoop, UtilityRegistry, slugify_truncate,
};

/// Exit code when the iteration budget ran out without a successful run.
const EXIT_NO_SUCCESS: i32 = 2;

/// Agent-Foundry CLI: iterative code synthesis with automated refinement
#[derive(Parser, Debug)]
#[command(name = "agent-foundry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the refinement loop for a task
    #[command(name = "run")]
    Run {
        #[command(flatten)]
        args: Box<RunArgs>,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Task description
    #[arg(short, long)]
    task: String,

    /// Agent name; continues the agent if it already exists
    #[arg(short, long)]
    agent_name: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target language for the generated artifact
    #[arg(long)]
    language: Option<String>,

    /// Override model (e.g., "openai/gpt-4o")
    #[arg(long)]
    model: Option<String>,

    /// Maximum refinement iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Extraction retry budget within one generator call
    #[arg(long)]
    max_retries: Option<u32>,

    /// Extra system prompt forwarded to the Director
    #[arg(long)]
    system_prompt: Option<String>,

    /// Judging criteria forwarded to the Director
    #[arg(long)]
    judging_criteria: Option<String>,

    /// Replace an existing agent instead of continuing it
    #[arg(long)]
    overwrite: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run { args } => match run(*args).await {
            Ok(code) => code,
            Err(e) => {
                error!("{:#}", e);
                1
            }
        },
    };
    std::process::exit(code);
}

async fn run(args: RunArgs) -> Result<i32> {
    let mut config = FoundryConfig::load_with_env(args.config.as_ref())?;
    if let Some(model) = args.model {
        config.inference.model = model;
    }
    if let Some(max) = args.max_iterations {
        config.loop_config.max_iterations = max;
    }
    if let Some(max) = args.max_retries {
        config.loop_config.max_retries = max;
    }
    if let Some(language) = args.language {
        config.loop_config.language = language;
    }

    let agent_name = args
        .agent_name
        .unwrap_or_else(|| slugify_truncate(&args.task));
    info!("Target agent: {}", agent_name);

    let registry = Arc::new(UtilityRegistry::new(
        config.storage.utils_dir.clone(),
        config.storage.agents_dir.clone(),
    ));
    let utility_prompt = registry.utility_prompt().await?;

    let chat: Arc<dyn ChatClient> = Arc::new(RateLimited::new(Traced::new(
        OpenAiCompatClient::new(&config.inference)?,
    )));
    let director = LlmDirector::new(Arc::clone(&chat), config.inference.model.clone());
    let generator = LlmGenerator::new(
        chat,
        config.inference.model.clone(),
        config.loop_config.max_retries,
        utility_prompt,
    );
    let executor = SandboxRunner::new(Arc::new(HttpSandbox::new(&config.sandbox)?));

    let store = AgentStore::new(config.storage.agents_dir.clone());
    let prior = if args.overwrite {
        None
    } else {
        store
            .load(&agent_name)
            .await
            .context("Failed to load existing agent")?
    };
    if prior.is_some() {
        info!("Continuing existing agent '{}'", agent_name);
    }

    let mut options = OrchestrateOptions::new(agent_name, config.inference.model.clone());
    options.max_iterations = config.loop_config.max_iterations;
    options.max_retries = config.loop_config.max_retries;
    options.language = config.loop_config.language.clone();
    options.system_prompt = args.system_prompt;
    options.judging_criteria = args.judging_criteria;
    options.prior_code = prior.as_ref().and_then(|s| s.final_code.clone());

    let session_loop = SessionLoop::new(director, generator, executor, registry, options);

    let session = match session_loop.orchestrate(&args.task).await {
        Ok(session) => session,
        Err(e) => {
            // Persist the stamped case file so the failure is inspectable
            persist_session(&store, &e.session, prior, args.overwrite).await;
            return Err(anyhow::anyhow!("{}", e));
        }
    };

    report(&session);
    persist_session(&store, &session, prior, args.overwrite).await;

    Ok(if session.success { 0 } else { EXIT_NO_SUCCESS })
}

async fn persist_session(
    store: &AgentStore,
    session: &Session,
    prior: Option<Session>,
    overwrite: bool,
) {
    let outcome = store
        .persist(
            session,
            &PersistOptions {
                base_dir: None,
                overwrite,
                merge_with: prior,
            },
        )
        .await;
    match (outcome.success, outcome.metadata_file) {
        (true, Some(path)) => info!("Agent persisted to {:?}", path),
        _ => warn!(
            "Failed to persist agent: {}",
            outcome.error.unwrap_or_default()
        ),
    }
}

fn report(session: &Session) {
    info!(
        "Session {} finished: attempts={}, success={}",
        session.version_id,
        session.attempts.len(),
        session.success
    );
    if let Some(description) = &session.agent_description {
        info!("Description: {}", description);
    }
    if let Some(last) = session.last_attempt()
        && let Some(execution) = &last.execution
    {
        info!("Last execution output:\n{}", execution.output);
    }
}
