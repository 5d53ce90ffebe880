use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::{info, warn};

use crate::models::{Attempt, ErrorType, Execution, Session, Verdict};
use crate::phases::{
    CodeExecutor, Director, Generator, PreviousAttemptFacts, RefinementContext, VerdictContext,
};
use crate::registry::{UtilityRegistry, inject};

use super::state::{LoopEvent, LoopStage, OrchestrateError, OrchestrateOptions};

/// Drives the bounded Director → Generator → Injector → Executor refinement
/// loop for one session.
///
/// The session object is exclusively owned here for the duration of a run;
/// concurrent sessions share nothing but the read-only registry snapshot.
pub struct SessionLoop<D, G, E>
where
    D: Director,
    G: Generator,
    E: CodeExecutor,
{
    director: D,
    generator: G,
    executor: E,
    registry: Arc<UtilityRegistry>,
    options: OrchestrateOptions,
}

impl<D, G, E> SessionLoop<D, G, E>
where
    D: Director,
    G: Generator,
    E: CodeExecutor,
{
    pub fn new(
        director: D,
        generator: G,
        executor: E,
        registry: Arc<UtilityRegistry>,
        options: OrchestrateOptions,
    ) -> Self {
        Self {
            director,
            generator,
            executor,
            registry,
            options,
        }
    }

    /// Run the complete refinement loop for `task`.
    ///
    /// Recoverable step failures (extraction, compilation, runtime, sandbox,
    /// director parse) land in the session as evidence. Anything fatal is
    /// stamped on the session and returned as [`OrchestrateError`].
    pub async fn orchestrate(&self, task: &str) -> Result<Session, OrchestrateError> {
        let mut session = Session::new(
            self.options.agent_name.clone(),
            task,
            self.options.language.clone(),
        );
        session.system_prompt = self.options.system_prompt.clone();
        session.judging_criteria = self.options.judging_criteria.clone();

        info!(
            agent = %session.agent_name,
            max_iterations = self.options.max_iterations,
            "Starting refinement session"
        );

        match self.run_loop(task, &mut session).await {
            Ok(()) => {
                let attempt_count = session.attempts.len() as u32;
                session.record_run(task, attempt_count);
                info!(
                    agent = %session.agent_name,
                    attempts = attempt_count,
                    success = session.success,
                    "Session complete"
                );
                Ok(session)
            }
            Err(e) => {
                session.stamp_error(e.to_string(), format!("{:?}", e));
                Err(OrchestrateError {
                    session: Box::new(session),
                    source: e.into(),
                })
            }
        }
    }

    async fn run_loop(&self, task: &str, session: &mut Session) -> Result<()> {
        let total_start = Instant::now();

        for iteration in 1..=self.options.max_iterations {
            self.bail_if_cancelled(session)?;
            info!(
                "=== Iteration {} of {} ===",
                iteration, self.options.max_iterations
            );

            // Phase 1: refine the prompt from prior evidence
            let refinement = {
                let start = Instant::now();
                let ctx = self.refinement_context(task, session);
                let refinement = self.director.improve_prompt(&ctx).await;
                session.timings.director += start.elapsed();
                refinement
            };
            if !refinement.success {
                warn!("Prompt refinement degraded; using original prompt verbatim");
            }
            // Feedback produced from the previous attempt's evidence is
            // recorded on that attempt
            if let Some(feedback) = &refinement.critical_feedback
                && let Some(previous) = session.last_attempt_mut()
            {
                previous.recommendation = Some(feedback.clone());
            }
            self.emit(iteration, LoopStage::Director, &refinement.improved_prompt);

            // Phase 2: generate code
            self.bail_if_cancelled(session)?;
            let mut attempt = Attempt::new(
                session.next_attempt_number(),
                refinement.improved_prompt.clone(),
            );
            let generation = {
                let start = Instant::now();
                let generation = self
                    .generator
                    .generate(&refinement.improved_prompt, &self.options.language)
                    .await;
                session.timings.generator += start.elapsed();
                generation
            };
            attempt.extraction_success = generation.success;
            attempt.raw_response = generation.raw_response;
            attempt.extracted_code = generation.code.clone();
            attempt.llm_calls = generation.llm_calls;
            self.emit(
                iteration,
                LoopStage::Generator,
                if generation.success {
                    "code extracted"
                } else {
                    "no code extracted"
                },
            );

            let Some(code) = generation.code else {
                attempt.error = generation.error;
                session.attempts.push(attempt);
                if iteration < self.options.max_iterations {
                    warn!("Generation failed, retrying in next iteration");
                    continue;
                }
                warn!("Generation failed on the last iteration");
                break;
            };

            // Phase 3: compose referenced utilities into the artifact
            let detected = self.registry.detect(&code).await?;
            let names: Vec<String> = detected.iter().map(|u| u.name.clone()).collect();
            let snapshot = self.registry.snapshot().await?;
            let injected = inject(&code, &names, &snapshot, &self.options.language)?;
            session.final_code = Some(injected.clone());
            self.emit(
                iteration,
                LoopStage::Injector,
                &format!("utilities: [{}]", names.join(", ")),
            );

            // Phase 4: execute and classify
            self.bail_if_cancelled(session)?;
            let execution = {
                let start = Instant::now();
                let execution = self
                    .run_executor(&injected)
                    .await;
                session.timings.executor += start.elapsed();
                execution
            };
            session.was_executed = true;
            self.emit(
                iteration,
                LoopStage::Executor,
                &format!(
                    "success={} errorType={:?}",
                    execution.success, execution.error_type
                ),
            );
            attempt.execution = Some(execution);
            session.attempts.push(attempt);

            // Phase 5: retry-or-stop verdict over the full history
            self.bail_if_cancelled(session)?;
            let verdict = {
                let start = Instant::now();
                let verdict = self
                    .run_verdict(task, session, iteration)
                    .await;
                session.timings.director += start.elapsed();
                verdict
            };
            self.emit(iteration, LoopStage::Verdict, &verdict.reasoning);

            if !verdict.should_retry {
                info!("Director verdict: stop after iteration {}", iteration);
                break;
            }
            if iteration == self.options.max_iterations {
                info!("Iteration budget exhausted");
                break;
            }
        }

        session.success = session
            .last_attempt()
            .is_some_and(Attempt::execution_succeeded);

        // The description always runs, even for all-failed sessions
        let description = {
            let start = Instant::now();
            let description = self
                .director
                .describe(
                    &self.options.agent_name,
                    task,
                    session.final_code.as_deref(),
                )
                .await;
            session.timings.director += start.elapsed();
            description
        };
        session.agent_description = Some(description);

        session.timings.total += total_start.elapsed();
        self.emit(
            session.attempts.len() as u32,
            LoopStage::Done,
            if session.success { "success" } else { "failed" },
        );
        Ok(())
    }

    fn refinement_context(&self, task: &str, session: &Session) -> RefinementContext {
        let previous = session.last_attempt().map(|attempt| PreviousAttemptFacts {
            prompt: attempt.prompt.clone(),
            code: attempt.extracted_code.clone(),
            output: attempt.execution.as_ref().map(|e| e.output.clone()),
            error: attempt
                .execution
                .as_ref()
                .and_then(|e| e.error.clone())
                .or_else(|| attempt.error.clone()),
        });

        RefinementContext {
            task: task.to_string(),
            language: self.options.language.clone(),
            agent_name: self.options.agent_name.clone(),
            system_prompt: self.options.system_prompt.clone(),
            judging_criteria: self.options.judging_criteria.clone(),
            prior_code: self.options.prior_code.clone(),
            previous,
        }
    }

    /// Execute, racing the cancellation token; a cancelled call is a sandbox
    /// failure of that step, not a loop abort.
    async fn run_executor(&self, code: &str) -> Execution {
        match &self.options.cancel {
            Some(token) => {
                tokio::select! {
                    execution = self.executor.execute(code, &self.options.language) => execution,
                    _ = token.cancelled() => Execution::failed(
                        String::new(),
                        None,
                        ErrorType::Sandbox,
                        "execution cancelled",
                    ),
                }
            }
            None => self.executor.execute(code, &self.options.language).await,
        }
    }

    async fn run_verdict(&self, task: &str, session: &Session, iteration: u32) -> Verdict {
        let ctx = VerdictContext {
            current_iteration: iteration,
            max_iterations: self.options.max_iterations,
        };
        match &self.options.cancel {
            Some(token) => {
                tokio::select! {
                    verdict = self.director.verdict(task, &session.attempts, ctx) => verdict,
                    _ = token.cancelled() => Verdict::stop("verdict cancelled"),
                }
            }
            None => self.director.verdict(task, &session.attempts, ctx).await,
        }
    }

    fn bail_if_cancelled(&self, session: &Session) -> Result<()> {
        if self
            .options
            .cancel
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            warn!(agent = %session.agent_name, "Session cancelled");
            anyhow::bail!("session cancelled");
        }
        Ok(())
    }

    fn emit(&self, iteration: u32, stage: LoopStage, message: &str) {
        if let Some(sink) = &self.options.log_sink {
            sink(LoopEvent {
                iteration,
                stage,
                message: message.to_string(),
            });
        }
    }
}
