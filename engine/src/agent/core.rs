//! Investigation Loop
//!
//! Drives one investigation from its seeded conversation to a terminal state:
//!
//! 1. Check the budget; an exhausted budget ends the run without a solution
//! 2. Ask the model (through the router) for the next action
//! 3. Parse the reply; a final action ends the run with its answer
//! 4. Check for a repeated query and apply the repeat policy
//! 5. Dispatch the action and append the tool result as the next observation
//!
//! Every iteration that reaches the model spends one budget unit, including
//! the one that yields the final answer and one whose repeat is refused.
//! Malformed output, unknown actions, tool failures and model failures end
//! the run immediately; nothing is retried at this level.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::InvestigationConfig;
use crate::llm::router::LLMRouter;
use crate::llm::{LLMError, Message};
use crate::report::Reporter;
use crate::tools::{DispatchError, ToolDispatcher};
use sdk::ToolError;

use super::action::{parse_action, Action, MalformedAction};
use super::guard::{LoopGuard, QueryKey, RepeatPolicy};
use super::session::Session;
use super::termination::{conclude, LoopState, Outcome, SubmissionStatus};

/// Everything the loop needs to know about one investigation
#[derive(Debug, Clone)]
pub struct Investigation {
    pub name: String,

    /// Task name used when submitting the answer
    pub task: String,

    pub budget: u32,
    pub repeat_policy: RepeatPolicy,
    pub system_prompt: String,
    pub initial_observation: String,

    /// Trim the context sent to the model to roughly this many tokens
    pub context_token_limit: Option<usize>,
}

impl From<&InvestigationConfig> for Investigation {
    fn from(config: &InvestigationConfig) -> Self {
        Self {
            name: config.name.clone(),
            task: config.task.clone(),
            budget: config.budget,
            repeat_policy: config.repeat_policy,
            system_prompt: config.system_prompt.clone(),
            initial_observation: config.initial_observation.clone(),
            context_token_limit: config.context_token_limit,
        }
    }
}

/// Why a run ended in `DONE_ERROR`
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("malformed action: {0}")]
    Malformed(#[from] MalformedAction),

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("tool '{tool}' failed: {source}")]
    Tool {
        tool: String,
        #[source]
        source: ToolError,
    },

    #[error("model call failed: {0}")]
    Model(#[from] LLMError),
}

impl From<DispatchError> for LoopError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::UnknownAction(kind) => Self::UnknownAction(kind),
            DispatchError::Tool { tool, source } => Self::Tool { tool, source },
        }
    }
}

/// Result of one run
#[derive(Debug)]
pub struct InvestigationResult {
    /// Session id
    pub run_id: String,

    pub investigation: String,
    pub task: String,
    pub outcome: Outcome,

    /// Model calls made
    pub iterations: u32,

    /// Actions actually sent to a tool
    pub dispatches: u32,

    /// Repeated queries flagged by the guard
    pub repeats_flagged: u32,

    pub budget_initial: u32,
    pub budget_consumed: u32,

    /// Provider that produced the last model reply
    pub provider_used: Option<String>,

    pub transcript: Vec<Message>,
    pub submission: SubmissionStatus,
    pub duration_ms: u64,
}

impl InvestigationResult {
    pub fn state(&self) -> LoopState {
        self.outcome.state()
    }
}

/// Observation appended when a repeated query is refused
fn repeat_observation(action: &Action) -> String {
    format!(
        "The query {} '{}' was already issued in this investigation. Choose a different query or give the final answer.",
        action.kind, action.target
    )
}

fn transition(run_id: &str, state: &mut LoopState, next: LoopState) {
    debug!("Run {}: {} -> {}", run_id, state, next);
    *state = next;
}

/// Loop driver
///
/// Holds only shared, immutable collaborators; any number of runs may use the
/// same instance concurrently.
pub struct InvestigationLoop {
    router: Arc<LLMRouter>,
    dispatcher: Arc<ToolDispatcher>,
    reporter: Option<Arc<dyn Reporter>>,
}

impl InvestigationLoop {
    /// Create a loop driver. Without a reporter successful answers are not submitted.
    pub fn new(
        router: Arc<LLMRouter>,
        dispatcher: Arc<ToolDispatcher>,
        reporter: Option<Arc<dyn Reporter>>,
    ) -> Self {
        Self {
            router,
            dispatcher,
            reporter,
        }
    }

    /// Run an investigation to a terminal state
    pub async fn run(&self, investigation: &Investigation) -> InvestigationResult {
        let start = Instant::now();
        let mut session = Session::new(
            &investigation.system_prompt,
            &investigation.initial_observation,
            investigation.budget,
        );
        let run_id = session.id().to_string();
        let guard = LoopGuard::new(investigation.repeat_policy);

        info!(
            "Starting run {} of '{}' (budget {}, {})",
            run_id,
            investigation.name,
            investigation.budget,
            guard.policy()
        );

        let mut state = LoopState::AwaitingAction;
        let mut iterations = 0u32;
        let mut dispatches = 0u32;
        let mut repeats_flagged = 0u32;
        let mut provider_used = None;

        let outcome = loop {
            if let Err(signal) = guard.check_budget(&session) {
                info!("Run {}: {}", run_id, signal);
                break Outcome::NoSolution;
            }

            iterations += 1;
            debug!(
                "Run {} iteration {} ({} of {} units left)",
                run_id,
                iterations,
                session.budget().remaining(),
                session.budget().initial()
            );

            let context = match investigation.context_token_limit {
                Some(limit) => session.snapshot_within(limit),
                None => session.snapshot().to_vec(),
            };

            let (reply, provider) = match self.router.call(&context).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Run {}: model call failed: {}", run_id, e);
                    break Outcome::Error(LoopError::Model(e));
                }
            };
            provider_used = Some(provider);
            session.budget_mut().consume();
            session.append(Message::assistant(&reply));

            let action = match parse_action(&reply) {
                Ok(action) => action,
                Err(e) => {
                    error!("Run {}: {}", run_id, e);
                    break Outcome::Error(e.into());
                }
            };

            if let Some(reasoning) = &action.reasoning {
                debug!("Run {} reasoning: {}", run_id, reasoning);
            }

            if action.is_final {
                info!("Run {}: final answer after {} iterations", run_id, iterations);
                break Outcome::Success {
                    answer: action.target,
                };
            }

            transition(&run_id, &mut state, LoopState::Dispatching);

            if !self.dispatcher.supports(&action.kind) {
                warn!("Run {}: unknown action '{}'", run_id, action.kind);
                break Outcome::Error(LoopError::UnknownAction(action.kind.to_string()));
            }

            let key = QueryKey::new(&action.kind, &action.target);
            if let Err(signal) = guard.check_repeat(&session, &key) {
                repeats_flagged += 1;
                warn!("Run {}: {}", run_id, signal);
                if guard.policy() == RepeatPolicy::RefuseAndReprompt {
                    session.append(Message::user(repeat_observation(&action)));
                    transition(&run_id, &mut state, LoopState::AwaitingAction);
                    continue;
                }
            }

            info!("Run {}: {} {}", run_id, action.kind, action.target);
            session.record_issued(key);

            match self.dispatcher.dispatch(&action).await {
                Ok(result) => {
                    dispatches += 1;
                    session.append(Message::user(result.observation()));
                }
                Err(e) => {
                    error!("Run {}: {}", run_id, e);
                    break Outcome::Error(e.into());
                }
            }

            transition(&run_id, &mut state, LoopState::AwaitingAction);
        };

        transition(&run_id, &mut state, outcome.state());

        let submission = conclude(self.reporter.as_deref(), &investigation.task, &outcome).await;
        let budget = *session.budget();

        info!(
            "Run {} finished: {} ({} of {} units, {} dispatches)",
            run_id,
            state,
            budget.consumed(),
            budget.initial(),
            dispatches
        );

        InvestigationResult {
            run_id,
            investigation: investigation.name.clone(),
            task: investigation.task.clone(),
            outcome,
            iterations,
            dispatches,
            repeats_flagged,
            budget_initial: budget.initial(),
            budget_consumed: budget.consumed(),
            provider_used,
            transcript: session.into_transcript(),
            submission,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
