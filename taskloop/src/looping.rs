//! The bounded decision loop for `taskloop run`.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::capability::{CapabilityContext, CapabilityKind, CapabilityRegistry};
use crate::core::session::{Entry, SessionState};
use crate::core::skills::SkillDefinition;
use crate::core::types::{
    CancelFlag, FailureKind, Observation, TerminationReason, TerminationRecord,
};
use crate::io::adapter::{DecisionAdapter, DecisionRequest};
use crate::io::config::EngineConfig;
use crate::io::iteration_log::write_iteration;
use crate::io::prompt::{PromptBuilder, PromptInputs};
use crate::io::session_store::save_session;

/// Inputs for one loop invocation.
#[derive(Debug, Clone)]
pub struct LoopRequest<'a> {
    pub config: &'a EngineConfig,
    /// Iteration ceiling for this invocation (overrides the config default
    /// when the operator passes `--limit`).
    pub max_iterations: u32,
    /// Skills selected for this task, in declaration order.
    pub skills: &'a [&'a SkillDefinition],
    pub cancel: &'a CancelFlag,
    /// State directory for persistence and iteration artifacts. `None`
    /// disables persistence (in-memory runs).
    pub state_dir: Option<&'a std::path::Path>,
}

/// Run the decision loop until completion, the iteration limit, or
/// cancellation.
///
/// Recoverable trouble (bad decisions, failed capabilities, garbled adapter
/// output) is recorded as observations and the loop continues; only engine
/// faults (persistence, broken schemas) abort with an error. `on_iteration`
/// fires after each recorded pair.
pub fn run_loop<A: DecisionAdapter, F: FnMut(&Entry)>(
    state: &mut SessionState,
    adapter: &mut A,
    registry: &CapabilityRegistry,
    request: &LoopRequest<'_>,
    mut on_iteration: F,
) -> Result<TerminationRecord> {
    let workdir = state.task().workdir.clone();
    let builder = PromptBuilder::new(request.config.prompt_budget_bytes);

    loop {
        if request.cancel.is_cancelled() {
            info!(iterations = state.iterations(), "loop cancelled");
            return Ok(terminated(state, TerminationReason::Cancelled));
        }
        if state.iterations() >= request.max_iterations {
            info!(
                iterations = state.iterations(),
                max_iterations = request.max_iterations,
                "iteration limit reached"
            );
            return Ok(terminated(state, TerminationReason::LimitExceeded));
        }

        let prompt = builder
            .build(&PromptInputs {
                task: state.task(),
                skills: request.skills,
                entries: state.entries(),
            })?
            .render();

        let decision = adapter.decide(&DecisionRequest {
            prompt: &prompt,
            timeout: Duration::from_secs(request.config.adapter_timeout_secs),
            output_limit_bytes: request.config.output_limit_bytes,
            cancel: request.cancel,
        });

        let decision = match decision {
            Ok(decision) => decision,
            Err(err) => {
                // A decision call aborted by cancellation is not an adapter
                // defect; let the boundary check above report it.
                if request.cancel.is_cancelled() {
                    continue;
                }
                warn!("decision adapter failed: {err:#}");
                state.record(
                    None,
                    Observation::failure(FailureKind::Adapter, format!("{err:#}")),
                );
                persist(state, request, &prompt)?;
                if let Some(entry) = state.entries().last() {
                    on_iteration(entry);
                }
                continue;
            }
        };

        let action = decision.into_action();
        debug!(capability = %action.capability, iteration = state.iterations() + 1, "executing action");

        let (kind, observation) = match registry.lookup(&action.capability) {
            None => (
                None,
                Observation::failure(
                    FailureKind::Validation,
                    format!("unknown capability {}", action.capability),
                ),
            ),
            Some(kind) => {
                let ctx = CapabilityContext {
                    workdir: &workdir,
                    command_timeout: Duration::from_secs(request.config.command_timeout_secs),
                    output_limit_bytes: request.config.output_limit_bytes,
                    cancel: request.cancel,
                };
                (Some(kind), registry.invoke(kind, &action.args, &ctx))
            }
        };

        let completed = kind == Some(CapabilityKind::Complete) && observation.is_success();
        state.record(Some(action), observation);
        persist(state, request, &prompt)?;
        if let Some(entry) = state.entries().last() {
            on_iteration(entry);
        }

        if completed {
            info!(iterations = state.iterations(), "task completed");
            return Ok(terminated(state, TerminationReason::Completed));
        }
    }
}

fn terminated(state: &SessionState, reason: TerminationReason) -> TerminationRecord {
    TerminationRecord {
        reason,
        iterations: state.iterations(),
    }
}

/// Persist the session and the latest iteration's artifacts.
fn persist(state: &SessionState, request: &LoopRequest<'_>, prompt: &str) -> Result<()> {
    let Some(state_dir) = request.state_dir else {
        return Ok(());
    };
    save_session(&state_dir.join("session.json"), state).context("persist session")?;
    if let Some(entry) = state.entries().last() {
        write_iteration(state_dir, state.iterations(), entry, Some(prompt))
            .context("write iteration artifacts")?;
    }
    Ok(())
}
