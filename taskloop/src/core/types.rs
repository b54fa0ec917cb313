//! Shared deterministic types for the task loop.
//!
//! These types define stable contracts between the engine, the capability
//! registry, and the decision adapter. They are pure data: serde round-trips
//! must be lossless because they are persisted verbatim in session files.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One proposed capability invocation from the decision-maker.
///
/// `capability` is the raw name as proposed; it is only resolved against the
/// registry at execution time so unknown names can be recorded as failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub capability: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Action {
    /// Create an action with no arguments.
    pub fn bare(capability: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            args: Map::new(),
            reasoning: None,
        }
    }

    /// The completion signal expressed as an action.
    pub fn completion(reasoning: Option<String>) -> Self {
        Self {
            capability: "complete".to_string(),
            args: Map::new(),
            reasoning,
        }
    }
}

/// Classification of a recoverable failure surfaced to the decision-maker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// Bad or unknown action arguments or capability name.
    Validation,
    /// The handler executed but the underlying operation failed.
    Capability,
    /// Handler execution exceeded the configured timeout.
    Timeout,
    /// Handler execution was aborted by external cancellation.
    Cancelled,
    /// The decision-maker produced unusable output.
    Adapter,
}

/// The recorded result of executing (or failing to obtain) an action.
///
/// Observations are append-only data: once recorded in a session they are
/// never mutated. Capability-level failures are observations, not engine
/// errors, so the decision-maker can react on the next iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Observation {
    Success {
        payload: Value,
    },
    Failure {
        kind: FailureKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<Value>,
    },
}

impl Observation {
    pub fn success(payload: Value) -> Self {
        Self::Success { payload }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn failure_with_detail(
        kind: FailureKind,
        message: impl Into<String>,
        detail: Value,
    ) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            detail: Some(detail),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Failure kind, if this observation records a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Exactly one decision-maker output per iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Invoke a capability with arguments.
    Act(Action),
    /// Signal that the task is complete.
    Complete { reasoning: Option<String> },
}

impl Decision {
    /// Flatten the decision into the action recorded in history.
    pub fn into_action(self) -> Action {
        match self {
            Self::Act(action) => action,
            Self::Complete { reasoning } => Action::completion(reasoning),
        }
    }
}

/// Why a loop run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The decision-maker signalled completion.
    Completed,
    /// The iteration counter reached the configured maximum.
    LimitExceeded,
    /// External cancellation was observed.
    Cancelled,
}

/// Final report returned to the caller alongside the session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationRecord {
    pub reason: TerminationReason,
    /// Iteration counter at termination.
    pub iterations: u32,
}

/// Cooperative cancellation flag shared with the loop.
///
/// The engine observes it at the termination-check boundary and before each
/// handler dispatch; `run_command` also polls it while the child runs.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn observation_serialization_is_tagged() {
        let obs = Observation::success(json!({"files": []}));
        let raw = serde_json::to_value(&obs).expect("serialize");
        assert_eq!(raw["outcome"], "success");

        let obs = Observation::failure(FailureKind::Validation, "bad args");
        let raw = serde_json::to_value(&obs).expect("serialize");
        assert_eq!(raw["outcome"], "failure");
        assert_eq!(raw["kind"], "validation");
        assert!(raw.get("detail").is_none());
    }

    #[test]
    fn action_round_trips_without_reasoning() {
        let action = Action::bare("list_files");
        let raw = serde_json::to_string(&action).expect("serialize");
        assert!(!raw.contains("reasoning"));
        let parsed: Action = serde_json::from_str(&raw).expect("parse");
        assert_eq!(parsed, action);
    }

    #[test]
    fn completion_decision_flattens_to_complete_action() {
        let decision = Decision::Complete {
            reasoning: Some("done".to_string()),
        };
        let action = decision.into_action();
        assert_eq!(action.capability, "complete");
        assert!(action.args.is_empty());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
