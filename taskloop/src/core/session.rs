//! Append-only session state for one loop run.
//!
//! A session is the immutable task plus an ordered log of
//! (action, observation) pairs and an iteration counter. The log is
//! append-only: entries are never mutated or reordered after being recorded,
//! which keeps persistence and resumption trivial (resuming only ever
//! appends). The counter increments by exactly one per recorded pair.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::{Action, Observation};

/// Immutable per-invocation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Free-text instruction for the decision-maker.
    pub instruction: String,
    /// Working directory all capability side effects are confined to.
    pub workdir: PathBuf,
}

/// One recorded loop iteration.
///
/// `action` is `None` only for synthetic entries recorded when the decision
/// adapter itself failed before proposing an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub observation: Observation,
}

/// The accumulating record of one interaction loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    task: Task,
    entries: Vec<Entry>,
    iterations: u32,
    /// Number of entries present when this session was loaded from storage.
    /// Not persisted; used to assert that resumption only appends.
    #[serde(skip)]
    resumed_len: usize,
}

impl SessionState {
    /// Start a fresh session for a task.
    pub fn new(task: Task) -> Self {
        Self {
            task,
            entries: Vec::new(),
            iterations: 0,
            resumed_len: 0,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Number of entries carried over from persisted history.
    pub fn resumed_len(&self) -> usize {
        self.resumed_len
    }

    /// Append one completed pair and advance the iteration counter.
    pub fn record(&mut self, action: Option<Action>, observation: Observation) {
        self.entries.push(Entry {
            action,
            observation,
        });
        self.iterations += 1;
    }

    /// Validate internal invariants after deserialization and mark every
    /// existing entry as resumed (resumption never rewrites, only appends).
    pub fn mark_resumed(&mut self) -> Result<()> {
        if self.iterations as usize != self.entries.len() {
            return Err(anyhow!(
                "corrupt session: iteration counter {} does not match {} entries",
                self.iterations,
                self.entries.len()
            ));
        }
        self.resumed_len = self.entries.len();
        Ok(())
    }

    /// True when `self` extends `prior` without losing or reordering entries.
    pub fn extends(&self, prior: &[Entry]) -> bool {
        self.entries.len() >= prior.len() && &self.entries[..prior.len()] == prior
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FailureKind;
    use serde_json::json;

    fn task() -> Task {
        Task {
            instruction: "do the thing".to_string(),
            workdir: PathBuf::from("/tmp/work"),
        }
    }

    /// Counter equals the number of recorded pairs, always.
    #[test]
    fn counter_tracks_recorded_pairs() {
        let mut session = SessionState::new(task());
        assert_eq!(session.iterations(), 0);

        session.record(
            Some(Action::bare("list_files")),
            Observation::success(json!([])),
        );
        session.record(None, Observation::failure(FailureKind::Adapter, "garbled"));

        assert_eq!(session.iterations(), 2);
        assert_eq!(session.entries().len(), 2);
    }

    /// Recording after a resume keeps prior entries byte-identical.
    #[test]
    fn resumed_history_is_append_only() {
        let mut session = SessionState::new(task());
        session.record(
            Some(Action::bare("read_file")),
            Observation::success(json!("contents")),
        );
        let raw = serde_json::to_string(&session).expect("serialize");

        let mut resumed: SessionState = serde_json::from_str(&raw).expect("parse");
        resumed.mark_resumed().expect("valid");
        assert_eq!(resumed.resumed_len(), 1);
        let prior = resumed.entries().to_vec();

        resumed.record(
            Some(Action::completion(None)),
            Observation::success(json!("complete")),
        );

        assert!(resumed.extends(&prior));
        assert_eq!(resumed.iterations(), 2);
    }

    /// A counter that disagrees with the entry count is rejected on load.
    #[test]
    fn mark_resumed_rejects_corrupt_counter() {
        let raw = json!({
            "task": {"instruction": "x", "workdir": "/tmp/w"},
            "entries": [],
            "iterations": 3,
        });
        let mut session: SessionState = serde_json::from_value(raw).expect("parse");
        let err = session.mark_resumed().unwrap_err();
        assert!(err.to_string().contains("corrupt session"));
    }
}
