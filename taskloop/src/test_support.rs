//! Test-only helpers: scripted decision adapters and capability contexts.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::capability::CapabilityContext;
use crate::core::types::{Action, CancelFlag, Decision};
use crate::io::adapter::{DecisionAdapter, DecisionRequest};

/// One scripted adapter response.
#[derive(Debug, Clone)]
pub enum ScriptedDecision {
    Decision(Decision),
    /// Simulate garbled or failed decision-maker output.
    Error(String),
}

/// A scripted action decision with JSON arguments.
pub fn act(capability: &str, args: Value) -> ScriptedDecision {
    let args = match args {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    ScriptedDecision::Decision(Decision::Act(Action {
        capability: capability.to_string(),
        args,
        reasoning: None,
    }))
}

/// A scripted completion decision.
pub fn complete(reasoning: Option<&str>) -> ScriptedDecision {
    ScriptedDecision::Decision(Decision::Complete {
        reasoning: reasoning.map(str::to_string),
    })
}

/// Deterministic adapter that replays a fixed script.
#[derive(Debug)]
pub struct ScriptedAdapter {
    script: VecDeque<ScriptedDecision>,
    calls: u32,
}

impl ScriptedAdapter {
    pub fn new(script: Vec<ScriptedDecision>) -> Self {
        Self {
            script: script.into(),
            calls: 0,
        }
    }

    /// Number of decisions requested so far.
    pub fn calls(&self) -> u32 {
        self.calls
    }
}

impl DecisionAdapter for ScriptedAdapter {
    fn decide(&mut self, _request: &DecisionRequest<'_>) -> Result<Decision> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(ScriptedDecision::Decision(decision)) => Ok(decision),
            Some(ScriptedDecision::Error(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted adapter exhausted after {} calls", self.calls)),
        }
    }
}

/// Capability context with short test-friendly limits.
pub fn capability_context<'a>(workdir: &'a Path, cancel: &'a CancelFlag) -> CapabilityContext<'a> {
    CapabilityContext {
        workdir,
        command_timeout: Duration::from_secs(10),
        output_limit_bytes: 100_000,
        cancel,
    }
}
