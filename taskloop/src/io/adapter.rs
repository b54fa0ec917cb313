//! Decision adapter: the boundary between the engine and the external
//! decision-maker.
//!
//! The engine never interprets decision-maker reasoning; it only consumes
//! structured decisions. `CommandAdapter` shells out to a configured command,
//! writes the rendered context to its stdin, and parses a single JSON
//! decision from its stdout. Anything else behind this trait (a scripted
//! fake, a different transport) is invisible to the loop.

use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::types::{Action, CancelFlag, Decision};
use crate::io::process::run_command_with_timeout;

const DECISION_SCHEMA: &str = include_str!("../../schemas/decision.schema.json");

static DECISION_VALIDATOR: LazyLock<Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(DECISION_SCHEMA).expect("decision schema should be valid JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("decision schema should compile")
});

/// Everything an adapter needs for one decision.
#[derive(Debug, Clone)]
pub struct DecisionRequest<'a> {
    /// Rendered decision context, delivered verbatim.
    pub prompt: &'a str,
    /// Wall-clock budget for this call.
    pub timeout: Duration,
    /// Bound on captured adapter output.
    pub output_limit_bytes: usize,
    pub cancel: &'a CancelFlag,
}

/// Produces exactly one decision per call.
///
/// Errors mean the decision-maker produced nothing usable; the engine records
/// them as adapter-failure observations and keeps looping.
pub trait DecisionAdapter {
    fn decide(&mut self, request: &DecisionRequest<'_>) -> Result<Decision>;
}

/// Adapter that invokes an external command for each decision.
#[derive(Debug, Clone)]
pub struct CommandAdapter {
    argv: Vec<String>,
}

impl CommandAdapter {
    /// Build an adapter for the given argv. An empty argv (or a blank
    /// program name) is rejected here so embedders cannot reach a panic at
    /// decide time.
    pub fn new(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() || argv[0].trim().is_empty() {
            return Err(anyhow!("adapter command must be a non-empty argv"));
        }
        Ok(Self { argv })
    }
}

impl DecisionAdapter for CommandAdapter {
    #[instrument(skip_all, fields(command = %self.argv[0]))]
    fn decide(&mut self, request: &DecisionRequest<'_>) -> Result<Decision> {
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);

        let output = run_command_with_timeout(
            cmd,
            Some(request.prompt.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
            Some(request.cancel),
        )?;

        if output.cancelled {
            return Err(anyhow!("decision call cancelled"));
        }
        if output.timed_out {
            return Err(anyhow!(
                "decision call timed out after {}s",
                request.timeout.as_secs()
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "decision command failed");
            return Err(anyhow!(
                "decision command exited with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }

        parse_decision(&output.stdout_lossy())
    }
}

/// Parse one decision from raw decision-maker output.
///
/// The output may carry prose around the JSON object; only the outermost
/// object is considered. The object must satisfy the decision schema.
pub fn parse_decision(raw: &str) -> Result<Decision> {
    let json_str = extract_object(raw)
        .ok_or_else(|| anyhow!("no JSON object found in decision output"))?;
    let value: Value = serde_json::from_str(json_str).context("parse decision JSON")?;

    let violations: Vec<String> = DECISION_VALIDATOR
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !violations.is_empty() {
        return Err(anyhow!("decision violates schema: {}", violations.join("; ")));
    }

    let action: Action = serde_json::from_value(value).context("decode decision")?;
    debug!(capability = %action.capability, "parsed decision");
    if action.capability == "complete" {
        Ok(Decision::Complete {
            reasoning: action.reasoning,
        })
    } else {
        Ok(Decision::Act(action))
    }
}

/// Slice out the outermost `{...}` in `raw`, if any.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}
