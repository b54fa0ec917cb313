//! Capability registry: the fixed set of side-effecting operations the
//! decision-maker may invoke.
//!
//! The capability set is a closed enum, not open-ended dispatch: every
//! capability carries a JSON Schema (Draft 2020-12) for its arguments, and
//! validation runs before any handler executes. A schema mismatch or unknown
//! name produces a validation-failure observation instead of invoking a
//! handler. The registry itself is side-effect-free bookkeeping; all side
//! effects live in the handlers.

pub mod fs;
pub mod requirements;
pub mod shell;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::core::types::{CancelFlag, FailureKind, Observation};

const LIST_FILES_SCHEMA: &str = include_str!("../../schemas/capabilities/list_files.schema.json");
const READ_FILE_SCHEMA: &str = include_str!("../../schemas/capabilities/read_file.schema.json");
const WRITE_FILE_SCHEMA: &str = include_str!("../../schemas/capabilities/write_file.schema.json");
const RUN_COMMAND_SCHEMA: &str = include_str!("../../schemas/capabilities/run_command.schema.json");
const UPDATE_REQUIREMENTS_SCHEMA: &str =
    include_str!("../../schemas/capabilities/update_requirements.schema.json");
const COMPLETE_SCHEMA: &str = include_str!("../../schemas/capabilities/complete.schema.json");

/// The closed capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    ListFiles,
    ReadFile,
    WriteFile,
    RunCommand,
    UpdateRequirements,
    Complete,
}

impl CapabilityKind {
    /// All capabilities, in the order they are advertised to the
    /// decision-maker.
    pub const ALL: [CapabilityKind; 6] = [
        CapabilityKind::ListFiles,
        CapabilityKind::ReadFile,
        CapabilityKind::WriteFile,
        CapabilityKind::RunCommand,
        CapabilityKind::UpdateRequirements,
        CapabilityKind::Complete,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CapabilityKind::ListFiles => "list_files",
            CapabilityKind::ReadFile => "read_file",
            CapabilityKind::WriteFile => "write_file",
            CapabilityKind::RunCommand => "run_command",
            CapabilityKind::UpdateRequirements => "update_requirements",
            CapabilityKind::Complete => "complete",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// One-line description surfaced in the decision-maker context.
    pub fn description(self) -> &'static str {
        match self {
            CapabilityKind::ListFiles => {
                "List all files under a directory in the workspace (recursive, relative paths)."
            }
            CapabilityKind::ReadFile => "Read the content of a file in the workspace.",
            CapabilityKind::WriteFile => {
                "Write content to a file in the workspace, creating parent directories."
            }
            CapabilityKind::RunCommand => "Run a shell command in the workspace.",
            CapabilityKind::UpdateRequirements => {
                "Append a user story to the requirement document (prd.json)."
            }
            CapabilityKind::Complete => {
                "Signal that the task is complete and the loop should stop."
            }
        }
    }

    fn schema_source(self) -> &'static str {
        match self {
            CapabilityKind::ListFiles => LIST_FILES_SCHEMA,
            CapabilityKind::ReadFile => READ_FILE_SCHEMA,
            CapabilityKind::WriteFile => WRITE_FILE_SCHEMA,
            CapabilityKind::RunCommand => RUN_COMMAND_SCHEMA,
            CapabilityKind::UpdateRequirements => UPDATE_REQUIREMENTS_SCHEMA,
            CapabilityKind::Complete => COMPLETE_SCHEMA,
        }
    }
}

/// Failure returned across the handler boundary.
///
/// Handlers never panic or propagate engine faults; every internal fault is
/// captured here and recorded as an observation.
#[derive(Debug)]
pub struct HandlerFailure {
    pub kind: FailureKind,
    pub message: String,
    pub detail: Option<Value>,
}

impl HandlerFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(kind: FailureKind, message: impl Into<String>, detail: Value) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: Some(detail),
        }
    }
}

pub type HandlerResult = Result<Value, HandlerFailure>;

/// Runtime context passed to handlers; owns nothing, confines everything to
/// the task's working directory.
#[derive(Debug, Clone)]
pub struct CapabilityContext<'a> {
    pub workdir: &'a Path,
    /// Wall-clock budget for `run_command`.
    pub command_timeout: Duration,
    /// Bound on captured child-process output.
    pub output_limit_bytes: usize,
    pub cancel: &'a CancelFlag,
}

/// Fixed mapping from capability name to schema validator and handler.
///
/// Registered once at process start; immutable thereafter.
pub struct CapabilityRegistry {
    validators: Vec<(CapabilityKind, Validator)>,
}

impl CapabilityRegistry {
    /// Compile all capability schemas. Fails only on a broken embedded
    /// schema, which is a build defect rather than a runtime condition.
    pub fn new() -> Result<Self> {
        let mut validators = Vec::with_capacity(CapabilityKind::ALL.len());
        for kind in CapabilityKind::ALL {
            let schema: Value = serde_json::from_str(kind.schema_source())
                .with_context(|| format!("parse schema for {}", kind.name()))?;
            let validator = jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&schema)
                .with_context(|| format!("compile schema for {}", kind.name()))?;
            validators.push((kind, validator));
        }
        Ok(Self { validators })
    }

    /// Resolve a capability name. Unknown names are the caller's recoverable
    /// failure, not an error.
    pub fn lookup(&self, name: &str) -> Option<CapabilityKind> {
        CapabilityKind::from_name(name)
    }

    /// Validate arguments against the capability's schema. Returns the
    /// collected violation messages on mismatch.
    pub fn validate_args(&self, kind: CapabilityKind, args: &Map<String, Value>) -> Result<(), Vec<String>> {
        let validator = self
            .validators
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, v)| v)
            .expect("every capability has a compiled schema");
        let instance = Value::Object(args.clone());
        let messages: Vec<String> = validator
            .iter_errors(&instance)
            .map(|err| err.to_string())
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }

    /// Validate and execute a capability, capturing the result as an
    /// observation. Never returns an engine error: handler failures are data.
    pub fn invoke(
        &self,
        kind: CapabilityKind,
        args: &Map<String, Value>,
        ctx: &CapabilityContext<'_>,
    ) -> Observation {
        debug!(capability = kind.name(), "dispatching capability");

        if let Err(violations) = self.validate_args(kind, args) {
            warn!(capability = kind.name(), "argument validation failed");
            return Observation::failure_with_detail(
                FailureKind::Validation,
                format!("invalid arguments for {}", kind.name()),
                json!({ "violations": violations }),
            );
        }

        let result = match kind {
            CapabilityKind::ListFiles => fs::list_files(args, ctx),
            CapabilityKind::ReadFile => fs::read_file(args, ctx),
            CapabilityKind::WriteFile => fs::write_file(args, ctx),
            CapabilityKind::RunCommand => shell::run_command(args, ctx),
            CapabilityKind::UpdateRequirements => requirements::update_requirements(args, ctx),
            // No side effect: the engine observes the executed capability
            // kind at the termination check.
            CapabilityKind::Complete => Ok(json!("completion signal recorded")),
        };

        match result {
            Ok(payload) => Observation::success(payload),
            Err(failure) => match failure.detail {
                Some(detail) => {
                    Observation::failure_with_detail(failure.kind, failure.message, detail)
                }
                None => Observation::failure(failure.kind, failure.message),
            },
        }
    }
}
