//! The `run_command` capability: shell execution confined to the workdir.

use std::process::Command;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::capability::fs::parse_args;
use crate::capability::{CapabilityContext, HandlerFailure, HandlerResult};
use crate::core::types::FailureKind;
use crate::io::process::run_command_with_timeout;

#[derive(Debug, Deserialize)]
struct RunCommandArgs {
    command: String,
}

/// Run a shell command with the configured timeout and bounded output.
///
/// A nonzero exit is a capability failure with structured detail; timeout and
/// cancellation get their own failure kinds so the decision-maker (and the
/// termination check) can distinguish them.
pub fn run_command(args: &Map<String, Value>, ctx: &CapabilityContext<'_>) -> HandlerResult {
    let args: RunCommandArgs = parse_args(args)?;
    debug!(command = %args.command, "running shell command");

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&args.command).current_dir(ctx.workdir);

    let output = run_command_with_timeout(
        cmd,
        None,
        ctx.command_timeout,
        ctx.output_limit_bytes,
        Some(ctx.cancel),
    )
    .map_err(|e| HandlerFailure::new(FailureKind::Capability, format!("spawn command: {e:#}")))?;

    let detail = json!({
        "exit_code": output.status.code(),
        "stdout": output.stdout_lossy(),
        "stderr": output.stderr_lossy(),
        "stdout_truncated_bytes": output.stdout_truncated,
        "stderr_truncated_bytes": output.stderr_truncated,
    });

    if output.cancelled {
        warn!(command = %args.command, "command cancelled");
        return Err(HandlerFailure::with_detail(
            FailureKind::Cancelled,
            "command aborted by cancellation",
            detail,
        ));
    }
    if output.timed_out {
        warn!(command = %args.command, "command timed out");
        return Err(HandlerFailure::with_detail(
            FailureKind::Timeout,
            format!(
                "command timed out after {}s",
                ctx.command_timeout.as_secs()
            ),
            detail,
        ));
    }
    if !output.status.success() {
        return Err(HandlerFailure::with_detail(
            FailureKind::Capability,
            format!("command exited with status {:?}", output.status.code()),
            detail,
        ));
    }

    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::CancelFlag;
    use crate::test_support::capability_context;

    fn command_args(command: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("command".to_string(), json!(command));
        map
    }

    #[test]
    fn successful_command_returns_output_payload() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cancel = CancelFlag::new();
        let ctx = capability_context(temp.path(), &cancel);

        let payload = run_command(&command_args("printf out; printf err >&2"), &ctx).expect("run");
        assert_eq!(payload["exit_code"], json!(0));
        assert_eq!(payload["stdout"], json!("out"));
        assert_eq!(payload["stderr"], json!("err"));
    }

    /// `false` always fails; the loop must see a capability failure, not an
    /// engine error.
    #[test]
    fn nonzero_exit_is_capability_failure_with_detail() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cancel = CancelFlag::new();
        let ctx = capability_context(temp.path(), &cancel);

        let failure = run_command(&command_args("false"), &ctx).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Capability);
        let detail = failure.detail.expect("detail");
        assert_eq!(detail["exit_code"], json!(1));
    }

    #[test]
    fn commands_run_in_the_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker"), "").expect("write");
        let cancel = CancelFlag::new();
        let ctx = capability_context(temp.path(), &cancel);

        let payload = run_command(&command_args("ls"), &ctx).expect("run");
        assert!(payload["stdout"].as_str().expect("stdout").contains("marker"));
    }

    /// Exceeding the configured budget surfaces as a timeout failure, not a
    /// generic capability failure.
    #[test]
    fn slow_command_is_a_timeout_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cancel = CancelFlag::new();
        let mut ctx = capability_context(temp.path(), &cancel);
        ctx.command_timeout = std::time::Duration::from_millis(300);

        let failure = run_command(&command_args("sleep 30"), &ctx).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.message.contains("timed out"));
    }

    #[test]
    fn pre_cancelled_flag_aborts_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cancel = CancelFlag::new();
        cancel.cancel();
        let ctx = capability_context(temp.path(), &cancel);

        let failure = run_command(&command_args("sleep 30"), &ctx).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Cancelled);
    }
}
