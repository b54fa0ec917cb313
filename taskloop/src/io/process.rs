//! Helpers for running child processes with timeouts, cancellation, and
//! bounded output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::types::CancelFlag;

/// Poll interval for the wait loop; bounds cancellation latency.
const WAIT_SLICE: Duration = Duration::from_millis(200);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Run a command with a timeout and capture stdout/stderr without risking
/// pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes`
/// bounds the amount of stdout/stderr stored in memory (bytes beyond this are
/// discarded while still draining the pipe). When `cancel` trips, the child
/// is killed and the output is marked `cancelled`.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: Option<&CancelFlag>,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    // Feed stdin from its own thread so a payload larger than the pipe
    // capacity cannot stall the wait loop below; the child may also exit (or
    // be killed) without draining stdin, which shows up as a broken pipe.
    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || {
                let _ = child_stdin.write_all(&input);
            }))
        }
        None => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        if let Some(flag) = cancel
            && flag.is_cancelled()
        {
            warn!("command cancelled, killing");
            cancelled = true;
            child.kill().context("kill command")?;
            break child.wait().context("wait command after kill")?;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            break child.wait().context("wait command after kill")?;
        }

        let slice = remaining.min(WAIT_SLICE);
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            break status;
        }
    };

    if let Some(handle) = stdin_handle
        && handle.join().is_err()
    {
        return Err(anyhow!("stdin writer thread panicked"));
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
        cancelled,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_exit_status() {
        let output = run_command_with_timeout(
            sh("printf hello"),
            None,
            Duration::from_secs(5),
            10_000,
            None,
        )
        .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout_lossy(), "hello");
        assert!(!output.timed_out);
        assert!(!output.cancelled);
    }

    #[test]
    fn reports_timeout_and_kills_child() {
        let output = run_command_with_timeout(
            sh("sleep 30"),
            None,
            Duration::from_millis(300),
            10_000,
            None,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn cancellation_kills_in_flight_child() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let output = run_command_with_timeout(
            sh("sleep 30"),
            None,
            Duration::from_secs(30),
            10_000,
            Some(&cancel),
        )
        .expect("run");
        assert!(output.cancelled);
        assert!(!output.timed_out);
    }

    #[test]
    fn output_beyond_limit_is_discarded_but_counted() {
        let output = run_command_with_timeout(
            sh("printf '0123456789'"),
            None,
            Duration::from_secs(5),
            4,
            None,
        )
        .expect("run");
        assert_eq!(output.stdout.len(), 4);
        assert_eq!(output.stdout_truncated, 6);
    }

    /// A stdin payload larger than the pipe capacity must not stall the
    /// wait loop: the deadline still fires while the write is in flight.
    #[test]
    fn timeout_fires_while_stdin_write_is_blocked() {
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 5"),
            Some(&vec![b'x'; 1024 * 1024]),
            Duration::from_millis(300),
            10_000,
            None,
        )
        .expect("run");
        assert!(output.timed_out);
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "timeout not enforced during stdin write: took {:?}",
            started.elapsed()
        );
    }

    /// Cancellation likewise interrupts a blocked stdin write.
    #[test]
    fn cancellation_fires_while_stdin_write_is_blocked() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let started = Instant::now();
        let output = run_command_with_timeout(
            sh("sleep 5"),
            Some(&vec![b'x'; 1024 * 1024]),
            Duration::from_secs(30),
            10_000,
            Some(&cancel),
        )
        .expect("run");
        assert!(output.cancelled);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn stdin_is_forwarded() {
        let output = run_command_with_timeout(
            sh("cat"),
            Some(b"piped input"),
            Duration::from_secs(5),
            10_000,
            None,
        )
        .expect("run");
        assert_eq!(output.stdout_lossy(), "piped input");
    }
}
