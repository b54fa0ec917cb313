//! Session persistence for crash-safe resume (`.taskloop/session.json`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::session::SessionState;

/// Load a persisted session, returning `None` when no session file exists.
///
/// A file that exists but does not parse, or whose iteration counter
/// disagrees with its log, is an error rather than a silent fresh start.
pub fn load_session(path: &Path) -> Result<Option<SessionState>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading session");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read session {}", path.display()))?;
    let mut state: SessionState = serde_json::from_str(&contents)
        .with_context(|| format!("parse session {}", path.display()))?;
    state.mark_resumed()?;
    debug!(iterations = state.iterations(), "session loaded");
    Ok(Some(state))
}

/// Atomically write the session to disk (temp file + rename).
///
/// Called after every recorded iteration so a crash loses at most the
/// in-flight iteration.
pub fn save_session(path: &Path, state: &SessionState) -> Result<()> {
    debug!(path = %path.display(), iterations = state.iterations(), "writing session");
    let mut buf = serde_json::to_string_pretty(state)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("session path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp session {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace session {}", path.display()))?;
    Ok(())
}
