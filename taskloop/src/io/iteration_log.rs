//! Iteration logging helpers for `.taskloop/iterations/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::session::Entry;

#[derive(Debug, Clone)]
pub struct IterationPaths {
    pub dir: PathBuf,
    pub action_path: PathBuf,
    pub observation_path: PathBuf,
    pub prompt_path: PathBuf,
}

impl IterationPaths {
    pub fn new(state_dir: &Path, iter: u32) -> Self {
        let dir = state_dir.join("iterations").join(iter.to_string());
        Self {
            dir: dir.clone(),
            action_path: dir.join("action.json"),
            observation_path: dir.join("observation.json"),
            prompt_path: dir.join("prompt.md"),
        }
    }
}

/// Write one iteration's artifacts for later inspection.
///
/// The session log is the source of truth; these files exist so a human can
/// replay what the decision-maker saw and produced without parsing the log.
pub fn write_iteration(
    state_dir: &Path,
    iter: u32,
    entry: &Entry,
    prompt: Option<&str>,
) -> Result<IterationPaths> {
    let paths = IterationPaths::new(state_dir, iter);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create iteration dir {}", paths.dir.display()))?;

    if let Some(action) = &entry.action {
        write_json(&paths.action_path, action)?;
    }
    write_json(&paths.observation_path, &entry.observation)?;
    if let Some(prompt) = prompt {
        write_text(&paths.prompt_path, prompt)?;
    }

    Ok(paths)
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Action, FailureKind, Observation};

    #[test]
    fn iteration_paths_are_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = IterationPaths::new(temp.path(), 3);

        assert!(paths.dir.ends_with(Path::new("iterations/3")));
        assert!(paths.action_path.ends_with("action.json"));
        assert!(paths.observation_path.ends_with("observation.json"));
        assert!(paths.prompt_path.ends_with("prompt.md"));
    }

    #[test]
    fn writes_action_observation_and_prompt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let entry = Entry {
            action: Some(Action::bare("list_files")),
            observation: Observation::success(serde_json::json!([])),
        };

        let paths =
            write_iteration(temp.path(), 1, &entry, Some("rendered prompt")).expect("write");
        assert!(paths.action_path.is_file());
        assert!(paths.observation_path.is_file());
        assert!(paths.prompt_path.is_file());
    }

    /// Adapter-failure entries have no action to log.
    #[test]
    fn synthetic_entry_skips_action_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let entry = Entry {
            action: None,
            observation: Observation::failure(FailureKind::Adapter, "garbled output"),
        };

        let paths = write_iteration(temp.path(), 2, &entry, None).expect("write");
        assert!(!paths.action_path.exists());
        assert!(paths.observation_path.is_file());
        assert!(!paths.prompt_path.exists());
    }
}
