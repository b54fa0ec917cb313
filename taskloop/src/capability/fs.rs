//! Filesystem capabilities: `list_files`, `read_file`, `write_file`.
//!
//! All paths are resolved relative to the working directory and confined to
//! it; escaping the workdir (via `..` or an absolute path outside it) is a
//! capability failure, never a panic or an engine fault.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use walkdir::WalkDir;

use crate::capability::{CapabilityContext, HandlerFailure, HandlerResult};
use crate::core::types::FailureKind;

#[derive(Debug, Deserialize)]
struct ListFilesArgs {
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    ".".to_string()
}

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

pub fn list_files(args: &Map<String, Value>, ctx: &CapabilityContext<'_>) -> HandlerResult {
    let args: ListFilesArgs = parse_args(args)?;
    let target = confine(ctx.workdir, &args.path)?;

    // A missing directory is an empty listing, not a failure: the
    // decision-maker routinely probes paths it has not created yet.
    if !target.exists() {
        return Ok(json!([]));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&target).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            HandlerFailure::new(FailureKind::Capability, format!("walk {}: {e}", args.path))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&target)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();
        files.push(rel);
    }
    debug!(path = %args.path, count = files.len(), "listed files");
    Ok(json!(files))
}

pub fn read_file(args: &Map<String, Value>, ctx: &CapabilityContext<'_>) -> HandlerResult {
    let args: ReadFileArgs = parse_args(args)?;
    let target = confine(ctx.workdir, &args.path)?;
    let contents = fs::read_to_string(&target).map_err(|e| {
        HandlerFailure::new(FailureKind::Capability, format!("read {}: {e}", args.path))
    })?;
    Ok(Value::String(contents))
}

pub fn write_file(args: &Map<String, Value>, ctx: &CapabilityContext<'_>) -> HandlerResult {
    let args: WriteFileArgs = parse_args(args)?;
    let target = confine(ctx.workdir, &args.path)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            HandlerFailure::new(
                FailureKind::Capability,
                format!("create directory for {}: {e}", args.path),
            )
        })?;
    }
    fs::write(&target, &args.content).map_err(|e| {
        HandlerFailure::new(FailureKind::Capability, format!("write {}: {e}", args.path))
    })?;
    debug!(path = %args.path, bytes = args.content.len(), "wrote file");
    Ok(json!({ "path": args.path, "bytes_written": args.content.len() }))
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(
    args: &Map<String, Value>,
) -> Result<T, HandlerFailure> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| {
        HandlerFailure::new(FailureKind::Validation, format!("decode arguments: {e}"))
    })
}

/// Resolve `raw` against the workdir and reject any path that escapes it.
pub(crate) fn confine(workdir: &Path, raw: &str) -> Result<PathBuf, HandlerFailure> {
    let candidate = Path::new(raw);
    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        workdir.join(candidate)
    };

    let normalized = normalize(&joined);
    if !normalized.starts_with(normalize(workdir)) {
        return Err(HandlerFailure::new(
            FailureKind::Capability,
            format!("path {raw} is outside the working directory"),
        ));
    }
    Ok(normalized)
}

/// Lexical normalization: resolves `.` and `..` without touching the
/// filesystem, so confinement also holds for paths that do not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
