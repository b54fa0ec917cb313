//! Engine configuration stored under `.taskloop/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Engine configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Default iteration limit when the `run` command does not pass one.
    pub max_iterations: u32,

    /// Wall-clock budget in seconds for each `run_command` invocation.
    pub command_timeout_secs: u64,

    /// Wall-clock budget in seconds for a single decision-maker call.
    pub adapter_timeout_secs: u64,

    /// Truncate capability stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Byte budget for the rendered decision context.
    pub prompt_budget_bytes: usize,

    /// Directory (relative to the workdir) scanned for skill definitions.
    pub skills_dir: String,

    pub adapter: AdapterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AdapterConfig {
    /// Command invoked for each decision (e.g. `["claude","-p"]`). The
    /// rendered context arrives on stdin; the decision is read from stdout.
    pub command: Vec<String>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            command: vec!["claude".to_string(), "-p".to_string()],
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            command_timeout_secs: 60,
            adapter_timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            prompt_budget_bytes: 40_000,
            skills_dir: "skills".to_string(),
            adapter: AdapterConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(anyhow!("max_iterations must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.adapter_timeout_secs == 0 {
            return Err(anyhow!("adapter_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.adapter.command.is_empty() || self.adapter.command[0].trim().is_empty() {
            return Err(anyhow!("adapter.command must be a non-empty array"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config, writing the defaults to disk on first use so operators have
/// a file to edit. An existing file is never rewritten.
pub fn ensure_config(path: &Path) -> Result<EngineConfig> {
    let existed = path.exists();
    let cfg = load_config(path)?;
    if !existed {
        write_config(path, &cfg)?;
    }
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
