//! Side-effecting boundaries: processes, persistence, and adapter transport.
//!
//! Everything that touches the filesystem, spawns processes, or talks to the
//! decision-maker lives here, behind small functions the pure loop logic can
//! be tested without.

pub mod adapter;
pub mod config;
pub mod iteration_log;
pub mod process;
pub mod prompt;
pub mod session_store;
pub mod skill_store;

use std::path::{Path, PathBuf};

/// Engine state directory inside a workdir.
pub const STATE_DIR: &str = ".taskloop";

/// Well-known paths under the state directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub session_path: PathBuf,
}

impl StatePaths {
    pub fn new(workdir: &Path) -> Self {
        let state_dir = workdir.join(STATE_DIR);
        Self {
            config_path: state_dir.join("config.toml"),
            session_path: state_dir.join("session.json"),
            state_dir,
        }
    }
}
