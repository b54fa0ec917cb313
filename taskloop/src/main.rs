//! Bounded task loop between an external decision-maker and a fixed
//! capability set.
//!
//! `taskloop run` drives the loop for one instruction file; every iteration
//! is persisted under `.taskloop/` in the workdir so an interrupted run can
//! be resumed with `--resume`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use taskloop::capability::CapabilityRegistry;
use taskloop::core::session::{SessionState, Task};
use taskloop::core::skills::select_skills;
use taskloop::core::types::{CancelFlag, TerminationReason};
use taskloop::exit_codes;
use taskloop::io::StatePaths;
use taskloop::io::adapter::CommandAdapter;
use taskloop::io::config::{ensure_config, load_config};
use taskloop::io::session_store::load_session;
use taskloop::io::skill_store::load_skills;
use taskloop::looping::{LoopRequest, run_loop};

#[derive(Parser)]
#[command(
    name = "taskloop",
    version,
    about = "Bounded task loop between a decision-maker and fixed capabilities"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the decision loop for an instruction file.
    Run {
        /// Working directory all capability side effects are confined to.
        workdir: PathBuf,
        /// File containing the task instruction.
        instruction_file: PathBuf,
        /// Iteration ceiling (defaults to `max_iterations` from config).
        #[arg(short, long)]
        limit: Option<u32>,
        /// Resume the persisted session instead of starting fresh.
        #[arg(long)]
        resume: bool,
        /// Equip a skill by name regardless of triggers (repeatable).
        #[arg(long = "skill")]
        skills: Vec<String>,
    },
    /// List available skills, optionally previewing trigger matches.
    Skills {
        workdir: PathBuf,
        /// Instruction file to preview selection against.
        instruction_file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    taskloop::logging::init();
    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::INVALID as u8)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            workdir,
            instruction_file,
            limit,
            resume,
            skills,
        } => cmd_run(&workdir, &instruction_file, limit, resume, &skills),
        Command::Skills {
            workdir,
            instruction_file,
        } => cmd_skills(&workdir, instruction_file.as_deref()),
    }
}

fn cmd_run(
    workdir: &Path,
    instruction_file: &Path,
    limit: Option<u32>,
    resume: bool,
    requested_skills: &[String],
) -> Result<i32> {
    let workdir = workdir
        .canonicalize()
        .with_context(|| format!("resolve workdir {}", workdir.display()))?;
    let instruction = fs::read_to_string(instruction_file)
        .with_context(|| format!("read instruction file {}", instruction_file.display()))?;
    if instruction.trim().is_empty() {
        bail!("instruction file {} is empty", instruction_file.display());
    }

    let paths = StatePaths::new(&workdir);
    let config = ensure_config(&paths.config_path)?;

    let available = load_skills(&workdir.join(&config.skills_dir))?;
    for name in requested_skills {
        if !available.iter().any(|skill| &skill.name == name) {
            bail!("unknown skill {name}");
        }
    }
    let selected = select_skills(&instruction, requested_skills, &available);
    if !selected.is_empty() {
        let names: Vec<&str> = selected.iter().map(|s| s.name.as_str()).collect();
        info!(skills = names.join(","), "skills equipped");
    }

    let fresh = || {
        SessionState::new(Task {
            instruction: instruction.clone(),
            workdir: workdir.clone(),
        })
    };
    let mut state = if resume {
        match load_session(&paths.session_path)? {
            Some(state) => {
                if state.task().instruction != instruction {
                    bail!(
                        "persisted session was started with a different instruction; \
                         run without --resume to start over"
                    );
                }
                info!(iterations = state.iterations(), "resuming session");
                state
            }
            None => fresh(),
        }
    } else {
        fresh()
    };

    let registry = CapabilityRegistry::new()?;
    let mut adapter = CommandAdapter::new(config.adapter.command.clone())?;
    let cancel = CancelFlag::new();
    let max_iterations = limit.unwrap_or(config.max_iterations);

    let record = run_loop(
        &mut state,
        &mut adapter,
        &registry,
        &LoopRequest {
            config: &config,
            max_iterations,
            skills: &selected,
            cancel: &cancel,
            state_dir: Some(&paths.state_dir),
        },
        |entry| {
            let capability = entry
                .action
                .as_ref()
                .map_or("(adapter failure)", |a| a.capability.as_str());
            let outcome = if entry.observation.is_success() {
                "ok"
            } else {
                "failed"
            };
            println!("[{capability}] {outcome}");
        },
    )?;

    println!(
        "terminated: {} after {} iteration(s)",
        match record.reason {
            TerminationReason::Completed => "completed",
            TerminationReason::LimitExceeded => "limit exceeded",
            TerminationReason::Cancelled => "cancelled",
        },
        record.iterations
    );

    Ok(match record.reason {
        TerminationReason::Completed => exit_codes::OK,
        TerminationReason::LimitExceeded => exit_codes::LIMIT_EXCEEDED,
        TerminationReason::Cancelled => exit_codes::CANCELLED,
    })
}

fn cmd_skills(workdir: &Path, instruction_file: Option<&Path>) -> Result<i32> {
    let paths = StatePaths::new(workdir);
    let config = load_config(&paths.config_path)?;
    let available = load_skills(&workdir.join(&config.skills_dir))?;

    if available.is_empty() {
        println!("no skills found in {}", config.skills_dir);
        return Ok(exit_codes::OK);
    }

    let selected_names: Vec<String> = match instruction_file {
        Some(path) => {
            let instruction = fs::read_to_string(path)
                .with_context(|| format!("read instruction file {}", path.display()))?;
            select_skills(&instruction, &[], &available)
                .into_iter()
                .map(|skill| skill.name.clone())
                .collect()
        }
        None => Vec::new(),
    };

    for skill in &available {
        let marker = if selected_names.contains(&skill.name) {
            "*"
        } else if skill.invocable {
            " "
        } else {
            "-"
        };
        println!("{marker} {} [{}]", skill.name, skill.triggers.join("; "));
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from(["taskloop", "run", ".", "task.md"]);
        match cli.command {
            Command::Run {
                limit,
                resume,
                skills,
                ..
            } => {
                assert_eq!(limit, None);
                assert!(!resume);
                assert!(skills.is_empty());
            }
            Command::Skills { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_with_limit_and_skills() {
        let cli = Cli::parse_from([
            "taskloop", "run", ".", "task.md", "--limit", "7", "--skill", "prd", "--skill",
            "review", "--resume",
        ]);
        match cli.command {
            Command::Run {
                limit,
                resume,
                skills,
                ..
            } => {
                assert_eq!(limit, Some(7));
                assert!(resume);
                assert_eq!(skills, vec!["prd".to_string(), "review".to_string()]);
            }
            Command::Skills { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn parse_skills_subcommand() {
        let cli = Cli::parse_from(["taskloop", "skills", "."]);
        assert!(matches!(cli.command, Command::Skills { .. }));
    }
}
