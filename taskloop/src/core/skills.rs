//! Deterministic skill selection.
//!
//! A skill is externally authored instructional content with trigger
//! metadata. Selection happens once at loop start: a skill is equipped when
//! the operator names it explicitly, or when one of its trigger phrases
//! appears in the task text (case-insensitive substring match). Inclusion
//! order is declaration order, so identical inputs always produce identical
//! decision-maker context.

use serde::{Deserialize, Serialize};

/// Externally authored behavior extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub name: String,
    /// Trigger phrases matched against the task text. A phrase may contain
    /// commas; each comma-separated part matches independently.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Whether the skill may be equipped from trigger matches alone.
    /// Non-invocable skills are only equipped when named explicitly.
    #[serde(default = "default_invocable")]
    pub invocable: bool,
    /// Instructional content injected into the decision-maker context.
    pub instructions: String,
}

fn default_invocable() -> bool {
    true
}

/// Select skills for a task, in declaration order.
///
/// `requested` are operator-named skills (always included when present in
/// `available`, regardless of triggers or invocability).
pub fn select_skills<'a>(
    task_text: &str,
    requested: &[String],
    available: &'a [SkillDefinition],
) -> Vec<&'a SkillDefinition> {
    let task_lower = task_text.to_lowercase();
    available
        .iter()
        .filter(|skill| {
            requested.iter().any(|name| name == &skill.name)
                || (skill.invocable && triggers_match(&task_lower, &skill.triggers))
        })
        .collect()
}

fn triggers_match(task_lower: &str, triggers: &[String]) -> bool {
    triggers
        .iter()
        .flat_map(|phrase| phrase.split(','))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .any(|part| task_lower.contains(&part.to_lowercase()))
}
