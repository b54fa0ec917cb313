//! Decision context builder for deterministic adapter input.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::capability::CapabilityKind;
use crate::core::session::{Entry, Task};
use crate::core::skills::SkillDefinition;

const DECISION_TEMPLATE: &str = include_str!("prompts/decision.md");

/// Capability descriptor for template rendering.
#[derive(Debug, Clone, Serialize)]
struct CapabilityContext {
    name: String,
    description: String,
}

/// Skill descriptor for template rendering.
#[derive(Debug, Clone, Serialize)]
struct SkillContext {
    name: String,
    instructions: String,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("decision", DECISION_TEMPLATE)
            .expect("decision template should be valid");
        Self { env }
    }

    fn render(&self, input: &PromptInputs<'_>) -> Result<String> {
        let capabilities: Vec<CapabilityContext> = CapabilityKind::ALL
            .into_iter()
            .map(|kind| CapabilityContext {
                name: kind.name().to_string(),
                description: kind.description().to_string(),
            })
            .collect();
        let skills: Vec<SkillContext> = input
            .skills
            .iter()
            .map(|skill| SkillContext {
                name: skill.name.clone(),
                instructions: skill.instructions.trim().to_string(),
            })
            .collect();
        let history: Vec<String> = input.entries.iter().map(render_entry).collect();

        let template = self.env.get_template("decision")?;
        let rendered = template.render(context! {
            instruction => input.task.instruction.trim(),
            workdir => input.task.workdir.display().to_string(),
            capabilities => capabilities,
            skills => skills,
            history => history,
        })?;
        Ok(rendered)
    }
}

/// One history line: the action and its observation, compact JSON.
fn render_entry(entry: &Entry) -> String {
    let action = entry
        .action
        .as_ref()
        .and_then(|a| serde_json::to_string(a).ok())
        .unwrap_or_else(|| "(no action)".to_string());
    let observation =
        serde_json::to_string(&entry.observation).unwrap_or_else(|_| "(unrecorded)".to_string());
    format!("{action} => {observation}\n")
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "history").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content including header.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let key = caps.get(1).unwrap().as_str().to_string();
        let required = caps.get(2).unwrap().as_str() == "required";
        let start = caps.get(0).unwrap().end();
        let end = matches
            .get(i + 1)
            .map(|m| m.get(0).unwrap().start())
            .unwrap_or(rendered.len());

        // Content after marker, excluding the marker itself
        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key,
                required,
                content,
            });
        }
    }

    sections
}

/// Apply budget to parsed sections, dropping droppable sections as needed.
///
/// Drop order: skills -> history
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    let drop_order = ["skills", "history"];
    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // If still over budget, truncate the last section
    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let last = sections.last_mut().unwrap();
        let before_len = last.content.len();
        if last.content.len() > allowed {
            if allowed > 12 {
                last.content.truncate(allowed - 12);
                last.content.push_str("\n[truncated]");
            } else {
                last.content.truncate(allowed);
            }
            debug!(
                section = last.key,
                before_len,
                after_len = last.content.len(),
                "truncated section for budget"
            );
        }
    }
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// All inputs needed to build the decision context.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub task: &'a Task,
    /// Selected skills, in declaration order.
    pub skills: &'a [&'a SkillDefinition],
    /// Full session history, oldest first.
    pub entries: &'a [Entry],
}

/// Builds the decision context within a byte budget, dropping less critical
/// sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Build the decision context for one iteration.
    pub fn build(&self, input: &PromptInputs<'_>) -> Result<PromptPack> {
        let engine = PromptEngine::new();
        let rendered = engine.render(input)?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);

        Ok(PromptPack {
            content: render_sections(&sections),
        })
    }
}

/// A rendered decision context ready to send to the adapter.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    /// Get the rendered content.
    pub fn render(&self) -> String {
        self.content.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Action, Observation};
    use serde_json::json;
    use std::path::PathBuf;

    fn task() -> Task {
        Task {
            instruction: "convert data.json to yaml".to_string(),
            workdir: PathBuf::from("/work/project"),
        }
    }

    fn skill(name: &str, instructions: &str) -> SkillDefinition {
        SkillDefinition {
            name: name.to_string(),
            triggers: Vec::new(),
            invocable: true,
            instructions: instructions.to_string(),
        }
    }

    /// Verifies sections appear in deterministic order.
    #[test]
    fn section_ordering_is_stable() {
        let task = task();
        let prd = skill("prd", "Maintain prd.json.");
        let skills: Vec<&SkillDefinition> = vec![&prd];
        let entries = vec![Entry {
            action: Some(Action::bare("list_files")),
            observation: Observation::success(json!(["data.json"])),
        }];

        let pack = PromptBuilder::new(10_000)
            .build(&PromptInputs {
                task: &task,
                skills: &skills,
                entries: &entries,
            })
            .expect("build");
        let content = pack.render();

        let contract_pos = content.find("### Contract").expect("contract section");
        let instruction_pos = content.find("### Instruction").expect("instruction section");
        let workdir_pos = content.find("### Working Directory").expect("workdir section");
        let capabilities_pos = content
            .find("### Capabilities")
            .expect("capabilities section");
        let skills_pos = content.find("### Skills").expect("skills section");
        let history_pos = content.find("### History").expect("history section");

        assert!(contract_pos < instruction_pos, "contract before instruction");
        assert!(instruction_pos < workdir_pos, "instruction before workdir");
        assert!(workdir_pos < capabilities_pos, "workdir before capabilities");
        assert!(capabilities_pos < skills_pos, "capabilities before skills");
        assert!(skills_pos < history_pos, "skills before history");

        // Every capability is advertised.
        for kind in CapabilityKind::ALL {
            assert!(content.contains(kind.name()), "missing {}", kind.name());
        }
    }

    /// Empty skills and history collapse instead of rendering empty headers.
    #[test]
    fn optional_sections_are_omitted_when_empty() {
        let task = task();
        let pack = PromptBuilder::new(10_000)
            .build(&PromptInputs {
                task: &task,
                skills: &[],
                entries: &[],
            })
            .expect("build");
        let content = pack.render();

        assert!(!content.contains("### Skills"));
        assert!(!content.contains("### History"));
        assert!(content.contains("convert data.json to yaml"));
    }

    /// Verifies budget enforcement drops less critical sections first.
    #[test]
    fn budget_drops_skills_before_history() {
        let task = task();
        let verbose = skill("verbose", &"filler ".repeat(300));
        let skills: Vec<&SkillDefinition> = vec![&verbose];
        let entries = vec![Entry {
            action: Some(Action::bare("list_files")),
            observation: Observation::success(json!([])),
        }];

        let pack = PromptBuilder::new(1_500)
            .build(&PromptInputs {
                task: &task,
                skills: &skills,
                entries: &entries,
            })
            .expect("build");
        let content = pack.render();

        assert!(!content.contains("### Skills"), "skills should be dropped");
        assert!(
            content.contains("### Contract"),
            "contract should remain"
        );
        assert!(
            content.contains("### Instruction"),
            "instruction should remain"
        );
    }

    /// Identical inputs render byte-identical context.
    #[test]
    fn rendering_is_deterministic() {
        let task = task();
        let entries = vec![Entry {
            action: Some(Action::bare("read_file")),
            observation: Observation::success(json!("contents")),
        }];
        let inputs = PromptInputs {
            task: &task,
            skills: &[],
            entries: &entries,
        };

        let first = PromptBuilder::new(10_000).build(&inputs).expect("build");
        let second = PromptBuilder::new(10_000).build(&inputs).expect("build");
        assert_eq!(first.render(), second.render());
    }
}
