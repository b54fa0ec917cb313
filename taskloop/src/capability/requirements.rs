//! The `update_requirements` capability: append user stories to the
//! requirement document (`prd.json` in the workdir).

use std::fs;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;
use uuid::Uuid;

use crate::capability::fs::parse_args;
use crate::capability::{CapabilityContext, HandlerFailure, HandlerResult};
use crate::core::types::FailureKind;

const REQUIREMENTS_FILE: &str = "prd.json";

/// Requirement document layout. Field names are camelCase on disk for
/// compatibility with external PRD tooling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsDoc {
    pub branch_name: String,
    #[serde(default)]
    pub user_stories: Vec<UserStory>,
}

impl Default for RequirementsDoc {
    fn default() -> Self {
        Self {
            branch_name: "main".to_string(),
            user_stories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStory {
    pub story_id: String,
    pub story_title: String,
    /// New stories always start unmet.
    pub passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateRequirementsArgs {
    story_title: String,
    story_id: Option<String>,
    notes: Option<String>,
}

/// Append a story to `prd.json`, creating the document when missing.
///
/// Existing stories are never mutated; an unreadable document is replaced by
/// a fresh one rather than failing the loop.
pub fn update_requirements(args: &Map<String, Value>, ctx: &CapabilityContext<'_>) -> HandlerResult {
    let args: UpdateRequirementsArgs = parse_args(args)?;
    let path = ctx.workdir.join(REQUIREMENTS_FILE);

    let mut doc = match fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
        Err(_) => RequirementsDoc::default(),
    };

    let story_id = args
        .story_id
        .unwrap_or_else(|| Uuid::new_v4().to_string()[..8].to_string());
    doc.user_stories.push(UserStory {
        story_id: story_id.clone(),
        story_title: args.story_title.clone(),
        passes: false,
        notes: args.notes,
    });

    let mut buf = serde_json::to_string_pretty(&doc).map_err(|e| {
        HandlerFailure::new(FailureKind::Capability, format!("serialize {REQUIREMENTS_FILE}: {e}"))
    })?;
    buf.push('\n');
    fs::write(&path, buf).map_err(|e| {
        HandlerFailure::new(FailureKind::Capability, format!("write {REQUIREMENTS_FILE}: {e}"))
    })?;

    debug!(story_id = %story_id, stories = doc.user_stories.len(), "updated requirements");
    Ok(json!({
        "storyId": story_id,
        "storyTitle": args.story_title,
        "storyCount": doc.user_stories.len(),
    }))
}
