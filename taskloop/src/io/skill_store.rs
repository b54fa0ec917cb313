//! Skill discovery: TOML definitions loaded from the skills directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::skills::SkillDefinition;

/// Load every `*.toml` skill definition under `dir`.
///
/// Files are read in lexicographic filename order so the resulting
/// declaration order (and therefore selection order) is deterministic. A
/// missing directory means no skills, not an error.
pub fn load_skills(dir: &Path) -> Result<Vec<SkillDefinition>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read skills dir {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read skills dir {}", dir.display()))?;
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "toml") && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut skills = Vec::with_capacity(paths.len());
    for path in paths {
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read skill {}", path.display()))?;
        let skill: SkillDefinition =
            toml::from_str(&contents).with_context(|| format!("parse skill {}", path.display()))?;
        debug!(skill = %skill.name, path = %path.display(), "loaded skill");
        skills.push(skill);
    }
    Ok(skills)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_means_no_skills() {
        let temp = tempfile::tempdir().expect("tempdir");
        let skills = load_skills(&temp.path().join("skills")).expect("load");
        assert!(skills.is_empty());
    }

    #[test]
    fn skills_load_in_filename_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("20-review.toml"),
            "name = \"review\"\ntriggers = [\"review\"]\ninstructions = \"Review the diff.\"\n",
        )
        .expect("write");
        fs::write(
            temp.path().join("10-prd.toml"),
            "name = \"prd\"\ntriggers = [\"prd, requirements\"]\ninstructions = \"Maintain prd.json.\"\n",
        )
        .expect("write");
        fs::write(temp.path().join("notes.txt"), "not a skill").expect("write");

        let skills = load_skills(temp.path()).expect("load");
        let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["prd", "review"]);
        assert!(skills[0].invocable);
    }

    #[test]
    fn malformed_definition_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("bad.toml"), "name = 42\n").expect("write");
        assert!(load_skills(temp.path()).is_err());
    }
}
