//! Mutable team data stored in `team-data.yaml`.
//!
//! Updates use dot-notation keys expanded into nested mappings and a smart
//! string coercion so CLI-provided values land as their intended YAML types.

use serde_yaml::{Mapping, Value as YamlValue};

use super::{PantheonWorkspace, TEAM_DATA_FILENAME};
use crate::error::{PantheonError, Result};

impl PantheonWorkspace {
    /// Raw `team-data.yaml` content for the active team.
    pub fn get_team_data(&self) -> Result<String> {
        let path = self.build_team_path(&[TEAM_DATA_FILENAME])?;
        if !self.filesystem().exists(&path) {
            return Err(PantheonError::NotFound(
                "team-data.yaml not found in team root".into(),
            ));
        }
        self.filesystem().read_text(&path)
    }

    /// Applies deletes (first) and dot-keyed updates to `team-data.yaml`.
    ///
    /// Each update value goes through [`coerce_value_type`]; nested keys are
    /// deep-merged so sibling data survives.
    pub fn set_team_data(&self, updates: &[(String, String)], deletes: &[String]) -> Result<()> {
        let path = self.build_team_path(&[TEAM_DATA_FILENAME])?;

        let mut data = if self.filesystem().exists(&path) {
            let content = self.filesystem().read_text(&path)?;
            match serde_yaml::from_str::<YamlValue>(&content) {
                Ok(YamlValue::Mapping(map)) => map,
                Ok(YamlValue::Null) => Mapping::new(),
                Ok(_) => Mapping::new(),
                Err(err) => {
                    return Err(PantheonError::InvalidConfig(format!(
                        "invalid YAML in team-data.yaml: {err}"
                    )));
                }
            }
        } else {
            Mapping::new()
        };

        for delete_key in deletes {
            delete_nested_key(&mut data, delete_key);
        }

        for (dot_key, value) in updates {
            let coerced = coerce_value_type(value);
            let nested = parse_dot_notation(dot_key, coerced);
            deep_merge(&mut data, nested);
        }

        let yaml_content = serde_yaml::to_string(&YamlValue::Mapping(data))?;
        self.filesystem().write_text(&path, &yaml_content)
    }
}

fn parse_dot_notation(dot_key: &str, value: YamlValue) -> Mapping {
    let mut parts: Vec<&str> = dot_key.split('.').collect();
    let last = parts.pop().unwrap_or(dot_key);

    let mut current = Mapping::new();
    current.insert(YamlValue::String(last.to_owned()), value);

    for part in parts.into_iter().rev() {
        let mut wrapper = Mapping::new();
        wrapper.insert(
            YamlValue::String(part.to_owned()),
            YamlValue::Mapping(current),
        );
        current = wrapper;
    }

    current
}

fn deep_merge(base: &mut Mapping, update: Mapping) {
    for (key, value) in update {
        match (base.get_mut(&key), value) {
            (Some(YamlValue::Mapping(existing)), YamlValue::Mapping(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn delete_nested_key(data: &mut Mapping, dot_key: &str) {
    let mut parts: Vec<&str> = dot_key.split('.').collect();
    let last = match parts.pop() {
        Some(last) => last,
        None => return,
    };

    let mut current = data;
    for part in parts {
        match current.get_mut(part) {
            Some(YamlValue::Mapping(next)) => current = next,
            _ => return,
        }
    }
    current.remove(last);
}

/// Converts a string to its most likely YAML type, keeping ambiguous
/// tokens (`"1.2.3"`, `"01abc"`) as strings.
pub fn coerce_value_type(value: &str) -> YamlValue {
    let lower = value.to_lowercase();
    if lower == "true" {
        return YamlValue::Bool(true);
    }
    if lower == "false" {
        return YamlValue::Bool(false);
    }

    let unsigned = value.strip_prefix('-').unwrap_or(value);
    if !unsigned.is_empty() && unsigned.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(int) = value.parse::<i64>() {
            return YamlValue::Number(int.into());
        }
    }

    if value.matches('.').count() == 1 {
        let digits_only: String = unsigned.chars().filter(|c| *c != '.').collect();
        if !digits_only.is_empty() && digits_only.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(float) = value.parse::<f64>() {
                return YamlValue::Number(serde_yaml::Number::from(float));
            }
        }
    }

    YamlValue::String(value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::{FileSystem, MemoryFileSystem};
    use std::path::Path;
    use std::sync::Arc;

    fn workspace(seed_yaml: Option<&str>) -> (Arc<MemoryFileSystem>, PantheonWorkspace) {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.seed("/project/.pantheon_project", "active_team: dev\n");
        if let Some(yaml) = seed_yaml {
            fs.seed("/project/pantheon-teams/dev/team-data.yaml", yaml);
        } else {
            // Team root must exist for writes.
            fs.mkdir(Path::new("/project/pantheon-teams/dev"), true, true)
                .unwrap();
        }
        let workspace = PantheonWorkspace::new(
            "/project",
            "pantheon-artifacts",
            fs.clone() as Arc<dyn FileSystem>,
        );
        (fs, workspace)
    }

    #[test]
    fn coercion_table_matches_contract() {
        assert_eq!(coerce_value_type("true"), YamlValue::Bool(true));
        assert_eq!(coerce_value_type("FALSE"), YamlValue::Bool(false));
        assert_eq!(coerce_value_type("15"), YamlValue::Number(15.into()));
        assert_eq!(coerce_value_type("-3"), YamlValue::Number((-3).into()));
        assert_eq!(
            coerce_value_type("87.5"),
            YamlValue::Number(serde_yaml::Number::from(87.5))
        );
        assert_eq!(
            coerce_value_type("hello"),
            YamlValue::String("hello".into())
        );
        assert_eq!(
            coerce_value_type("1.2.3"),
            YamlValue::String("1.2.3".into())
        );
        assert_eq!(coerce_value_type(""), YamlValue::String(String::new()));
    }

    #[test]
    fn set_team_data_merges_nested_keys() {
        let (fs, workspace) = workspace(Some("agents:\n  frontend: UI dev\n"));

        workspace
            .set_team_data(
                &[
                    ("agents.backend".into(), "Backend specialist".into()),
                    ("metrics.count".into(), "15".into()),
                ],
                &[],
            )
            .unwrap();

        let written = fs
            .read_text(Path::new("/project/pantheon-teams/dev/team-data.yaml"))
            .unwrap();
        let parsed: YamlValue = serde_yaml::from_str(&written).unwrap();
        assert_eq!(parsed["agents"]["frontend"], "UI dev");
        assert_eq!(parsed["agents"]["backend"], "Backend specialist");
        assert_eq!(parsed["metrics"]["count"], 15);
    }

    #[test]
    fn deletes_apply_before_updates_and_tolerate_missing_keys() {
        let (fs, workspace) =
            workspace(Some("agents:\n  old: retired\n  kept: here\n"));

        workspace
            .set_team_data(
                &[("agents.old".into(), "rehired".into())],
                &["agents.old".into(), "never.existed".into()],
            )
            .unwrap();

        let written = fs
            .read_text(Path::new("/project/pantheon-teams/dev/team-data.yaml"))
            .unwrap();
        let parsed: YamlValue = serde_yaml::from_str(&written).unwrap();
        // Delete ran first, then the update re-added the key.
        assert_eq!(parsed["agents"]["old"], "rehired");
        assert_eq!(parsed["agents"]["kept"], "here");
    }

    #[test]
    fn get_team_data_requires_file() {
        let (_fs, workspace) = workspace(None);
        let err = workspace.get_team_data().unwrap_err();
        assert!(matches!(err, PantheonError::NotFound(_)));
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let (_fs, workspace) = workspace(Some(": not yaml ["));
        let err = workspace
            .set_team_data(&[("a".into(), "b".into())], &[])
            .unwrap_err();
        assert!(matches!(err, PantheonError::InvalidConfig(_)));
    }
}
