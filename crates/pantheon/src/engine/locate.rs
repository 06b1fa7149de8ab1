//! Artifact location: fuzzy ID normalization and locator-driven search.

use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::ArtifactEngine;
use crate::error::PantheonError;
use crate::jsonnet;
use crate::path::PantheonPath;

const PATTERN_KEY: &str = "pattern";
const REPLACEMENT_KEY: &str = "replacement";
const DIRECTORY_KEY: &str = "directory";
const ARTIFACT_ID_EXT_VAR: &str = "pantheon_artifact_id";

impl ArtifactEngine {
    /// Normalizes a fuzzy artifact ID through the process's parser rules.
    ///
    /// Rules are an array of `{pattern, replacement}` objects applied
    /// sequentially. Malformed rules are skipped; any failure falls back to
    /// the fuzzy ID unchanged.
    pub(crate) fn normalize_id(&self, process_name: &str, fuzzy_id: &str) -> String {
        let parser_content = match self.workspace().get_artifact_parser(process_name) {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) => {
                debug!(process = process_name, "empty parser rules, using id as-is");
                return fuzzy_id.to_owned();
            }
            Err(err) => {
                warn!(process = process_name, %err, "failed to load parser rules");
                return fuzzy_id.to_owned();
            }
        };

        let rules = match jsonnet::evaluate(&parser_content, "parser.jsonnet", &[], &[]) {
            Ok(JsonValue::Array(rules)) => rules,
            Ok(other) => {
                warn!(
                    process = process_name,
                    got = other.to_string().as_str(),
                    "invalid parser format, expected array"
                );
                return fuzzy_id.to_owned();
            }
            Err(err) => {
                warn!(process = process_name, %err, "failed to compile parser rules");
                return fuzzy_id.to_owned();
            }
        };

        let mut current = fuzzy_id.to_owned();
        for rule in rules {
            let Some(rule) = rule.as_object() else {
                debug!("skipping malformed parser rule");
                continue;
            };
            let (Some(pattern), Some(replacement)) = (
                rule.get(PATTERN_KEY).and_then(JsonValue::as_str),
                rule.get(REPLACEMENT_KEY).and_then(JsonValue::as_str),
            ) else {
                debug!("skipping parser rule without pattern/replacement");
                continue;
            };

            match Regex::new(pattern) {
                Ok(re) => {
                    let rewritten = re.replace_all(&current, replacement).into_owned();
                    debug!(pattern, replacement, before = current.as_str(), after = rewritten.as_str(), "applied parser rule");
                    current = rewritten;
                }
                Err(err) => {
                    warn!(pattern, %err, "invalid regex in parser rule");
                    continue;
                }
            }
        }

        debug!(fuzzy = fuzzy_id, canonical = current.as_str(), "normalized artifact id");
        current
    }

    /// Locates an artifact by canonical ID using the process locator.
    /// Returns `None` on zero matches and on ambiguity (with a warning).
    pub(crate) fn locate_artifact(
        &self,
        process_name: &str,
        canonical_id: &str,
    ) -> Option<PantheonPath> {
        let ext_vars = vec![(ARTIFACT_ID_EXT_VAR.to_owned(), canonical_id.to_owned())];
        self.locate_with_externals(process_name, &ext_vars, false)
    }

    /// Locates the single artifact of a singleton process (no ID).
    pub(crate) fn locate_singleton_artifact(&self, process_name: &str) -> Option<PantheonPath> {
        self.locate_with_externals(process_name, &[], true)
    }

    fn locate_with_externals(
        &self,
        process_name: &str,
        ext_vars: &[(String, String)],
        singleton: bool,
    ) -> Option<PantheonPath> {
        let locator_content = match self.workspace().get_artifact_locator(process_name) {
            Ok(content) if !content.trim().is_empty() => content,
            Ok(_) | Err(PantheonError::NotFound(_)) => {
                warn!(process = process_name, "no artifact locator found");
                return None;
            }
            Err(err) => {
                warn!(process = process_name, %err, "failed to load artifact locator");
                return None;
            }
        };

        let locator = match jsonnet::evaluate(&locator_content, "locator.jsonnet", ext_vars, &[]) {
            Ok(JsonValue::Object(locator)) => locator,
            Ok(_) => {
                warn!(process = process_name, "invalid locator format, expected object with 'pattern'");
                return None;
            }
            Err(err) => {
                warn!(process = process_name, %err, "failed to compile locator");
                return None;
            }
        };

        let Some(pattern) = locator.get(PATTERN_KEY).and_then(JsonValue::as_str) else {
            warn!(process = process_name, "locator is missing the 'pattern' key");
            return None;
        };
        let directory = locator.get(DIRECTORY_KEY).and_then(JsonValue::as_str);

        debug!(process = process_name, pattern, directory = directory.unwrap_or("<sandbox root>"), "searching for artifacts");

        let matches = self.workspace().get_matching_artifact(pattern, directory);
        match matches.len() {
            0 => {
                if singleton {
                    warn!(process = process_name, "singleton mode: no artifacts found");
                } else {
                    debug!(process = process_name, "no artifacts matched the pattern");
                }
                None
            }
            1 => Some(matches.into_iter().next().expect("length checked")),
            _ => {
                let found: Vec<String> = matches.iter().map(ToString::to_string).collect();
                warn!(process = process_name, ?found, "multiple artifacts matched, expected exactly one");
                None
            }
        }
    }
}
