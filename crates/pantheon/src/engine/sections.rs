//! Marker-delimited section extraction and splicing.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use super::ArtifactEngine;
use crate::error::PantheonError;
use crate::path::PantheonPath;

const SECTION_START_KEY: &str = "section_start";
const SECTION_END_KEY: &str = "section_end";
const PLACEHOLDER_KEY: &str = "placeholder";

/// Extracts the trimmed content between the first occurrence of
/// `start_marker` and the following `end_marker`, or `None` when either
/// marker is missing.
pub(crate) fn parse_section_markers(
    content: &str,
    start_marker: &str,
    end_marker: &str,
) -> Option<String> {
    let start_pos = content.find(start_marker)?;
    let body_start = start_pos + start_marker.len();
    let end_offset = content[body_start..].find(end_marker)?;
    Some(content[body_start..body_start + end_offset].trim().to_owned())
}

/// Replaces the span between the first `start_marker` and the following
/// `end_marker` with `body`, preserving both markers and everything else.
pub(crate) fn replace_section(
    content: &str,
    start_marker: &str,
    end_marker: &str,
    body: &str,
) -> Option<String> {
    let start_pos = content.find(start_marker)?;
    let body_start = start_pos + start_marker.len();
    let end_offset = content[body_start..].find(end_marker)?;
    let end_pos = body_start + end_offset;

    let mut result = String::with_capacity(content.len() + body.len());
    result.push_str(&content[..body_start]);
    result.push_str(body);
    result.push_str(&content[end_pos..]);
    Some(result)
}

impl ArtifactEngine {
    /// Extracts marked sections from an artifact.
    ///
    /// Never fails: problems log a warning and produce a conservative
    /// result. A process without `sections.jsonnet` returns the whole file
    /// under the `content` key; sections whose body contains the
    /// placeholder marker are omitted.
    pub fn get_artifact_sections(
        &self,
        process_name: &str,
        artifact_path: &PantheonPath,
        section_names: &[String],
    ) -> BTreeMap<String, String> {
        let markers_content = match self.workspace().get_artifact_section_markers(process_name) {
            Ok(content) => content,
            Err(PantheonError::NotFound(_)) => {
                debug!(process = process_name, "no sections.jsonnet, returning whole artifact");
                return match self.workspace().read_artifact_file(artifact_path) {
                    Ok(file_content) => {
                        BTreeMap::from([("content".to_owned(), file_content)])
                    }
                    Err(err) => {
                        warn!(%artifact_path, %err, "failed to read artifact file");
                        BTreeMap::new()
                    }
                };
            }
            Err(err) => {
                warn!(process = process_name, %err, "failed to load section markers");
                return BTreeMap::new();
            }
        };

        if markers_content.trim().is_empty() {
            warn!(process = process_name, "empty marker definitions");
            return BTreeMap::new();
        }

        let markers: JsonValue = match serde_json::from_str(&markers_content) {
            Ok(JsonValue::Object(map)) => JsonValue::Object(map),
            Ok(_) => {
                warn!(process = process_name, "markers must be a JSON object");
                return BTreeMap::new();
            }
            Err(err) => {
                warn!(process = process_name, %err, "failed to parse markers JSON");
                return BTreeMap::new();
            }
        };
        let markers = markers.as_object().expect("checked above");

        let file_content = match self.workspace().read_artifact_file(artifact_path) {
            Ok(content) => content,
            Err(err) => {
                warn!(%artifact_path, %err, "failed to read artifact file");
                return BTreeMap::new();
            }
        };

        let placeholder = markers
            .get(PLACEHOLDER_KEY)
            .and_then(JsonValue::as_str)
            .unwrap_or("");

        // A present `sections` key claims the nested shape outright; a
        // malformed value must not be reinterpreted as another shape.
        if markers.contains_key("sections") {
            return match markers.get("sections").and_then(JsonValue::as_object) {
                Some(sections_config) => extract_named_sections(
                    sections_config,
                    placeholder,
                    &file_content,
                    section_names,
                ),
                None => {
                    warn!(process = process_name, "markers 'sections' must be an object");
                    BTreeMap::new()
                }
            };
        }

        if markers.contains_key(SECTION_START_KEY) && markers.contains_key(SECTION_END_KEY) {
            return extract_flat_sections(markers, placeholder, &file_content, section_names);
        }

        if markers.contains_key(PLACEHOLDER_KEY) {
            if !placeholder.is_empty() && file_content.contains(placeholder) {
                return BTreeMap::new();
            }
            return BTreeMap::from([("content".to_owned(), file_content)]);
        }

        warn!(process = process_name, "marker configuration has no recognizable structure");
        BTreeMap::new()
    }
}

fn extract_named_sections(
    sections_config: &serde_json::Map<String, JsonValue>,
    placeholder: &str,
    file_content: &str,
    section_names: &[String],
) -> BTreeMap<String, String> {
    let requested: Vec<String> = if section_names.is_empty() {
        sections_config.keys().cloned().collect()
    } else {
        section_names.to_vec()
    };

    let mut sections = BTreeMap::new();
    for name in requested {
        let Some(config) = sections_config.get(&name).and_then(JsonValue::as_object) else {
            debug!(section = name.as_str(), "section not found in configuration");
            continue;
        };

        let start = config.get("start").and_then(JsonValue::as_str).unwrap_or("");
        let end = config.get("end").and_then(JsonValue::as_str).unwrap_or("");
        if start.is_empty() || end.is_empty() {
            debug!(section = name.as_str(), "missing start or end marker");
            continue;
        }

        if let Some(body) = parse_section_markers(file_content, start, end) {
            if !placeholder.is_empty() && body.contains(placeholder) {
                continue;
            }
            sections.insert(name, body);
        }
    }
    sections
}

fn extract_flat_sections(
    markers: &serde_json::Map<String, JsonValue>,
    placeholder: &str,
    file_content: &str,
    section_names: &[String],
) -> BTreeMap<String, String> {
    // Flat markers cannot enumerate sections, so explicit names are required.
    if section_names.is_empty() {
        debug!("flat marker structure requires explicit section names");
        return BTreeMap::new();
    }

    let start_template = markers
        .get(SECTION_START_KEY)
        .and_then(JsonValue::as_str)
        .unwrap_or("");
    let end_template = markers
        .get(SECTION_END_KEY)
        .and_then(JsonValue::as_str)
        .unwrap_or("");

    let mut sections = BTreeMap::new();
    for name in section_names {
        let start = start_template.replace("{name}", name);
        let end = end_template.replace("{name}", name);

        if let Some(body) = parse_section_markers(file_content, &start, &end) {
            if !placeholder.is_empty() && body.contains(placeholder) {
                continue;
            }
            sections.insert(name.clone(), body);
        }
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_between_markers() {
        let content = "<S>hello world</S>";
        assert_eq!(
            parse_section_markers(content, "<S>", "</S>").as_deref(),
            Some("hello world")
        );
    }

    #[test]
    fn trims_extracted_content() {
        let content = "<S>\n  body text  \n</S>";
        assert_eq!(
            parse_section_markers(content, "<S>", "</S>").as_deref(),
            Some("body text")
        );
    }

    #[test]
    fn missing_markers_return_none() {
        assert!(parse_section_markers("no markers", "<S>", "</S>").is_none());
        assert!(parse_section_markers("<S>unterminated", "<S>", "</S>").is_none());
    }

    #[test]
    fn replace_section_preserves_everything_else() {
        let content = "before<!--S:PLAN-->old<!--E:PLAN-->after";
        let result =
            replace_section(content, "<!--S:PLAN-->", "<!--E:PLAN-->", "new").unwrap();
        assert_eq!(result, "before<!--S:PLAN-->new<!--E:PLAN-->after");
    }

    #[test]
    fn replace_section_uses_first_occurrence_only() {
        let content = "<S>one</S> <S>two</S>";
        let result = replace_section(content, "<S>", "</S>", "X").unwrap();
        assert_eq!(result, "<S>X</S> <S>two</S>");
    }

    #[test]
    fn replace_section_fails_without_markers() {
        assert!(replace_section("plain", "<S>", "</S>", "X").is_none());
    }
}
