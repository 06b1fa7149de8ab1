//! Schema compilation and input validation.

use jsonschema::Draft;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;

use crate::error::{PantheonError, Result};
use crate::jsonnet;
use crate::workspace::PantheonWorkspace;

const DRAFT07_MARKER: &str = "http://json-schema.org/draft-07/schema#";

/// JSON-Schema keywords that stay at the schema root when a bare property
/// map is wrapped.
const ROOT_SCHEMA_FIELDS: &[&str] = &[
    "$schema",
    "type",
    "title",
    "description",
    "required",
    "additionalProperties",
    "definitions",
    "$defs",
];

pub(crate) fn compile_schema_impl(
    workspace: &PantheonWorkspace,
    schema_content: &str,
    profile: &JsonValue,
    process_name: Option<&str>,
    include_schema_metadata: bool,
) -> Result<JsonValue> {
    if schema_content.trim().is_empty() {
        return Err(PantheonError::SchemaCompile(
            "schema content cannot be empty".into(),
        ));
    }

    let (ext_vars, ext_codes) = profile_externals(profile)?;

    let filename = match process_name {
        Some(process) => workspace
            .get_process_schema_path(process)
            .unwrap_or_else(|_| "snippet".to_owned()),
        None => "snippet".to_owned(),
    };

    debug!(filename, content_len = schema_content.len(), "compiling schema");

    let compiled = jsonnet::evaluate(schema_content, &filename, &ext_vars, &ext_codes)?;
    if !compiled.is_object() {
        return Err(PantheonError::SchemaCompile(
            "compiled schema must be a JSON object".into(),
        ));
    }

    let compiled_json = serde_json::to_string_pretty(&compiled)
        .map_err(|err| PantheonError::SchemaCompile(err.to_string()))?;
    let sanitized = sanitize_schema_structure(&compiled_json, include_schema_metadata)?;

    let result: JsonValue = serde_json::from_str(&sanitized)
        .map_err(|err| PantheonError::SchemaCompile(err.to_string()))?;
    if !result.is_object() {
        return Err(PantheonError::SchemaCompile(
            "sanitized schema must be a JSON object".into(),
        ));
    }

    Ok(result)
}

/// Resolves the active profile and converts it to Jsonnet externals.
///
/// Top-level string values become ext-vars; everything else becomes an
/// ext-code holding the JSON serialization, so each top-level profile key
/// reaches the evaluator as its own external.
fn profile_externals(
    profile: &JsonValue,
) -> Result<(Vec<(String, String)>, Vec<(String, String)>)> {
    let active_config: JsonValue = match profile.as_object() {
        Some(bundle) if bundle.contains_key("active_profile") && bundle.contains_key("profiles") => {
            let name = bundle["active_profile"].as_str().ok_or_else(|| {
                PantheonError::SchemaCompile("active_profile must be a string".into())
            })?;
            let profiles = bundle["profiles"].as_object().ok_or_else(|| {
                PantheonError::SchemaCompile("profiles section must be an object".into())
            })?;
            profiles.get(name).cloned().ok_or_else(|| {
                PantheonError::SchemaCompile(format!(
                    "active profile '{name}' not found in profiles"
                ))
            })?
        }
        _ => JsonValue::Object(JsonMap::new()),
    };

    let mut ext_vars = Vec::new();
    let mut ext_codes = Vec::new();

    match active_config {
        JsonValue::Object(map) => {
            for (key, value) in map {
                match value {
                    JsonValue::String(text) => ext_vars.push((key, text)),
                    other => ext_codes.push((key, other.to_string())),
                }
            }
        }
        JsonValue::String(text) => ext_vars.push(("profile".to_owned(), text)),
        other => ext_codes.push(("profile".to_owned(), other.to_string())),
    }

    Ok((ext_vars, ext_codes))
}

/// Ensures compiled content has proper JSON-Schema structure.
///
/// Content that still looks like Jsonnet (contains `std.` or `function(`)
/// passes through unchanged. Already-shaped schemas pass through, bare
/// property maps are wrapped, and mixed maps are split into root keywords
/// and `properties`.
pub fn sanitize_schema_structure(
    raw_schema_content: &str,
    include_schema_metadata: bool,
) -> Result<String> {
    if raw_schema_content.trim().is_empty() {
        return Err(PantheonError::SchemaCompile(
            "schema content cannot be empty".into(),
        ));
    }

    if raw_schema_content.contains("std.") || raw_schema_content.contains("function(") {
        debug!("schema content contains jsonnet functions, skipping sanitization");
        return Ok(raw_schema_content.to_owned());
    }

    let parsed: JsonValue = serde_json::from_str(raw_schema_content)
        .map_err(|err| PantheonError::SchemaCompile(format!("invalid JSON in schema: {err}")))?;
    let Some(content) = parsed.as_object() else {
        return Err(PantheonError::SchemaCompile(
            "schema content must be a JSON object".into(),
        ));
    };

    let has_schema = content.contains_key("$schema");
    let has_type = content.get("type").and_then(JsonValue::as_str) == Some("object");
    let has_properties = content.contains_key("properties");

    if has_schema && has_type && has_properties {
        if include_schema_metadata {
            return Ok(raw_schema_content.to_owned());
        }
        let mut stripped = content.clone();
        stripped.remove("$schema");
        return dump(&stripped);
    }

    if has_properties {
        let mut wrapped = JsonMap::new();
        wrapped.insert("type".into(), JsonValue::String("object".into()));
        if include_schema_metadata {
            wrapped.insert("$schema".into(), JsonValue::String(DRAFT07_MARKER.into()));
        }
        for (key, value) in content {
            if key == "$schema" && !include_schema_metadata {
                continue;
            }
            wrapped.insert(key.clone(), value.clone());
        }
        return dump(&wrapped);
    }

    // No properties at all: treat non-keyword fields as the properties.
    let mut root_fields = JsonMap::new();
    let mut property_fields = JsonMap::new();
    for (key, value) in content {
        if ROOT_SCHEMA_FIELDS.contains(&key.as_str()) {
            root_fields.insert(key.clone(), value.clone());
        } else {
            property_fields.insert(key.clone(), value.clone());
        }
    }

    let mut wrapped = JsonMap::new();
    wrapped.insert("type".into(), JsonValue::String("object".into()));
    if include_schema_metadata {
        wrapped.insert("$schema".into(), JsonValue::String(DRAFT07_MARKER.into()));
    } else {
        root_fields.remove("$schema");
    }
    for (key, value) in root_fields {
        wrapped.insert(key, value);
    }
    if !property_fields.is_empty() {
        wrapped.insert("properties".into(), JsonValue::Object(property_fields));
    }

    dump(&wrapped)
}

fn dump(map: &JsonMap<String, JsonValue>) -> Result<String> {
    serde_json::to_string_pretty(&JsonValue::Object(map.clone()))
        .map_err(|err| PantheonError::SchemaCompile(err.to_string()))
}

/// Validates data against a draft 2020-12 JSON-Schema, aggregating every
/// failure with its field path, constraint path, and offending value.
pub(crate) fn validate_impl(data: &JsonValue, schema: &JsonValue) -> Result<()> {
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .map_err(|err| PantheonError::SchemaValidation(format!("invalid schema: {err}")))?;

    if validator.is_valid(data) {
        return Ok(());
    }

    let mut details = Vec::new();
    for error in validator.iter_errors(data) {
        let field_path = pointer_to_dotted(&error.instance_path.to_string());
        let mut message = format!("Field '{field_path}': {error}");

        let constraint = pointer_to_dotted(&error.schema_path.to_string());
        if constraint != "root" {
            message.push_str(&format!(" (schema constraint: {constraint})"));
        }

        match &*error.instance {
            JsonValue::String(s) => message.push_str(&format!(" [current value: {s}]")),
            JsonValue::Number(n) => message.push_str(&format!(" [current value: {n}]")),
            JsonValue::Bool(b) => message.push_str(&format!(" [current value: {b}]")),
            JsonValue::Array(_) => message.push_str(" [current value type: array]"),
            JsonValue::Object(_) => message.push_str(" [current value type: object]"),
            JsonValue::Null => {}
        }

        details.push(format!("  - {message}"));
    }

    Err(PantheonError::SchemaValidation(details.join("\n")))
}

fn pointer_to_dotted(pointer: &str) -> String {
    let trimmed = pointer.trim_start_matches('/');
    if trimmed.is_empty() {
        return "root".to_owned();
    }
    trimmed.replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_passes_complete_schema_through() {
        let schema = serde_json::json!({
            "$schema": DRAFT07_MARKER,
            "type": "object",
            "properties": {"name": {"type": "string"}}
        });
        let raw = serde_json::to_string_pretty(&schema).unwrap();

        let sanitized = sanitize_schema_structure(&raw, true).unwrap();
        assert_eq!(sanitized, raw);

        let stripped: JsonValue =
            serde_json::from_str(&sanitize_schema_structure(&raw, false).unwrap()).unwrap();
        assert!(stripped.get("$schema").is_none());
        assert_eq!(stripped["type"], "object");
    }

    #[test]
    fn sanitize_wraps_properties_without_metadata() {
        let raw = r#"{"properties": {"name": {"type": "string"}}, "required": ["name"]}"#;
        let sanitized: JsonValue =
            serde_json::from_str(&sanitize_schema_structure(raw, true).unwrap()).unwrap();

        assert_eq!(sanitized["type"], "object");
        assert_eq!(sanitized["$schema"], DRAFT07_MARKER);
        assert_eq!(sanitized["properties"]["name"]["type"], "string");
        assert_eq!(sanitized["required"][0], "name");
    }

    #[test]
    fn sanitize_splits_bare_property_maps() {
        let raw = r#"{"title": "Ticket", "name": {"type": "string"}, "priority": {"type": "string"}}"#;
        let sanitized: JsonValue =
            serde_json::from_str(&sanitize_schema_structure(raw, true).unwrap()).unwrap();

        assert_eq!(sanitized["type"], "object");
        assert_eq!(sanitized["title"], "Ticket");
        assert!(sanitized["properties"]["name"].is_object());
        assert!(sanitized["properties"]["priority"].is_object());
        assert!(sanitized.get("name").is_none());
    }

    #[test]
    fn sanitize_leaves_jsonnet_alone() {
        let raw = "{ field: std.extVar('x') }";
        assert_eq!(sanitize_schema_structure(raw, true).unwrap(), raw);
    }

    #[test]
    fn sanitize_rejects_non_objects() {
        assert!(sanitize_schema_structure("[1, 2]", true).is_err());
        assert!(sanitize_schema_structure("not json", true).is_err());
        assert!(sanitize_schema_structure("  ", true).is_err());
    }

    #[test]
    fn profile_externals_split_strings_and_codes() {
        let profile = serde_json::json!({
            "active_profile": "dev",
            "profiles": {
                "dev": {"verbosity": "high", "max_items": 5, "flags": {"strict": true}}
            }
        });
        let (ext_vars, ext_codes) = profile_externals(&profile).unwrap();

        assert!(ext_vars.contains(&("verbosity".into(), "high".into())));
        assert!(ext_codes.contains(&("max_items".into(), "5".into())));
        assert!(
            ext_codes
                .iter()
                .any(|(key, code)| key == "flags" && code.contains("strict"))
        );
    }

    #[test]
    fn profile_externals_reject_missing_profile() {
        let profile = serde_json::json!({
            "active_profile": "missing",
            "profiles": {"dev": {}}
        });
        assert!(profile_externals(&profile).is_err());
    }

    #[test]
    fn validate_accepts_conforming_data() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {"title": {"type": "string"}},
            "required": ["title"]
        });
        validate_impl(&serde_json::json!({"title": "ok"}), &schema).unwrap();
    }

    #[test]
    fn validate_reports_every_failure_with_paths() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "count": {"type": "integer"}
            },
            "required": ["title", "count"]
        });

        let err = validate_impl(
            &serde_json::json!({"title": 7, "count": "three"}),
            &schema,
        )
        .unwrap_err();
        let message = err.to_string();

        assert!(message.contains("Field 'title'"));
        assert!(message.contains("Field 'count'"));
        assert!(message.contains("current value"));
    }

    #[test]
    fn validate_reports_root_for_top_level_failures() {
        let schema = serde_json::json!({
            "type": "object",
            "required": ["name"]
        });
        let err = validate_impl(&serde_json::json!({}), &schema).unwrap_err();
        assert!(err.to_string().contains("Field 'root'"));
    }
}
