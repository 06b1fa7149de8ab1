//! Custom template filters registered in every rendering environment.

use minijinja::{Environment, Error, ErrorKind, Value};
use serde_json::Value as JsonValue;

/// Registers the framework filters on an environment.
pub fn register(env: &mut Environment<'_>) {
    env.add_filter("slugify", slugify);
    env.add_filter("remove_suffix", remove_suffix);
    env.add_filter("to_yaml", to_yaml);
}

/// Lowercases, maps whitespace/underscores to hyphens, drops everything
/// outside `[a-z0-9-]`, collapses repeats, and trims hyphens.
///
/// `slugify("Fix Bug")` is `fix-bug`; `slugify("My_Title 123")` is
/// `my-title-123`.
pub fn slugify(value: Value) -> String {
    let text = match value.as_str() {
        Some(text) => text.to_owned(),
        None => value.to_string(),
    };

    let mut slug = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        if c.is_whitespace() || c == '_' || c == '-' {
            if !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
        }
    }

    slug.trim_matches('-').to_owned()
}

/// Removes the first matching suffix. `suffix` may be a string or a
/// sequence of strings; empty suffixes are skipped; non-string inputs are
/// coerced to strings.
pub fn remove_suffix(value: Value, suffix: Value, ignore_case: Option<bool>) -> String {
    let text = match value.as_str() {
        Some(text) => text.to_owned(),
        None => value.to_string(),
    };

    let suffixes: Vec<String> = if let Some(single) = suffix.as_str() {
        vec![single.to_owned()]
    } else if let Ok(items) = suffix.try_iter() {
        items
            .map(|item| match item.as_str() {
                Some(s) => s.to_owned(),
                None => item.to_string(),
            })
            .collect()
    } else {
        vec![suffix.to_string()]
    };

    let ignore_case = ignore_case.unwrap_or(false);

    for suf in suffixes {
        if suf.is_empty() || suf.len() > text.len() {
            continue;
        }

        let matched = if ignore_case {
            text.to_lowercase().ends_with(&suf.to_lowercase())
        } else {
            text.ends_with(&suf)
        };

        if matched {
            if let Some(stripped) = text.get(..text.len() - suf.len()) {
                return stripped.to_owned();
            }
        }
    }

    text
}

/// Serializes a value to YAML. Mappings carrying a `property_definitions`
/// sub-mapping get a comment header documenting each property, and the
/// `property_definitions` key itself is excluded from the output.
pub fn to_yaml(value: Value) -> Result<String, Error> {
    let json: JsonValue = serde_json::to_value(&value).map_err(|err| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("to_yaml could not serialize value: {err}"),
        )
    })?;

    let Some(map) = json.as_object() else {
        return dump_yaml(&json);
    };

    let Some(definitions) = map.get("property_definitions").and_then(JsonValue::as_object)
    else {
        return dump_yaml(&json);
    };

    let header = documentation_header(definitions);

    let filtered: serde_json::Map<String, JsonValue> = map
        .iter()
        .filter(|(key, _)| key.as_str() != "property_definitions")
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let body = dump_yaml(&JsonValue::Object(filtered))?;

    if header.is_empty() {
        return Ok(body);
    }

    let annotated: Vec<String> = body
        .lines()
        .map(|line| annotate_documented_key(line, definitions))
        .collect();

    Ok(format!("{header}\n\n{}", annotated.join("\n")))
}

fn dump_yaml(value: &JsonValue) -> Result<String, Error> {
    serde_yaml::to_string(value).map_err(|err| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("to_yaml serialization failed: {err}"),
        )
    })
}

fn documentation_header(definitions: &serde_json::Map<String, JsonValue>) -> String {
    if definitions.is_empty() {
        return String::new();
    }

    let mut lines = vec!["# Profile Properties Documentation:".to_owned(), "#".to_owned()];

    for (name, definition) in definitions {
        let Some(definition) = definition.as_object() else {
            continue;
        };

        lines.push(format!("# {name}:"));

        if let Some(description) = definition.get("description").and_then(JsonValue::as_str) {
            let description = description.strip_prefix("Example: ").unwrap_or(description);
            lines.push(format!("#   Description: {description}"));
        }

        let prop_type = definition
            .get("type")
            .and_then(JsonValue::as_str)
            .unwrap_or("unknown");
        if prop_type == "boolean" {
            lines.push(format!("#   Type: {prop_type} (true/false)"));
        } else {
            lines.push(format!("#   Type: {prop_type}"));
        }

        if let Some(options) = definition.get("enum").and_then(JsonValue::as_array) {
            let rendered: Vec<String> = options.iter().map(json_scalar_to_string).collect();
            lines.push(format!("#   Options: {}", rendered.join(", ")));
        }

        lines.push("#".to_owned());
    }

    lines.join("\n")
}

fn annotate_documented_key(
    line: &str,
    definitions: &serde_json::Map<String, JsonValue>,
) -> String {
    let stripped = line.trim();
    if stripped.is_empty() || !stripped.contains(':') {
        return line.to_owned();
    }
    // Only top-level keys are annotated.
    if line.starts_with(' ') || line.starts_with('\t') {
        return line.to_owned();
    }

    let key = stripped.split(':').next().unwrap_or("").trim();
    if key.starts_with("- ") || key.starts_with('#') {
        return line.to_owned();
    }

    if definitions.contains_key(key) {
        format!("{line}  # {key} (documented above)")
    } else {
        line.to_owned()
    }
}

fn json_scalar_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
