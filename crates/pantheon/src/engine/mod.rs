//! Pure computational core for artifact generation and location.
//!
//! The engine compiles schemas, validates inputs, renders templates, and
//! produces [`PantheonPath`] outputs. It never writes: the workspace
//! reference is used only to read process assets and to query the sandbox.

pub mod filters;
mod locate;
pub mod render;
mod schema;
mod sections;

use std::collections::BTreeMap;
use std::sync::Arc;

use minijinja::Environment;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{debug, warn};

pub use render::TemplateContext;
pub(crate) use sections::replace_section;

use crate::constants::{BUILTIN_ARTIFACT_ID, BUILTIN_PROCESS};
use crate::error::{PantheonError, Result};
use crate::id_counter::ArtifactIdCounter;
use crate::jsonnet;
use crate::path::PantheonPath;
use crate::workspace::PantheonWorkspace;

/// Operation families, detected from the set of supplied template keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Create,
    Retrieve,
    Update,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Retrieve => "RETRIEVE",
            Self::Update => "UPDATE",
        }
    }
}

/// The framework's single expert on artifact and directory conventions.
pub struct ArtifactEngine {
    workspace: Arc<PantheonWorkspace>,
    artifact_id: ArtifactIdCounter,
}

impl ArtifactEngine {
    pub fn new(workspace: Arc<PantheonWorkspace>) -> Self {
        let artifact_id = ArtifactIdCounter::new(Arc::clone(&workspace));
        Self {
            workspace,
            artifact_id,
        }
    }

    pub(crate) fn workspace(&self) -> &PantheonWorkspace {
        self.workspace.as_ref()
    }

    /// Determines the operation type from the supplied template keys.
    pub fn detect_operation_type(
        &self,
        templates: &BTreeMap<String, String>,
    ) -> Result<OperationType> {
        let has = |keys: &[&str]| keys.iter().all(|key| templates.contains_key(*key));

        if has(&["content", "placement", "naming"]) {
            return Ok(OperationType::Create);
        }
        if has(&["patch", "locator", "parser", "target"]) {
            return Ok(OperationType::Update);
        }
        if has(&["locator", "parser", "sections"]) {
            return Ok(OperationType::Retrieve);
        }

        let available = templates.keys().cloned().collect::<Vec<_>>().join(", ");
        Err(PantheonError::OperationDetect(format!(
            "{available}. Expected CREATE (content+placement+naming), \
             RETRIEVE (locator+parser+sections), or UPDATE (patch+locator+parser+target)"
        )))
    }

    /// Compiles a Jsonnet schema with profile context injection and
    /// sanitizes the result into a proper JSON-Schema object.
    pub fn compile_schema(
        &self,
        schema_content: &str,
        profile: &JsonValue,
        process_name: Option<&str>,
        include_schema_metadata: bool,
    ) -> Result<JsonValue> {
        schema::compile_schema_impl(
            self.workspace(),
            schema_content,
            profile,
            process_name,
            include_schema_metadata,
        )
    }

    /// Validates input data against a compiled JSON-Schema.
    pub fn validate(&self, input_data: &JsonValue, schema: &JsonValue) -> Result<()> {
        schema::validate_impl(input_data, schema)
    }

    /// Builds the template context: input parameters, the raw inputs under
    /// `input_data`, framework variables, and — for CREATE only — a fresh
    /// `pantheon_artifact_id` (null when the counter fails).
    pub fn create_template_context(
        &self,
        input_params: &JsonMap<String, JsonValue>,
        framework_params: &JsonMap<String, JsonValue>,
        operation: Option<OperationType>,
    ) -> TemplateContext {
        let mut context = input_params.clone();
        context.insert(
            "input_data".to_owned(),
            JsonValue::Object(input_params.clone()),
        );
        for (key, value) in framework_params {
            context.insert(key.clone(), value.clone());
        }

        if operation == Some(OperationType::Create) {
            let process = framework_params
                .get(BUILTIN_PROCESS)
                .and_then(JsonValue::as_str);
            match process {
                Some(process) => match self.artifact_id.get_next(process) {
                    Ok(next) => {
                        debug!(process, artifact_id = next, "assigned artifact id");
                        context.insert(BUILTIN_ARTIFACT_ID.to_owned(), JsonValue::from(next));
                    }
                    Err(err) => {
                        warn!(process, %err, "failed to assign artifact id");
                        context.insert(BUILTIN_ARTIFACT_ID.to_owned(), JsonValue::Null);
                    }
                },
                None => {
                    debug!("no process in framework params, skipping artifact id");
                }
            }
        }

        context
    }

    /// Renders content, placement, and naming templates into the artifact
    /// body and its sandbox-relative target path.
    pub fn generate_artifact(
        &self,
        templates: &BTreeMap<String, String>,
        input_params: &JsonMap<String, JsonValue>,
        framework_params: &JsonMap<String, JsonValue>,
    ) -> Result<(String, PantheonPath)> {
        for key in ["content", "placement", "naming"] {
            if !templates.contains_key(key) {
                return Err(PantheonError::MissingTemplateKey(key.to_owned()));
            }
        }

        let context =
            self.create_template_context(input_params, framework_params, Some(OperationType::Create));

        let has_process = framework_params
            .get(BUILTIN_PROCESS)
            .and_then(JsonValue::as_str)
            .is_some();
        let content = if has_process {
            let env = self.artifact_environment();
            render::render_with_environment(&env, &templates["content"], &context, "content.md")?
        } else {
            render::render_template(&templates["content"], &context, "content.md")?
        };

        let placement =
            render::render_template(&templates["placement"], &context, "placement.jinja")?;
        let placement = placement.trim();
        let naming = render::render_template(&templates["naming"], &context, "naming.jinja")?;
        let naming = naming.trim();

        let target_path = if placement.is_empty() {
            PantheonPath::new(naming)?
        } else {
            PantheonPath::from_segments([placement, naming])?
        };

        Ok((content, target_path))
    }

    /// Renders the JSONL placement and naming templates into a sidecar path.
    pub fn generate_jsonl_path(
        &self,
        templates: &BTreeMap<String, String>,
        input_params: &JsonMap<String, JsonValue>,
        framework_params: &JsonMap<String, JsonValue>,
    ) -> Result<PantheonPath> {
        for key in ["jsonl_placement", "jsonl_naming"] {
            if !templates.contains_key(key) {
                return Err(PantheonError::MissingTemplateKey(key.to_owned()));
            }
        }

        let context =
            self.create_template_context(input_params, framework_params, Some(OperationType::Create));

        let placement = render::render_template(
            &templates["jsonl_placement"],
            &context,
            "jsonl_placement.jinja",
        )?;
        let placement = placement.trim();
        let naming =
            render::render_template(&templates["jsonl_naming"], &context, "jsonl_naming.jinja")?;
        let naming = naming.trim();

        if placement.is_empty() {
            PantheonPath::new(naming)
        } else {
            PantheonPath::from_segments([placement, naming])
        }
    }

    /// Environment with the semantic-URI loader chain for content templates.
    pub fn artifact_environment(&self) -> Environment<'static> {
        render::artifact_environment(&self.workspace)
    }

    /// Renders a template with the basic environment (no includes).
    pub fn render_template(
        &self,
        template_str: &str,
        context: &TemplateContext,
        template_name: &str,
    ) -> Result<String> {
        render::render_template(template_str, context, template_name)
    }

    /// Renders a template with a caller-supplied environment.
    pub fn render_artifact_template(
        &self,
        template_str: &str,
        context: &TemplateContext,
        env: &Environment<'_>,
        template_name: &str,
    ) -> Result<String> {
        render::render_with_environment(env, template_str, context, template_name)
    }

    /// Locates an artifact for a process.
    ///
    /// With a parser present the ID is required and normalized first; in
    /// singleton mode any provided ID is ignored and exactly one artifact
    /// must match. Never fails: ambiguity and absence both yield `None`.
    pub fn find_artifact(
        &self,
        process_name: &str,
        artifact_id: Option<&str>,
    ) -> Option<PantheonPath> {
        debug!(process = process_name, artifact_id = artifact_id.unwrap_or(""), "finding artifact");

        if self.workspace().has_artifact_parser(process_name) {
            let Some(artifact_id) = artifact_id.filter(|id| !id.is_empty()) else {
                warn!(
                    process = process_name,
                    "artifact_id required for multi-artifact process"
                );
                return None;
            };

            let canonical_id = self.normalize_id(process_name, artifact_id);
            if canonical_id.is_empty() {
                warn!(process = process_name, fuzzy = artifact_id, "failed to normalize artifact id");
                return None;
            }
            self.locate_artifact(process_name, &canonical_id)
        } else {
            debug!(process = process_name, "singleton mode (no parser.jsonnet)");
            self.locate_singleton_artifact(process_name)
        }
    }
}

/// Compiles Jsonnet content and extracts the value at `data_path`.
///
/// Paths are dot-notation with numeric components indexing into arrays.
/// WYSIWYG: when the direct path misses and the compiled result carries a
/// top-level `properties` wrapper, the lookup retries inside it. Failure
/// enumerates the available paths (to depth 3).
pub fn resolve_uri_data(
    jsonnet_content: &str,
    data_path: &str,
    ext_vars: &[(String, String)],
) -> Result<JsonValue> {
    let compiled = jsonnet::evaluate(jsonnet_content, "snippet", ext_vars, &[])?;

    if data_path.is_empty() {
        return Ok(compiled);
    }

    if let Some(found) = extract_path(&compiled, data_path) {
        return Ok(found.clone());
    }

    if !data_path.starts_with("properties.") {
        if let Some(properties) = compiled.get("properties") {
            if let Some(found) = extract_path(properties, data_path) {
                return Ok(found.clone());
            }
        }
    }

    let available = available_paths(&compiled, "", 3);
    Err(PantheonError::NotFound(format!(
        "data path '{data_path}' not found in compiled result; available paths: {}",
        available.join(", ")
    )))
}

pub(crate) fn extract_path<'a>(data: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = data;
    for part in path.split('.') {
        current = if part.chars().all(|c| c.is_ascii_digit()) && !part.is_empty() {
            current.get(part.parse::<usize>().ok()?)?
        } else {
            current.get(part)?
        };
    }
    Some(current)
}

fn available_paths(data: &JsonValue, prefix: &str, max_depth: usize) -> Vec<String> {
    if max_depth == 0 {
        return Vec::new();
    }

    let mut paths = Vec::new();
    let mut visit = |key: String, value: &JsonValue| {
        let current = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        paths.push(current.clone());
        if value.is_object() || value.is_array() {
            paths.extend(available_paths(value, &current, max_depth - 1));
        }
    };

    match data {
        JsonValue::Object(map) => {
            for (key, value) in map {
                visit(key.clone(), value);
            }
        }
        JsonValue::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                visit(index.to_string(), value);
            }
        }
        _ => {}
    }

    paths
}
