//! Top-level orchestration of the four process operations.
//!
//! The handler wires the workspace and engine together: it supplies
//! framework template variables, compiles and enforces schemas, persists
//! rendered artifacts, writes JSONL sidecars, and drives BUILD scaffolding.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Local;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{debug, warn};

use crate::constants::{BUILTIN_ACTOR, BUILTIN_DATESTAMP, BUILTIN_PROCESS, BUILTIN_TIMESTAMP};
use crate::engine::{self, ArtifactEngine, OperationType, TemplateContext};
use crate::error::{PantheonError, Result};
use crate::jsonnet;
use crate::path::PantheonPath;
use crate::workspace::{CreatedFileSummary, PantheonWorkspace};

/// Variable injected during UPDATE so patch templates can include the
/// per-section template they are rewriting.
const SECTION_VAR: &str = "pantheon_section";

const SECTION_PLACEHOLDER_MARKER: &str = "<!-- SECTION:PLACEHOLDER -->";

/// Result of a CREATE execution.
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub artifact_path: PantheonPath,
    pub jsonl_path: Option<PantheonPath>,
    pub created: Vec<CreatedFileSummary>,
}

/// Result of an UPDATE execution.
#[derive(Debug, Clone)]
pub struct UpdateOutcome {
    pub artifact_path: PantheonPath,
    pub sections_updated: Vec<String>,
}

/// Result of a BUILD execution.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub bundle_root: PantheonPath,
    pub created: Vec<CreatedFileSummary>,
}

pub struct ProcessHandler {
    workspace: Arc<PantheonWorkspace>,
    engine: ArtifactEngine,
}

impl ProcessHandler {
    pub fn new(workspace: Arc<PantheonWorkspace>) -> Self {
        let engine = ArtifactEngine::new(Arc::clone(&workspace));
        Self { workspace, engine }
    }

    pub fn engine(&self) -> &ArtifactEngine {
        &self.engine
    }

    pub fn workspace(&self) -> &PantheonWorkspace {
        self.workspace.as_ref()
    }

    /// Loads the team profile bundle, tolerating a missing file.
    fn load_profile(&self) -> Result<JsonValue> {
        match self.workspace.get_team_profile() {
            Ok(raw) => serde_yaml::from_str(&raw).map_err(|err| {
                PantheonError::InvalidConfig(format!("invalid team-profile.yaml: {err}"))
            }),
            Err(PantheonError::NotFound(_)) => Ok(JsonValue::Object(JsonMap::new())),
            Err(err) => Err(err),
        }
    }

    /// Fills in timestamp and datestamp when the caller did not supply them.
    fn with_framework_defaults(
        &self,
        framework_params: &JsonMap<String, JsonValue>,
    ) -> JsonMap<String, JsonValue> {
        let mut params = framework_params.clone();
        let now = Local::now();
        params
            .entry(BUILTIN_TIMESTAMP.to_owned())
            .or_insert_with(|| {
                JsonValue::String(now.format("%Y-%m-%d %I:%M %p %Z").to_string())
            });
        params
            .entry(BUILTIN_DATESTAMP.to_owned())
            .or_insert_with(|| JsonValue::String(now.format("%Y-%m-%d %Z").to_string()));
        params
    }

    fn require_process<'a>(framework_params: &'a JsonMap<String, JsonValue>) -> Result<&'a str> {
        framework_params
            .get(BUILTIN_PROCESS)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PantheonError::InvalidConfig(format!(
                    "framework parameters must include {BUILTIN_PROCESS}"
                ))
            })
    }

    /// CREATE: validate inputs against the process schema, render the
    /// artifact, persist it, and append the optional JSONL sidecar entry.
    pub fn execute_create_process(
        &self,
        input_params: &JsonMap<String, JsonValue>,
        framework_params: &JsonMap<String, JsonValue>,
        templates: &BTreeMap<String, String>,
    ) -> Result<CreateOutcome> {
        let framework_params = self.with_framework_defaults(framework_params);
        let process = Self::require_process(&framework_params)?;

        let schema_content = self.workspace.get_process_schema(process)?;
        let profile = self.load_profile()?;
        let schema = self
            .engine
            .compile_schema(&schema_content, &profile, Some(process), true)?;
        self.engine
            .validate(&JsonValue::Object(input_params.clone()), &schema)?;

        let (content, target_path) =
            self.engine
                .generate_artifact(templates, input_params, &framework_params)?;
        let saved = self.workspace.save_artifact(&content, &target_path)?;
        let mut created = vec![saved.clone()];

        let jsonl_path = if self.workspace.has_jsonl_templates(process) {
            match self.append_jsonl_sidecar(process, input_params, &framework_params, templates) {
                Ok(path) => {
                    created.push(path.clone());
                    Some(path)
                }
                Err(err) => {
                    // Sidecar problems never fail the CREATE itself.
                    warn!(process, %err, "failed to write JSONL sidecar entry");
                    None
                }
            }
        } else {
            None
        };

        Ok(CreateOutcome {
            artifact_path: saved,
            jsonl_path,
            created: self.workspace.summarize_created_files(&created),
        })
    }

    fn append_jsonl_sidecar(
        &self,
        process: &str,
        input_params: &JsonMap<String, JsonValue>,
        framework_params: &JsonMap<String, JsonValue>,
        templates: &BTreeMap<String, String>,
    ) -> Result<PantheonPath> {
        let mut jsonl_templates = templates.clone();
        if !jsonl_templates.contains_key("jsonl_placement") {
            jsonl_templates.insert(
                "jsonl_placement".to_owned(),
                self.workspace.get_artifact_jsonl_directory_template(process)?,
            );
        }
        if !jsonl_templates.contains_key("jsonl_naming") {
            jsonl_templates.insert(
                "jsonl_naming".to_owned(),
                self.workspace.get_artifact_jsonl_filename_template(process)?,
            );
        }

        let jsonl_path =
            self.engine
                .generate_jsonl_path(&jsonl_templates, input_params, framework_params)?;

        let mut record = input_params.clone();
        if let Some(timestamp) = framework_params.get(BUILTIN_TIMESTAMP) {
            record.insert("timestamp".to_owned(), timestamp.clone());
        }

        self.workspace
            .append_jsonl_entry(&JsonValue::Object(record), &jsonl_path)
    }

    /// RETRIEVE: locate the artifact and return its requested sections.
    pub fn execute_retrieve_process(
        &self,
        process: &str,
        artifact_id: Option<&str>,
        section_names: &[String],
    ) -> Result<BTreeMap<String, String>> {
        let found = self
            .engine
            .find_artifact(process, artifact_id)
            .ok_or_else(|| {
                PantheonError::NotFound(format!(
                    "no artifact found for process '{process}'{}",
                    artifact_id
                        .map(|id| format!(" and id '{id}'"))
                        .unwrap_or_default()
                ))
            })?;

        Ok(self.engine.get_artifact_sections(process, &found, section_names))
    }

    /// UPDATE: locate the artifact, validate the patch inputs, render the
    /// patch template, and splice it between the target markers.
    pub fn execute_update_process(
        &self,
        process: &str,
        artifact_id: Option<&str>,
        patch_inputs: &JsonMap<String, JsonValue>,
        framework_params: &JsonMap<String, JsonValue>,
        section_names: &[String],
    ) -> Result<UpdateOutcome> {
        let framework_params = self.with_framework_defaults(framework_params);

        let found = self
            .engine
            .find_artifact(process, artifact_id)
            .ok_or_else(|| {
                PantheonError::NotFound(format!(
                    "no artifact found for process '{process}'{}",
                    artifact_id
                        .map(|id| format!(" and id '{id}'"))
                        .unwrap_or_default()
                ))
            })?;

        let schema_content = self.workspace.get_process_schema(process)?;
        let profile = self.load_profile()?;
        let schema = self
            .engine
            .compile_schema(&schema_content, &profile, Some(process), true)?;
        self.engine
            .validate(&JsonValue::Object(patch_inputs.clone()), &schema)?;

        let target_content = self.workspace.get_artifact_target_section(process)?;
        let target = jsonnet::evaluate(&target_content, "target.jsonnet", &[], &[])?;
        let target = target.as_object().ok_or_else(|| {
            PantheonError::InvalidConfig(format!(
                "target configuration for '{process}' must be an object"
            ))
        })?;

        let patch_template = self.workspace.get_artifact_patch_template(process)?;
        let mut content = self.workspace.read_artifact_file(&found)?;
        let env = self.engine.artifact_environment();

        let mut context = self.engine.create_template_context(
            patch_inputs,
            &framework_params,
            Some(OperationType::Update),
        );

        let mut sections_updated = Vec::new();

        if let Some(sections) = target.get("sections").and_then(JsonValue::as_object) {
            // Named targets: patch the requested sections, or all of them.
            let selected: Vec<String> = if section_names.is_empty() {
                sections.keys().cloned().collect()
            } else {
                section_names.to_vec()
            };

            for name in selected {
                let Some(bounds) = sections.get(&name).and_then(JsonValue::as_object) else {
                    return Err(PantheonError::MissingSection {
                        section: name,
                        file: found.to_string(),
                    });
                };
                let start = bounds.get("start").and_then(JsonValue::as_str).unwrap_or("");
                let end = bounds.get("end").and_then(JsonValue::as_str).unwrap_or("");

                context.insert(SECTION_VAR.to_owned(), JsonValue::String(name.clone()));
                let body = self.engine.render_artifact_template(
                    &patch_template,
                    &context,
                    &env,
                    "patch.md",
                )?;

                content = engine::replace_section(&content, start, end, &body).ok_or_else(
                    || PantheonError::MissingSection {
                        section: name.clone(),
                        file: found.to_string(),
                    },
                )?;
                sections_updated.push(name);
            }
        } else if target.contains_key("section_start") && target.contains_key("section_end") {
            let start_template = target
                .get("section_start")
                .and_then(JsonValue::as_str)
                .unwrap_or("");
            let end_template = target
                .get("section_end")
                .and_then(JsonValue::as_str)
                .unwrap_or("");

            // Marker templates with `{name}` address a family of sections
            // and need explicit names; concrete markers patch one span.
            let interpolated = start_template.contains("{name}") || end_template.contains("{name}");
            let selected: Vec<Option<String>> = if interpolated {
                if section_names.is_empty() {
                    return Err(PantheonError::MissingSection {
                        section: "<unspecified>".into(),
                        file: found.to_string(),
                    });
                }
                section_names.iter().cloned().map(Some).collect()
            } else {
                vec![None]
            };

            for name in selected {
                let (start, end, label) = match &name {
                    Some(name) => (
                        start_template.replace("{name}", name),
                        end_template.replace("{name}", name),
                        name.clone(),
                    ),
                    None => (
                        start_template.to_owned(),
                        end_template.to_owned(),
                        "content".to_owned(),
                    ),
                };

                if let Some(name) = &name {
                    context.insert(SECTION_VAR.to_owned(), JsonValue::String(name.clone()));
                }
                let body = self.engine.render_artifact_template(
                    &patch_template,
                    &context,
                    &env,
                    "patch.md",
                )?;

                content = engine::replace_section(&content, &start, &end, &body).ok_or_else(
                    || PantheonError::MissingSection {
                        section: label.clone(),
                        file: found.to_string(),
                    },
                )?;
                sections_updated.push(label);
            }
        } else {
            // No recognizable target shape: the patch replaces the body.
            content = self.engine.render_artifact_template(
                &patch_template,
                &context,
                &env,
                "patch.md",
            )?;
            sections_updated.push("content".to_owned());
        }

        let saved = self.workspace.save_artifact(&content, &found)?;
        Ok(UpdateOutcome {
            artifact_path: saved,
            sections_updated,
        })
    }

    /// BUILD: validate the build spec against the process's build schema
    /// and scaffold the CREATE/GET/UPDATE process family under the bundle
    /// directory.
    pub fn execute_build_process(
        &self,
        process: &str,
        build_spec: &JsonMap<String, JsonValue>,
        framework_params: &JsonMap<String, JsonValue>,
    ) -> Result<BuildOutcome> {
        let framework_params = self.with_framework_defaults(framework_params);

        let build_schema_content = self.workspace.get_build_schema(process)?;
        let profile = self.load_profile()?;
        let schema = self
            .engine
            .compile_schema(&build_schema_content, &profile, None, true)?;
        self.engine
            .validate(&JsonValue::Object(build_spec.clone()), &schema)?;

        let spec = BuildSpec::from_map(build_spec)?;

        let context =
            self.engine
                .create_template_context(build_spec, &framework_params, None);

        let bundle_base = match self.workspace.get_process_directory_template(process) {
            Ok(template) => {
                let rendered = self
                    .engine
                    .render_template(&template, &context, "directory.jinja")?;
                rendered.trim().to_owned()
            }
            Err(PantheonError::NotFound(_)) => {
                format!("pantheon-team-builds/{}", spec.target_team)
            }
            Err(err) => return Err(err),
        };
        let bundle_root = PantheonPath::new(&bundle_base)?.join("processes")?;

        debug!(bundle = %bundle_root, artifact = spec.artifact.as_str(), "scaffolding process family");

        let mut routine_params = TemplateContext::new();
        routine_params.insert("artifact".into(), JsonValue::String(spec.artifact.clone()));
        routine_params.insert(
            "target_team".into(),
            JsonValue::String(spec.target_team.clone()),
        );
        if let Some(actor) = framework_params.get(BUILTIN_ACTOR) {
            routine_params.insert(BUILTIN_ACTOR.to_owned(), actor.clone());
        }

        let mut written: Vec<PantheonPath> = Vec::new();

        let update_process = format!("update-{}", spec.artifact);
        let create_process = format!("create-{}", spec.artifact);
        let get_process = format!("get-{}", spec.artifact);

        let locator_jsonnet = spec.locator_jsonnet();
        let parser_jsonnet = default_parser_rules();

        if spec.sections.len() <= 1 {
            // Single-section artifact: no markers, the document is the
            // section, and the patch rewrites the whole body.
            let section = spec.sections.first();
            let template = section.map(|s| s.template.as_str()).unwrap_or("");
            let schema_json = section
                .map(|s| s.schema_jsonnet())
                .transpose()?
                .unwrap_or_else(|| "{}".to_owned());

            written.extend(self.workspace.scaffold_create_process(
                &bundle_root,
                &create_process,
                template,
                &spec.placement,
                &spec.naming,
                &schema_json,
                spec.permissions_for("create").as_deref(),
                spec.include_default_routine,
                Some(&routine_params),
            )?);

            written.extend(self.workspace.scaffold_get_process(
                &bundle_root,
                &get_process,
                None,
                &locator_jsonnet,
                &parser_jsonnet,
                spec.permissions_for("get").as_deref(),
                spec.include_default_routine,
                Some(&routine_params),
            )?);

            written.extend(self.workspace.scaffold_update_process(
                &bundle_root,
                &update_process,
                None,
                &locator_jsonnet,
                &parser_jsonnet,
                template,
                &schema_json,
                spec.permissions_for("update").as_deref(),
                spec.include_default_routine,
                Some(&routine_params),
            )?);
        } else {
            // Multi-section artifact: per-section templates and schemas
            // live under the UPDATE process and are shared through
            // semantic URIs.
            let update_root = bundle_root.join(&update_process)?;
            for section in &spec.sections {
                let section_dir = update_root.join("artifact")?.join("sections")?;
                written.push(self.workspace.save_artifact(
                    &section.template,
                    &section_dir.join(format!("{}.md", section.name))?,
                )?);
                written.push(self.workspace.save_artifact(
                    &section.schema_jsonnet()?,
                    &section_dir.join(format!("{}.schema.jsonnet", section.name))?,
                )?);
            }

            let markers_json = spec.markers_json()?;
            let content_md = spec.content_template(&update_process);
            let composed_schema = spec.composed_schema_jsonnet(&update_process);
            let patch_md = format!(
                "{{% include 'artifact-template://{update_process}/sections/' ~ {SECTION_VAR} %}}\n"
            );

            written.extend(self.workspace.scaffold_create_process(
                &bundle_root,
                &create_process,
                &content_md,
                &spec.placement,
                &spec.naming,
                &composed_schema,
                spec.permissions_for("create").as_deref(),
                spec.include_default_routine,
                Some(&routine_params),
            )?);

            written.extend(self.workspace.scaffold_get_process(
                &bundle_root,
                &get_process,
                Some(&markers_json),
                &locator_jsonnet,
                &parser_jsonnet,
                spec.permissions_for("get").as_deref(),
                spec.include_default_routine,
                Some(&routine_params),
            )?);

            written.extend(self.workspace.scaffold_update_process(
                &bundle_root,
                &update_process,
                Some(&markers_json),
                &locator_jsonnet,
                &parser_jsonnet,
                &patch_md,
                &composed_schema,
                spec.permissions_for("update").as_deref(),
                spec.include_default_routine,
                Some(&routine_params),
            )?);
        }

        Ok(BuildOutcome {
            bundle_root,
            created: self.workspace.summarize_created_files(&written),
        })
    }

    /// Team data as JSON, with templated string values rendered for the
    /// acting agent and an optional dot-path filter.
    pub fn get_team_data(&self, actor: &str, dot_path: Option<&str>) -> Result<JsonValue> {
        let raw = self.workspace.get_team_data()?;
        let mut data: JsonValue = serde_yaml::from_str(&raw).map_err(|err| {
            PantheonError::InvalidConfig(format!("invalid team-data.yaml: {err}"))
        })?;

        let mut context = TemplateContext::new();
        context.insert(BUILTIN_ACTOR.to_owned(), JsonValue::String(actor.to_owned()));
        self.render_string_leaves(&mut data, &context);

        match dot_path {
            Some(dot_path) if !dot_path.is_empty() => engine::extract_path(&data, dot_path)
                .cloned()
                .ok_or_else(|| {
                    PantheonError::NotFound(format!("team data key '{dot_path}'"))
                }),
            _ => Ok(data),
        }
    }

    fn render_string_leaves(&self, value: &mut JsonValue, context: &TemplateContext) {
        match value {
            JsonValue::String(text) => {
                if text.contains("{{") || text.contains("{%") {
                    match self.engine.render_template(text, context, "team-data value") {
                        Ok(rendered) => *text = rendered,
                        Err(err) => warn!(%err, "failed to render team data value"),
                    }
                }
            }
            JsonValue::Array(items) => {
                for item in items {
                    self.render_string_leaves(item, context);
                }
            }
            JsonValue::Object(map) => {
                for (_, item) in map.iter_mut() {
                    self.render_string_leaves(item, context);
                }
            }
            _ => {}
        }
    }
}

/// Parsed view of a validated build spec.
struct BuildSpec {
    target_team: String,
    artifact: String,
    sections: Vec<BuildSection>,
    placement: String,
    naming: String,
    directory: Option<String>,
    permissions: Option<JsonMap<String, JsonValue>>,
    include_default_routine: bool,
}

struct BuildSection {
    name: String,
    template: String,
    schema: Option<JsonMap<String, JsonValue>>,
}

impl BuildSection {
    fn schema_jsonnet(&self) -> Result<String> {
        let fields = self.schema.clone().unwrap_or_default();
        Ok(serde_json::to_string_pretty(&JsonValue::Object(fields))?)
    }

    fn markers(&self) -> (String, String) {
        let upper = self.name.to_uppercase();
        (
            format!("<!-- SECTION:START:{upper} -->"),
            format!("<!-- SECTION:END:{upper} -->"),
        )
    }
}

impl BuildSpec {
    fn from_map(build_spec: &JsonMap<String, JsonValue>) -> Result<Self> {
        let target_team = build_spec
            .get("target_team")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                PantheonError::InvalidConfig("build spec requires 'target_team'".into())
            })?
            .to_owned();
        let artifact = build_spec
            .get("artifact")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| PantheonError::InvalidConfig("build spec requires 'artifact'".into()))?
            .to_owned();

        let mut sections = Vec::new();
        if let Some(templates) = build_spec.get("section_template").and_then(JsonValue::as_array) {
            for entry in templates {
                let Some(entry) = entry.as_object() else {
                    continue;
                };
                let Some(name) = entry.get("section").and_then(JsonValue::as_str) else {
                    continue;
                };
                sections.push(BuildSection {
                    name: name.to_owned(),
                    template: entry
                        .get("template")
                        .and_then(JsonValue::as_str)
                        .unwrap_or("")
                        .to_owned(),
                    schema: entry
                        .get("schema")
                        .and_then(JsonValue::as_object)
                        .cloned(),
                });
            }
        }

        let location = build_spec
            .get("artifact_location")
            .and_then(JsonValue::as_object);
        let directory = location
            .and_then(|loc| loc.get("directory"))
            .and_then(JsonValue::as_str)
            .map(str::to_owned);
        let placement = directory
            .as_deref()
            .map(|dir| dir.trim_end_matches('/').to_owned())
            .unwrap_or_default();
        let naming = location
            .and_then(|loc| loc.get("filename_template"))
            .and_then(JsonValue::as_str)
            .unwrap_or("{{ pantheon_artifact_id }}.md")
            .to_owned();

        Ok(Self {
            target_team,
            artifact,
            sections,
            placement,
            naming,
            directory,
            permissions: build_spec
                .get("permissions")
                .and_then(JsonValue::as_object)
                .cloned(),
            include_default_routine: build_spec
                .get("include_default_routine")
                .and_then(JsonValue::as_bool)
                .unwrap_or(true),
        })
    }

    fn permissions_for(&self, operation: &str) -> Option<String> {
        let value = self.permissions.as_ref()?.get(operation)?;
        serde_json::to_string_pretty(value).ok()
    }

    fn locator_jsonnet(&self) -> String {
        let mut lines = vec![
            "{".to_owned(),
            "  pattern: \"^(\" + std.extVar(\"pantheon_artifact_id\") + \")_.*\\\\.md$\","
                .to_owned(),
        ];
        if let Some(directory) = &self.directory {
            lines.push(format!(
                "  directory: {},",
                serde_json::to_string(directory.trim_end_matches('/'))
                    .unwrap_or_else(|_| "\"\"".to_owned())
            ));
        }
        lines.push("}".to_owned());
        lines.join("\n")
    }

    fn markers_json(&self) -> Result<String> {
        let mut sections = JsonMap::new();
        for section in &self.sections {
            let (start, end) = section.markers();
            sections.insert(
                section.name.clone(),
                serde_json::json!({"start": start, "end": end}),
            );
        }
        let markers = serde_json::json!({
            "placeholder": SECTION_PLACEHOLDER_MARKER,
            "sections": sections,
        });
        Ok(serde_json::to_string_pretty(&markers)?)
    }

    /// CREATE content template: per-section include toggles wrapped in the
    /// section markers, with the placeholder emitted for excluded sections.
    fn content_template(&self, update_process: &str) -> String {
        let mut output = String::new();
        for section in &self.sections {
            output.push_str(&format!(
                "{{% set _include_{name} = true %}}\n",
                name = section.name
            ));
        }
        output.push('\n');

        for section in &self.sections {
            let (start, end) = section.markers();
            output.push_str(&format!(
                "{start}\n{{% if _include_{name} %}}\n{{% include 'artifact-template://{update_process}/sections/{name}' %}}\n{{% else %}}\n{SECTION_PLACEHOLDER_MARKER}\n{{% endif %}}\n{end}\n\n",
                name = section.name
            ));
        }

        output
    }

    /// CREATE/UPDATE input schema composed from the per-section schemas via
    /// semantic URI imports.
    fn composed_schema_jsonnet(&self, update_process: &str) -> String {
        let mut lines = vec!["local sections = [".to_owned()];
        for section in &self.sections {
            lines.push(format!(
                "  import \"process-schema://{update_process}/sections/{}\",",
                section.name
            ));
        }
        lines.push("];".to_owned());
        lines.push("std.foldl(function(acc, section) acc + section, sections, {})".to_owned());
        lines.join("\n")
    }
}

fn default_parser_rules() -> String {
    serde_json::to_string_pretty(&serde_json::json!([
        {"pattern": "^\\s+|\\s+$", "replacement": ""},
        {"pattern": ".*[/\\\\]", "replacement": ""},
        {"pattern": "^([A-Za-z]*\\d+).*$", "replacement": "$1"}
    ]))
    .expect("static rules serialize")
}
