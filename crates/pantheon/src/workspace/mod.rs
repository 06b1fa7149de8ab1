//! Workspace facade for filesystem operations and project conventions.
//!
//! The workspace is the central hub for all I/O in the framework: project
//! root discovery through the `.pantheon_project` marker, convention-based
//! path resolution for team assets, sandboxed artifact management, semantic
//! URI resolution, and audit logging. It is the only component authorized to
//! unwrap a [`PantheonPath`] and hand it to the injected [`FileSystem`].

mod preprocess;
mod scaffold;
mod team_data;

use std::env;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, error, warn};

use crate::engine;
use crate::error::{PantheonError, Result};
use crate::filesystem::FileSystem;
use crate::path::PantheonPath;
use crate::path_security::{
    validate_directory_param, validate_path_safety, validate_section_path,
};
use crate::uri::{SemanticUri, UriScheme};

pub const PROJECT_MARKER_FILE: &str = ".pantheon_project";
pub const DEFAULT_ARTIFACTS_ROOT: &str = "pantheon-artifacts";
pub const DEFAULT_AUDIT_DIRECTORY: &str = "pantheon-audit";
pub const TEAMS_DIR: &str = "pantheon-teams";
pub const PROCESSES_SUBDIR: &str = "processes";
pub const CONFIG_DIR: &str = "config";
pub const TEMP_SUBDIR: &str = "temp";
pub const ARTIFACT_SUBDIR: &str = "artifact";
pub const ARTIFACT_ID_FILENAME: &str = ".artifact_id.json";

pub const SCHEMA_FILENAME: &str = "schema.jsonnet";
pub const ROUTINE_FILENAME: &str = "routine.md";
pub const REDIRECT_FILENAME: &str = "redirect.md";
pub const TEAM_PROFILE_FILENAME: &str = "team-profile.yaml";
pub const TEAM_DATA_FILENAME: &str = "team-data.yaml";
pub const PERMISSIONS_FILENAME: &str = "permissions.jsonnet";
pub const BUILD_SCHEMA_FILENAME: &str = "build-schema.jsonnet";
pub const DIRECTORY_TEMPLATE_FILENAME: &str = "directory.jinja";
pub const CONTENT_TEMPLATE_FILENAME: &str = "content.md";
pub const PLACEMENT_TEMPLATE_FILENAME: &str = "placement.jinja";
pub const NAMING_TEMPLATE_FILENAME: &str = "naming.jinja";
pub const LOCATOR_FILENAME: &str = "locator.jsonnet";
pub const PARSER_FILENAME: &str = "parser.jsonnet";
pub const SECTIONS_FILENAME: &str = "sections.jsonnet";
pub const TARGET_FILENAME: &str = "target.jsonnet";
pub const PATCH_TEMPLATE_FILENAME: &str = "patch.md";
pub const JSONL_NAMING_TEMPLATE_FILENAME: &str = "jsonl_naming.jinja";
pub const JSONL_PLACEMENT_TEMPLATE_FILENAME: &str = "jsonl_placement.jinja";

/// When temporary files reserved through `create_tempfile` are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempFileCleanup {
    #[default]
    Always,
    OnFailure,
    Never,
}

impl TempFileCleanup {
    fn parse(raw: &str) -> Self {
        match raw {
            "always" => Self::Always,
            "on_failure" => Self::OnFailure,
            "never" => Self::Never,
            other => {
                warn!(policy = other, "unknown temp_file_cleanup policy, defaulting to 'always'");
                Self::Always
            }
        }
    }
}

/// Configuration loaded from the `.pantheon_project` marker file.
///
/// Unknown keys are ignored; a missing or unparseable file yields defaults.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub active_team: String,
    pub artifacts_root: String,
    pub log_level: Option<String>,
    pub audit_enabled: bool,
    pub audit_directory: String,
    pub temp_file_cleanup: TempFileCleanup,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            active_team: String::new(),
            artifacts_root: DEFAULT_ARTIFACTS_ROOT.to_owned(),
            log_level: None,
            audit_enabled: false,
            audit_directory: DEFAULT_AUDIT_DIRECTORY.to_owned(),
            temp_file_cleanup: TempFileCleanup::Always,
        }
    }
}

/// Classification of files written during process execution, used by the
/// created-file summaries returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatedFileKind {
    Routine,
    Schema,
    Template,
    Patch,
    Target,
    Locator,
    Parser,
    Sections,
    Permissions,
    Jsonl,
    Artifact,
}

impl CreatedFileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Routine => "routine",
            Self::Schema => "schema",
            Self::Template => "template",
            Self::Patch => "patch",
            Self::Target => "target",
            Self::Locator => "locator",
            Self::Parser => "parser",
            Self::Sections => "sections",
            Self::Permissions => "permissions",
            Self::Jsonl => "jsonl",
            Self::Artifact => "artifact",
        }
    }
}

/// Process kind inferred from which files exist in the process directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    Create,
    Retrieve,
    Update,
    Build,
    Redirect,
}

/// Structured metadata about one created file.
#[derive(Debug, Clone)]
pub struct CreatedFileSummary {
    /// Project-relative path (prefixed with the artifacts directory name).
    pub path: String,
    pub kind: CreatedFileKind,
    pub description: String,
}

/// Facade over the filesystem enforcing the artifact sandbox.
pub struct PantheonWorkspace {
    project_root: PathBuf,
    artifacts_root: PathBuf,
    filesystem: Arc<dyn FileSystem>,
    config: ProjectConfig,
}

impl PantheonWorkspace {
    /// Builds a workspace from raw outside-world paths.
    ///
    /// `artifacts_root` is resolved relative to `project_root`. The project
    /// configuration is loaded once here and immutable afterwards.
    pub fn new(
        project_root: impl AsRef<Path>,
        artifacts_root: impl AsRef<Path>,
        filesystem: Arc<dyn FileSystem>,
    ) -> Self {
        let project_root = absolutize(project_root.as_ref());
        let artifacts_root = lexical_normalize(&project_root.join(artifacts_root.as_ref()));
        let config = Self::load_project_config(filesystem.as_ref(), &project_root);

        debug!(project_root = %project_root.display(), artifacts_root = %artifacts_root.display(), "workspace initialized");

        Self {
            project_root,
            artifacts_root,
            filesystem,
            config,
        }
    }

    /// Walks upward from `start_path` looking for the project marker file.
    pub fn discover_project_root(
        filesystem: &dyn FileSystem,
        start_path: impl AsRef<Path>,
    ) -> Option<PathBuf> {
        let start = absolutize(start_path.as_ref());
        for ancestor in start.ancestors() {
            if filesystem.exists(&ancestor.join(PROJECT_MARKER_FILE)) {
                return Some(ancestor.to_path_buf());
            }
        }
        None
    }

    /// Loads `.pantheon_project`, yielding defaults when missing or invalid.
    pub fn load_project_config(
        filesystem: &dyn FileSystem,
        project_root: &Path,
    ) -> ProjectConfig {
        let marker = project_root.join(PROJECT_MARKER_FILE);
        if !filesystem.exists(&marker) {
            warn!(path = %marker.display(), "no project marker found, using defaults");
            return ProjectConfig::default();
        }

        let text = match filesystem.read_text(&marker) {
            Ok(text) => text,
            Err(err) => {
                error!(path = %marker.display(), %err, "failed to read project marker");
                return ProjectConfig::default();
            }
        };

        let parsed: serde_yaml::Value = match serde_yaml::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                error!(path = %marker.display(), %err, "failed to parse project marker");
                return ProjectConfig::default();
            }
        };

        let mut config = ProjectConfig::default();
        if let Some(team) = parsed.get("active_team").and_then(|v| v.as_str()) {
            config.active_team = team.to_owned();
        }
        if let Some(root) = parsed.get("artifacts_root").and_then(|v| v.as_str()) {
            config.artifacts_root = root.to_owned();
        }
        if let Some(enabled) = parsed.get("audit_enabled").and_then(|v| v.as_bool()) {
            config.audit_enabled = enabled;
        }
        if let Some(dir) = parsed.get("audit_directory").and_then(|v| v.as_str()) {
            config.audit_directory = dir.to_owned();
        }
        if let Some(policy) = parsed.get("temp_file_cleanup").and_then(|v| v.as_str()) {
            config.temp_file_cleanup = TempFileCleanup::parse(policy);
        }
        if let Some(level) = parsed.get("log_level").and_then(|v| v.as_str()) {
            let level = level.to_uppercase();
            if matches!(level.as_str(), "DEBUG" | "INFO" | "WARNING" | "ERROR") {
                config.log_level = Some(level);
            }
        }

        config
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Active team name, or empty when unconfigured.
    pub fn active_team(&self) -> &str {
        &self.config.active_team
    }

    pub(crate) fn filesystem(&self) -> &dyn FileSystem {
        self.filesystem.as_ref()
    }

    fn active_team_root(&self) -> Result<PathBuf> {
        if self.config.active_team.is_empty() {
            return Err(PantheonError::InvalidConfig(format!(
                "no active_team configured in {PROJECT_MARKER_FILE}"
            )));
        }
        Ok(self
            .project_root
            .join(TEAMS_DIR)
            .join(&self.config.active_team))
    }

    /// Base directory for file-path template includes: the active team root,
    /// or the current directory when no team is configured.
    pub(crate) fn team_loader_base(&self) -> PathBuf {
        self.active_team_root()
            .unwrap_or_else(|_| PathBuf::from("."))
    }

    fn build_process_path(&self, process_name: &str, parts: &[&str]) -> Result<PathBuf> {
        let mut path = self
            .active_team_root()?
            .join(PROCESSES_SUBDIR)
            .join(process_name);
        for part in parts {
            path.push(part);
        }
        Ok(path)
    }

    fn build_team_path(&self, parts: &[&str]) -> Result<PathBuf> {
        let mut path = self.active_team_root()?;
        for part in parts {
            path.push(part);
        }
        Ok(path)
    }

    fn read_process_file(&self, process_name: &str, parts: &[&str]) -> Result<String> {
        let path = self.build_process_path(process_name, parts)?;
        self.filesystem.read_text(&path)
    }

    fn read_preprocessed_process_file(
        &self,
        process_name: &str,
        parts: &[&str],
    ) -> Result<String> {
        let path = self.build_process_path(process_name, parts)?;
        let raw = self.filesystem.read_text(&path)?;
        self.preprocess_content(&raw, &path)
    }

    // --- Content retrieval -------------------------------------------------

    /// Preprocessed `schema.jsonnet` for a process.
    pub fn get_process_schema(&self, process_name: &str) -> Result<String> {
        self.read_preprocessed_process_file(process_name, &[SCHEMA_FILENAME])
    }

    /// Native path of a process schema, used for Jsonnet diagnostics.
    pub fn get_process_schema_path(&self, process_name: &str) -> Result<String> {
        Ok(self
            .build_process_path(process_name, &[SCHEMA_FILENAME])?
            .display()
            .to_string())
    }

    /// Preprocessed section schema at `artifact/<section>.schema.jsonnet`.
    pub fn get_section_schema(&self, process_name: &str, section_path: &str) -> Result<String> {
        validate_section_path(section_path)?;
        let file = format!("{section_path}.schema.jsonnet");
        let path = self.build_process_path(process_name, &[ARTIFACT_SUBDIR, &file])?;
        let raw = self.filesystem.read_text(&path)?;
        self.preprocess_content(&raw, &path)
    }

    /// Raw section template at `artifact/<section>.md`.
    pub fn get_artifact_section_template(
        &self,
        process_name: &str,
        section_path: &str,
    ) -> Result<String> {
        validate_section_path(section_path)?;
        let file = if section_path.ends_with(".md") {
            section_path.to_owned()
        } else {
            format!("{section_path}.md")
        };
        self.read_process_file(process_name, &[ARTIFACT_SUBDIR, &file])
    }

    /// Raw `routine.md` for a process.
    pub fn get_process_routine(&self, process_name: &str) -> Result<String> {
        self.read_process_file(process_name, &[ROUTINE_FILENAME])
    }

    /// Absolute path of a process directory, for template tooling.
    pub fn get_process_directory(&self, process_name: &str) -> Result<PathBuf> {
        self.build_process_path(process_name, &[])
    }

    /// Errors when the process has no `routine.md`.
    pub fn check_process_exists(&self, process_name: &str) -> Result<()> {
        let path = self.build_process_path(process_name, &[ROUTINE_FILENAME])?;
        if !self.filesystem.exists(&path) {
            return Err(PantheonError::NotFound(format!(
                "process '{process_name}'"
            )));
        }
        Ok(())
    }

    pub fn has_process_redirect(&self, process_name: &str) -> bool {
        match self.build_process_path(process_name, &[REDIRECT_FILENAME]) {
            Ok(path) => self.filesystem.exists(&path),
            Err(_) => false,
        }
    }

    /// Trimmed contents of `redirect.md`.
    pub fn get_process_redirect(&self, process_name: &str) -> Result<String> {
        Ok(self
            .read_process_file(process_name, &[REDIRECT_FILENAME])?
            .trim()
            .to_owned())
    }

    pub fn get_artifact_parser(&self, process_name: &str) -> Result<String> {
        self.read_preprocessed_process_file(process_name, &[ARTIFACT_SUBDIR, PARSER_FILENAME])
    }

    pub fn get_artifact_locator(&self, process_name: &str) -> Result<String> {
        self.read_preprocessed_process_file(process_name, &[ARTIFACT_SUBDIR, LOCATOR_FILENAME])
    }

    pub fn get_artifact_section_markers(&self, process_name: &str) -> Result<String> {
        self.read_preprocessed_process_file(process_name, &[ARTIFACT_SUBDIR, SECTIONS_FILENAME])
    }

    pub fn get_artifact_content_template(&self, process_name: &str) -> Result<String> {
        self.read_process_file(process_name, &[ARTIFACT_SUBDIR, CONTENT_TEMPLATE_FILENAME])
    }

    pub fn get_artifact_directory_template(&self, process_name: &str) -> Result<String> {
        self.read_process_file(process_name, &[ARTIFACT_SUBDIR, PLACEMENT_TEMPLATE_FILENAME])
    }

    pub fn get_artifact_filename_template(&self, process_name: &str) -> Result<String> {
        self.read_process_file(process_name, &[ARTIFACT_SUBDIR, NAMING_TEMPLATE_FILENAME])
    }

    pub fn get_artifact_target_section(&self, process_name: &str) -> Result<String> {
        self.read_preprocessed_process_file(process_name, &[ARTIFACT_SUBDIR, TARGET_FILENAME])
    }

    pub fn get_artifact_patch_template(&self, process_name: &str) -> Result<String> {
        self.read_process_file(process_name, &[ARTIFACT_SUBDIR, PATCH_TEMPLATE_FILENAME])
    }

    /// Both JSONL templates must exist for sidecar logging to engage.
    pub fn has_jsonl_templates(&self, process_name: &str) -> bool {
        let naming = self.build_process_path(
            process_name,
            &[ARTIFACT_SUBDIR, JSONL_NAMING_TEMPLATE_FILENAME],
        );
        let placement = self.build_process_path(
            process_name,
            &[ARTIFACT_SUBDIR, JSONL_PLACEMENT_TEMPLATE_FILENAME],
        );
        match (naming, placement) {
            (Ok(naming), Ok(placement)) => {
                self.filesystem.exists(&naming) && self.filesystem.exists(&placement)
            }
            _ => false,
        }
    }

    pub fn get_artifact_jsonl_filename_template(&self, process_name: &str) -> Result<String> {
        self.read_process_file(
            process_name,
            &[ARTIFACT_SUBDIR, JSONL_NAMING_TEMPLATE_FILENAME],
        )
    }

    pub fn get_artifact_jsonl_directory_template(&self, process_name: &str) -> Result<String> {
        self.read_process_file(
            process_name,
            &[ARTIFACT_SUBDIR, JSONL_PLACEMENT_TEMPLATE_FILENAME],
        )
    }

    /// Distinguishes multi-artifact processes (with an ID parser) from
    /// singleton processes.
    pub fn has_artifact_parser(&self, process_name: &str) -> bool {
        match self.build_process_path(process_name, &[ARTIFACT_SUBDIR, PARSER_FILENAME]) {
            Ok(path) => self.filesystem.exists(&path),
            Err(_) => false,
        }
    }

    pub fn has_build_schema(&self, process_name: &str) -> bool {
        match self.build_process_path(process_name, &[BUILD_SCHEMA_FILENAME]) {
            Ok(path) => self.filesystem.exists(&path),
            Err(_) => false,
        }
    }

    /// Preprocessed `build-schema.jsonnet` marking a BUILD process.
    pub fn get_build_schema(&self, process_name: &str) -> Result<String> {
        self.read_preprocessed_process_file(process_name, &[BUILD_SCHEMA_FILENAME])
    }

    /// Infers the process kind from which declarative files exist.
    pub fn detect_process_kind(&self, process_name: &str) -> Result<ProcessKind> {
        if self.has_process_redirect(process_name) {
            return Ok(ProcessKind::Redirect);
        }
        if self.has_build_schema(process_name) {
            return Ok(ProcessKind::Build);
        }

        let has_file = |parts: &[&str]| -> bool {
            self.build_process_path(process_name, parts)
                .map(|path| self.filesystem.exists(&path))
                .unwrap_or(false)
        };

        if has_file(&[ARTIFACT_SUBDIR, CONTENT_TEMPLATE_FILENAME]) {
            return Ok(ProcessKind::Create);
        }
        if has_file(&[ARTIFACT_SUBDIR, PATCH_TEMPLATE_FILENAME]) {
            return Ok(ProcessKind::Update);
        }
        if has_file(&[ARTIFACT_SUBDIR, LOCATOR_FILENAME]) {
            return Ok(ProcessKind::Retrieve);
        }

        Err(PantheonError::NotFound(format!(
            "process '{process_name}' has no recognizable operation files"
        )))
    }

    /// Root-level `directory.jinja` used by BUILD to place the bundle.
    pub fn get_process_directory_template(&self, process_name: &str) -> Result<String> {
        self.read_process_file(process_name, &[DIRECTORY_TEMPLATE_FILENAME])
    }

    /// Raw `team-profile.yaml` for the active team.
    pub fn get_team_profile(&self) -> Result<String> {
        let path = self.build_team_path(&[TEAM_PROFILE_FILENAME])?;
        self.filesystem.read_text(&path)
    }

    /// Preprocessed `permissions.jsonnet` for a process.
    pub fn get_permissions(&self, process_name: &str) -> Result<String> {
        self.read_preprocessed_process_file(process_name, &[PERMISSIONS_FILENAME])
    }

    /// YAML configuration from `config/[<scope>/]<name>.yaml`, scoped first
    /// with fallback to the team-global file.
    pub fn get_config(
        &self,
        config_name: &str,
        scope: Option<&str>,
    ) -> Result<serde_json::Map<String, JsonValue>> {
        let file = format!("{config_name}.yaml");
        if let Some(scope) = scope {
            let scoped = self.build_team_path(&[CONFIG_DIR, scope, &file])?;
            match self.filesystem.read_text(&scoped) {
                Ok(content) => return parse_yaml_mapping(&content),
                Err(PantheonError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }

        let global = self.build_team_path(&[CONFIG_DIR, &file])?;
        let content = self.filesystem.read_text(&global)?;
        parse_yaml_mapping(&content)
    }

    /// Team package directory (`pantheon-teams/<team>`), defaulting to the
    /// active team.
    pub fn get_team_package_path(&self, team: Option<&str>) -> Result<PantheonPath> {
        let team = match team {
            Some(team) => team,
            None => {
                if self.config.active_team.is_empty() {
                    return Err(PantheonError::InvalidConfig(
                        "no team specified and no active_team configured".into(),
                    ));
                }
                &self.config.active_team
            }
        };
        PantheonPath::from_segments([TEAMS_DIR, team])
    }

    /// Section-marker content for a process, optionally reduced to the value
    /// at a dot-notation data path (used by `artifact-sections://...?data=`).
    pub fn get_artifact_sections(
        &self,
        process_name: &str,
        data_path: Option<&str>,
    ) -> Result<String> {
        let sections_content = self.get_artifact_section_markers(process_name)?;

        match data_path {
            Some(data_path) if !data_path.is_empty() => {
                let extracted = engine::resolve_uri_data(&sections_content, data_path, &[])?;
                Ok(serde_json::to_string(&extracted)?)
            }
            _ => Ok(sections_content),
        }
    }

    /// Resolves a semantic URI to the content it names.
    pub fn get_resolved_content(&self, uri: &str) -> Result<String> {
        let parsed = SemanticUri::parse(uri)?;
        let process = parsed.process.as_str();

        match parsed.scheme {
            UriScheme::ArtifactContentTemplate => self.get_artifact_content_template(process),
            UriScheme::ArtifactDirectoryTemplate => self.get_artifact_directory_template(process),
            UriScheme::ArtifactFilenameTemplate => self.get_artifact_filename_template(process),
            UriScheme::ArtifactLocator => self.get_artifact_locator(process),
            UriScheme::ArtifactParser => self.get_artifact_parser(process),
            UriScheme::ArtifactSectionMarkers => self.get_artifact_section_markers(process),
            UriScheme::ArtifactSections => {
                self.get_artifact_sections(process, parsed.params.get("data").map(String::as_str))
            }
            UriScheme::ProcessRoutine => self.get_process_routine(process),
            UriScheme::ProcessSchema => match parsed.sub_path.as_deref() {
                Some(sub_path) => self.get_section_schema(process, sub_path),
                None => self.get_process_schema(process),
            },
            UriScheme::ArtifactTemplate => match parsed.sub_path.as_deref() {
                Some(sub_path) => self.get_artifact_section_template(process, sub_path),
                None => Err(PantheonError::MalformedUri {
                    uri: uri.to_owned(),
                    message: "artifact-template:// URIs require a sub-path".into(),
                }),
            },
        }
    }

    // --- Sandbox I/O -------------------------------------------------------

    fn audit_root(&self) -> PathBuf {
        lexical_normalize(&self.artifacts_root.join(&self.config.audit_directory))
    }

    fn ensure_outside_audit(&self, absolute: &Path, action: &str) -> Result<()> {
        let resolved = lexical_normalize(absolute);
        if resolved.starts_with(self.audit_root()) {
            return Err(PantheonError::Security(format!(
                "{action} within the audit directory are not permitted"
            )));
        }
        Ok(())
    }

    fn sandbox_target(&self, path: &PantheonPath, context: &str) -> Result<PathBuf> {
        validate_path_safety(&path.to_slash(), false, context)
            .map_err(|err| PantheonError::Security(err.to_string()))?;
        Ok(self.artifacts_root.join(path.as_native()))
    }

    /// Writes an artifact inside the sandbox, creating parent directories.
    /// Returns the saved path relative to the artifacts root.
    pub fn save_artifact(&self, content: &str, path: &PantheonPath) -> Result<PantheonPath> {
        let absolute = self.sandbox_target(path, "artifact path")?;
        self.ensure_outside_audit(&absolute, "writes")?;

        if let Some(parent) = absolute.parent() {
            if !self.filesystem.exists(parent) {
                self.filesystem.mkdir(parent, true, true)?;
            }
        }

        self.filesystem.write_text(&absolute, content)?;
        self.relative_to_sandbox(&absolute)
    }

    /// Appends one JSON object as a line to a JSONL file in the sandbox.
    pub fn append_jsonl_entry(&self, data: &JsonValue, path: &PantheonPath) -> Result<PantheonPath> {
        let absolute = self.sandbox_target(path, "jsonl path")?;
        self.ensure_outside_audit(&absolute, "writes")?;

        if let Some(parent) = absolute.parent() {
            if !self.filesystem.exists(parent) {
                self.filesystem.mkdir(parent, true, true)?;
            }
        }

        let line = serde_json::to_string(data)?;
        self.filesystem.append_text(&absolute, &format!("{line}\n"))?;
        self.relative_to_sandbox(&absolute)
    }

    fn relative_to_sandbox(&self, absolute: &Path) -> Result<PantheonPath> {
        let relative = absolute
            .strip_prefix(&self.artifacts_root)
            .map_err(|_| {
                PantheonError::Security(format!(
                    "path escapes the artifact sandbox: {}",
                    absolute.display()
                ))
            })?;
        PantheonPath::new(relative.to_string_lossy())
    }

    /// Reserves a unique path under `temp/` without creating the file.
    pub fn create_tempfile(&self, suffix: Option<&str>, prefix: Option<&str>) -> PantheonPath {
        let mut unique = [0u8; 16];
        if let Err(err) = getrandom::getrandom(&mut unique) {
            // Degraded uniqueness is acceptable for temp names.
            warn!(%err, "falling back to timestamp-only temp file name");
        }

        let mut parts = vec![Local::now().format("%Y-%m-%d_%H-%M").to_string()];
        if let Some(prefix) = prefix {
            parts.push(prefix.to_owned());
        }
        parts.push(hex::encode(unique));

        let mut filename = parts.join("_");
        if let Some(suffix) = suffix {
            filename.push_str(suffix);
        }

        PantheonPath::from_segments([TEMP_SUBDIR, filename.as_str()])
            .expect("temp file names are always valid relative paths")
    }

    /// Removes a temp file according to the configured cleanup policy.
    /// Never fails; paths outside the temp subtree are left alone.
    pub fn cleanup_temp_file(&self, file_path: &str, execution_success: bool) {
        let candidate = absolutize(Path::new(file_path));
        let temp_root = lexical_normalize(&self.artifacts_root.join(TEMP_SUBDIR));

        if !candidate.starts_with(&temp_root) {
            debug!(file_path, "not in temp directory, skipping cleanup");
            return;
        }

        let should_cleanup = match self.config.temp_file_cleanup {
            TempFileCleanup::Always => true,
            TempFileCleanup::OnFailure => !execution_success,
            TempFileCleanup::Never => false,
        };

        if !should_cleanup {
            debug!(file_path, "cleanup policy keeps this file");
            return;
        }

        if let Err(err) = self.filesystem.unlink(&candidate, true) {
            warn!(file_path, %err, "failed to clean up temp file");
        }
    }

    /// Reads an artifact file from the sandbox; the audit directory is off
    /// limits.
    pub fn read_artifact_file(&self, artifact_path: &PantheonPath) -> Result<String> {
        let absolute = self.artifacts_root.join(artifact_path.as_native());
        self.ensure_outside_audit(&absolute, "reads")?;
        self.filesystem.read_text(&absolute).map_err(|err| match err {
            PantheonError::NotFound(_) => {
                PantheonError::NotFound(format!("artifact file {artifact_path}"))
            }
            other => other,
        })
    }

    /// Finds sandbox files whose names match `pattern` (anchored at the
    /// start, like a prefix match). Returns an empty list on any problem:
    /// invalid regex, missing directory, unsafe directory, or walk errors.
    pub fn get_matching_artifact(
        &self,
        pattern: &str,
        directory: Option<&str>,
    ) -> Vec<PantheonPath> {
        let compiled = match Regex::new(pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!(pattern, %err, "invalid regex pattern");
                return Vec::new();
            }
        };

        let search_roots: Vec<PathBuf> = match directory {
            Some(directory) => {
                if let Err(err) = validate_directory_param(directory) {
                    warn!(%err, "rejecting search directory");
                    return Vec::new();
                }

                if directory.contains(['*', '?', '[']) {
                    match self.filesystem.glob(&self.artifacts_root, directory) {
                        Ok(dirs) if dirs.is_empty() => {
                            debug!(directory, "no directories match glob pattern");
                            return Vec::new();
                        }
                        Ok(dirs) => dirs,
                        Err(err) => {
                            warn!(directory, %err, "error expanding glob pattern");
                            return Vec::new();
                        }
                    }
                } else {
                    let root = lexical_normalize(&self.artifacts_root.join(directory));
                    if !self.filesystem.exists(&root) {
                        debug!(directory, "search directory does not exist");
                        return Vec::new();
                    }
                    if !root.starts_with(&self.artifacts_root) {
                        warn!(directory, "search directory escapes the sandbox");
                        return Vec::new();
                    }
                    vec![root]
                }
            }
            None => vec![self.artifacts_root.clone()],
        };

        let mut matches = Vec::new();
        for root in search_roots {
            if !self.filesystem.exists(&root) {
                continue;
            }
            // Search roots are directories; anything else is skipped.
            match self.filesystem.iterdir(&root) {
                Ok(children) => {
                    for child in children {
                        self.search_entry(&child, &compiled, &mut matches);
                    }
                }
                Err(err) => {
                    debug!(root = %root.display(), %err, "skipping non-directory search root");
                }
            }
        }
        matches
    }

    fn search_entry(&self, entry: &Path, pattern: &Regex, matches: &mut Vec<PantheonPath>) {
        match self.filesystem.iterdir(entry) {
            Ok(children) => {
                for child in children {
                    self.search_entry(&child, pattern, matches);
                }
            }
            Err(_) => {
                // Not a directory: treat as a candidate file.
                let Some(name) = entry.file_name().and_then(|n| n.to_str()) else {
                    return;
                };
                let anchored = pattern.find(name).is_some_and(|m| m.start() == 0);
                if anchored {
                    if let Ok(relative) = entry.strip_prefix(&self.artifacts_root) {
                        if let Ok(path) = PantheonPath::new(relative.to_string_lossy()) {
                            matches.push(path);
                        }
                    }
                }
            }
        }
    }

    /// Plain-text read of the artifact ID ledger; empty when missing.
    pub fn read_artifact_id(&self) -> Result<String> {
        let path = self.artifacts_root.join(ARTIFACT_ID_FILENAME);
        if !self.filesystem.exists(&path) {
            return Ok(String::new());
        }
        self.filesystem.read_text(&path)
    }

    /// Plain-text write of the artifact ID ledger.
    pub fn save_artifact_id(&self, content: &str) -> Result<()> {
        let path = self.artifacts_root.join(ARTIFACT_ID_FILENAME);
        if let Some(parent) = path.parent() {
            if !self.filesystem.exists(parent) {
                self.filesystem.mkdir(parent, true, true)?;
            }
        }
        self.filesystem.write_text(&path, content)
    }

    /// Appends one audit event to today's JSONL file. Best effort: a no-op
    /// when auditing is disabled, and failures never surface.
    pub fn save_audit_log(&self, event: &JsonValue) {
        if !self.config.audit_enabled {
            return;
        }

        let audit_root = self.artifacts_root.join(&self.config.audit_directory);
        if !self.filesystem.exists(&audit_root) {
            if let Err(err) = self.filesystem.mkdir(&audit_root, true, true) {
                warn!(%err, "failed to create audit directory");
                return;
            }
        }

        let today = Local::now().format("%Y-%m-%d");
        let audit_file = audit_root.join(format!("{today}_cli.jsonl"));

        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                warn!(%err, "failed to serialize audit event");
                return;
            }
        };

        if let Err(err) = self.filesystem.append_text(&audit_file, &format!("{line}\n")) {
            warn!(%err, "failed to write audit log");
        }
    }

    /// Converts created file paths to structured summaries with
    /// project-relative paths and type classifications.
    pub fn summarize_created_files(&self, file_paths: &[PantheonPath]) -> Vec<CreatedFileSummary> {
        let artifacts_dir_name = self
            .artifacts_root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(DEFAULT_ARTIFACTS_ROOT)
            .to_owned();

        file_paths
            .iter()
            .map(|path| {
                let (kind, description) = classify_created_file(path);
                CreatedFileSummary {
                    path: format!("{artifacts_dir_name}/{path}"),
                    kind,
                    description,
                }
            })
            .collect()
    }
}

fn parse_yaml_mapping(content: &str) -> Result<serde_json::Map<String, JsonValue>> {
    let value: JsonValue = serde_yaml::from_str(content)
        .map_err(|err| PantheonError::InvalidConfig(format!("invalid YAML: {err}")))?;
    match value {
        JsonValue::Object(map) => Ok(map),
        _ => Ok(serde_json::Map::new()),
    }
}

fn classify_created_file(path: &PantheonPath) -> (CreatedFileKind, String) {
    let filename = path.name().to_owned();
    let parent_dir = path.parent().name().to_owned();

    let classified = match filename.as_str() {
        ROUTINE_FILENAME => Some((CreatedFileKind::Routine, "Process execution instructions")),
        SCHEMA_FILENAME => Some((CreatedFileKind::Schema, "Input validation schema")),
        BUILD_SCHEMA_FILENAME => Some((
            CreatedFileKind::Schema,
            "Build process specification schema",
        )),
        DIRECTORY_TEMPLATE_FILENAME => {
            Some((CreatedFileKind::Template, "Directory path template"))
        }
        PERMISSIONS_FILENAME => Some((
            CreatedFileKind::Permissions,
            "Access control configuration",
        )),
        CONTENT_TEMPLATE_FILENAME => {
            Some((CreatedFileKind::Template, "Artifact content template"))
        }
        PLACEMENT_TEMPLATE_FILENAME => {
            Some((CreatedFileKind::Template, "Artifact directory template"))
        }
        NAMING_TEMPLATE_FILENAME => {
            Some((CreatedFileKind::Template, "Artifact filename template"))
        }
        PATCH_TEMPLATE_FILENAME => Some((CreatedFileKind::Patch, "Section update template")),
        TARGET_FILENAME => Some((
            CreatedFileKind::Target,
            "Section targeting configuration",
        )),
        LOCATOR_FILENAME => Some((CreatedFileKind::Locator, "Artifact location pattern")),
        PARSER_FILENAME => Some((
            CreatedFileKind::Parser,
            "Artifact ID normalization rules",
        )),
        SECTIONS_FILENAME => Some((CreatedFileKind::Sections, "Artifact section markers")),
        JSONL_NAMING_TEMPLATE_FILENAME => {
            Some((CreatedFileKind::Template, "JSONL filename template"))
        }
        JSONL_PLACEMENT_TEMPLATE_FILENAME => {
            Some((CreatedFileKind::Template, "JSONL directory template"))
        }
        _ => None,
    };

    if let Some((kind, description)) = classified {
        return (kind, description.to_owned());
    }

    if parent_dir == ARTIFACT_SUBDIR {
        return (
            CreatedFileKind::Template,
            format!("Process template file ({filename})"),
        );
    }

    if filename.ends_with(".jsonl") {
        return (CreatedFileKind::Jsonl, "JSONL log entries".to_owned());
    }

    (CreatedFileKind::Artifact, "Generated artifact".to_owned())
}

/// Normalizes a path lexically: strips `.`, resolves `..` against named
/// components, and never consults the filesystem.
pub(crate) fn lexical_normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    let mut pending_parents: usize = 0;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if normalized
                    .components()
                    .next_back()
                    .is_some_and(|c| matches!(c, Component::Normal(_)))
                {
                    normalized.pop();
                } else if normalized.is_absolute() {
                    // Attempts to climb above the root are ignored.
                } else {
                    pending_parents += 1;
                }
            }
            Component::Normal(part) => {
                while pending_parents > 0 {
                    normalized.push("..");
                    pending_parents -= 1;
                }
                normalized.push(part);
            }
        }
    }

    while pending_parents > 0 {
        normalized.push("..");
        pending_parents -= 1;
    }

    if normalized.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        normalized
    }
}

pub(crate) fn absolutize(path: &Path) -> PathBuf {
    let base = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    lexical_normalize(&base)
}
