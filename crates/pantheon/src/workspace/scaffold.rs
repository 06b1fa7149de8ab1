//! BUILD scaffolding primitives.
//!
//! These materialize CREATE/GET/UPDATE process directories under a bundle
//! root inside the artifact sandbox, filling in the canonical files and
//! optionally overlaying bundled default routines rendered with build-spec
//! variables.

use tracing::warn;

use super::PantheonWorkspace;
use crate::engine::render::{self, TemplateContext};
use crate::error::Result;
use crate::path::PantheonPath;

const CREATE_ROUTINE_RESOURCE: &str = "routines/create-process-routine.md";
const GET_ROUTINE_RESOURCE: &str = "routines/get-process-routine.md";
const UPDATE_ROUTINE_RESOURCE: &str = "routines/update-process-routine.md";

const CREATE_ROUTINE_STUB: &str =
    "# Routine: CREATE Process\n\nRender a new artifact from structured input.\n";
const GET_ROUTINE_STUB: &str =
    "# Routine: GET Process\n\nReturn sections from an artifact.\n";
const UPDATE_ROUTINE_STUB: &str =
    "# Routine: UPDATE Process\n\nReplace content of a target section.\n";

impl PantheonWorkspace {
    /// Writes the bundled CREATE routine to `target_path`, rendering it with
    /// `parameters` when provided. Falls back to the raw template and then
    /// to a minimal stub rather than failing the scaffold.
    pub fn copy_default_create_routine(
        &self,
        target_path: &PantheonPath,
        parameters: Option<&TemplateContext>,
    ) -> Result<PantheonPath> {
        self.copy_default_routine(
            CREATE_ROUTINE_RESOURCE,
            CREATE_ROUTINE_STUB,
            target_path,
            parameters,
        )
    }

    /// Writes the bundled GET routine; see [`Self::copy_default_create_routine`].
    pub fn copy_default_get_routine(
        &self,
        target_path: &PantheonPath,
        parameters: Option<&TemplateContext>,
    ) -> Result<PantheonPath> {
        self.copy_default_routine(
            GET_ROUTINE_RESOURCE,
            GET_ROUTINE_STUB,
            target_path,
            parameters,
        )
    }

    /// Writes the bundled UPDATE routine; see [`Self::copy_default_create_routine`].
    pub fn copy_default_update_routine(
        &self,
        target_path: &PantheonPath,
        parameters: Option<&TemplateContext>,
    ) -> Result<PantheonPath> {
        self.copy_default_routine(
            UPDATE_ROUTINE_RESOURCE,
            UPDATE_ROUTINE_STUB,
            target_path,
            parameters,
        )
    }

    fn copy_default_routine(
        &self,
        resource: &str,
        stub: &str,
        target_path: &PantheonPath,
        parameters: Option<&TemplateContext>,
    ) -> Result<PantheonPath> {
        let template = match self.filesystem().read_bundled_resource(resource) {
            Ok(template) => template,
            Err(err) => {
                warn!(resource, %err, "failed to load bundled routine, writing stub");
                return self.save_artifact(stub, target_path);
            }
        };

        let content = match parameters {
            Some(parameters) => {
                match render::render_template(&template, parameters, resource) {
                    Ok(rendered) => rendered,
                    Err(err) => {
                        warn!(resource, %err, "failed to render routine template, using raw");
                        template
                    }
                }
            }
            None => template,
        };

        self.save_artifact(&content, target_path)
    }

    /// Scaffolds a CREATE process directory under `bundle_root`.
    ///
    /// Returns the list of written paths, relative to the sandbox.
    #[allow(clippy::too_many_arguments)]
    pub fn scaffold_create_process(
        &self,
        bundle_root: &PantheonPath,
        process_name: &str,
        content_md: &str,
        placement_jinja: &str,
        naming_jinja: &str,
        schema_jsonnet: &str,
        permissions_jsonnet: Option<&str>,
        include_default_routine: bool,
        parameters: Option<&TemplateContext>,
    ) -> Result<Vec<PantheonPath>> {
        let proc_root = bundle_root.join(process_name)?;
        let artifact_dir = proc_root.join("artifact")?;
        let mut written = Vec::new();

        written.push(self.save_artifact(content_md, &artifact_dir.join("content.md")?)?);
        written.push(self.save_artifact(placement_jinja, &artifact_dir.join("placement.jinja")?)?);
        written.push(self.save_artifact(naming_jinja, &artifact_dir.join("naming.jinja")?)?);
        written.push(self.save_artifact(schema_jsonnet, &proc_root.join("schema.jsonnet")?)?);

        if let Some(permissions) = permissions_jsonnet {
            written.push(self.save_artifact(permissions, &proc_root.join("permissions.jsonnet")?)?);
        }

        if include_default_routine {
            written.push(
                self.copy_default_create_routine(&proc_root.join("routine.md")?, parameters)?,
            );
        }

        Ok(written)
    }

    /// Scaffolds a GET process directory under `bundle_root`.
    ///
    /// `sections_json` is omitted for single-section artifacts, which are
    /// read whole.
    #[allow(clippy::too_many_arguments)]
    pub fn scaffold_get_process(
        &self,
        bundle_root: &PantheonPath,
        process_name: &str,
        sections_json: Option<&str>,
        locator_jsonnet: &str,
        parser_jsonnet: &str,
        permissions_jsonnet: Option<&str>,
        include_default_routine: bool,
        parameters: Option<&TemplateContext>,
    ) -> Result<Vec<PantheonPath>> {
        let proc_root = bundle_root.join(process_name)?;
        let artifact_dir = proc_root.join("artifact")?;
        let mut written = Vec::new();

        if let Some(sections) = sections_json {
            written.push(self.save_artifact(sections, &artifact_dir.join("sections.jsonnet")?)?);
        }
        written.push(self.save_artifact(locator_jsonnet, &artifact_dir.join("locator.jsonnet")?)?);
        written.push(self.save_artifact(parser_jsonnet, &artifact_dir.join("parser.jsonnet")?)?);

        if let Some(permissions) = permissions_jsonnet {
            written.push(self.save_artifact(permissions, &proc_root.join("permissions.jsonnet")?)?);
        }

        if include_default_routine {
            written.push(self.copy_default_get_routine(&proc_root.join("routine.md")?, parameters)?);
        }

        Ok(written)
    }

    /// Scaffolds an UPDATE process directory under `bundle_root`.
    ///
    /// `target_jsonnet` is omitted for single-section artifacts, whose patch
    /// template replaces the entire document body.
    #[allow(clippy::too_many_arguments)]
    pub fn scaffold_update_process(
        &self,
        bundle_root: &PantheonPath,
        process_name: &str,
        target_jsonnet: Option<&str>,
        locator_jsonnet: &str,
        parser_jsonnet: &str,
        patch_md: &str,
        schema_jsonnet: &str,
        permissions_jsonnet: Option<&str>,
        include_default_routine: bool,
        parameters: Option<&TemplateContext>,
    ) -> Result<Vec<PantheonPath>> {
        let proc_root = bundle_root.join(process_name)?;
        let artifact_dir = proc_root.join("artifact")?;
        let mut written = Vec::new();

        if let Some(target) = target_jsonnet {
            written.push(self.save_artifact(target, &artifact_dir.join("target.jsonnet")?)?);
        }
        written.push(self.save_artifact(locator_jsonnet, &artifact_dir.join("locator.jsonnet")?)?);
        written.push(self.save_artifact(parser_jsonnet, &artifact_dir.join("parser.jsonnet")?)?);
        written.push(self.save_artifact(patch_md, &artifact_dir.join("patch.md")?)?);
        written.push(self.save_artifact(schema_jsonnet, &proc_root.join("schema.jsonnet")?)?);

        if let Some(permissions) = permissions_jsonnet {
            written.push(self.save_artifact(permissions, &proc_root.join("permissions.jsonnet")?)?);
        }

        if include_default_routine {
            written.push(
                self.copy_default_update_routine(&proc_root.join("routine.md")?, parameters)?,
            );
        }

        Ok(written)
    }
}
