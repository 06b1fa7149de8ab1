//! Names of framework-provided template variables.

/// Process name executing the current operation.
pub const BUILTIN_PROCESS: &str = "pantheon_process";
/// Actor (agent or user) executing the current operation.
pub const BUILTIN_ACTOR: &str = "pantheon_actor";
/// Sequential artifact identifier, assigned during CREATE only.
pub const BUILTIN_ARTIFACT_ID: &str = "pantheon_artifact_id";
/// Human-readable timestamp (`YYYY-MM-DD hh:mm AM/PM TZ`).
pub const BUILTIN_TIMESTAMP: &str = "pantheon_timestamp";
/// Date-only stamp (`YYYY-MM-DD TZ`).
pub const BUILTIN_DATESTAMP: &str = "pantheon_datestamp";
