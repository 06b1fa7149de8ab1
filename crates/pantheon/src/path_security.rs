//! Centralized path validation shared by every component that accepts a
//! user-provided path string.

use std::borrow::Cow;
use std::path::{Component, Path};

use percent_encoding::percent_decode_str;

use crate::error::{PantheonError, Result};

/// Validates a path string against directory traversal and absolute-path
/// escapes.
///
/// Checks the raw string plus its once- and twice-URL-decoded forms so that
/// encoded traversal sequences (`%2e%2e`, `%252e%252e`) are caught as well.
pub fn validate_path_safety(path_str: &str, allow_absolute: bool, context: &str) -> Result<()> {
    if path_str.is_empty() {
        return Err(PantheonError::PathSecurity(format!(
            "empty {context} not allowed"
        )));
    }

    let decoded = decode_once(path_str);
    let double_decoded = decode_once(&decoded);

    if has_parent_component(path_str)
        || has_parent_component(&decoded)
        || has_parent_component(&double_decoded)
    {
        return Err(PantheonError::PathSecurity(format!(
            "directory traversal not allowed in {context}: {path_str}"
        )));
    }

    if !allow_absolute {
        let looks_absolute = path_str.starts_with('/')
            || path_str.starts_with('\\')
            || path_str.chars().nth(1) == Some(':')
            || Path::new(path_str).is_absolute();
        if looks_absolute {
            return Err(PantheonError::PathSecurity(format!(
                "absolute paths not allowed in {context}: {path_str}"
            )));
        }
    }

    Ok(())
}

/// Validates a user-provided section selector.
pub fn validate_section_path(section_path: &str) -> Result<()> {
    validate_path_safety(section_path, false, "section path")
}

/// Validates a relative import file name used by schema or template includes.
pub fn validate_import_path(import_path: &str) -> Result<()> {
    validate_path_safety(import_path, false, "import path")
}

/// Validates a search subdirectory of the artifact sandbox.
pub fn validate_directory_param(directory: &str) -> Result<()> {
    validate_path_safety(directory, false, "directory parameter")
}

fn decode_once(input: &str) -> String {
    match percent_decode_str(input).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => input.to_owned(),
    }
}

fn has_parent_component(path_str: &str) -> bool {
    let path: Cow<'_, Path> = Cow::Borrowed(Path::new(path_str));
    path.components().any(|c| matches!(c, Component::ParentDir))
}
