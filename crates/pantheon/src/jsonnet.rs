//! Jsonnet evaluation used for schemas, locators, parser rules, section
//! markers, targets, and permissions.
//!
//! Imports are inlined by the workspace preprocessor before evaluation, so
//! the VM never needs an import callback; only external variables flow in.

use jsonnet::JsonnetVm;
use tracing::debug;

use crate::error::{PantheonError, Result};

/// Evaluates a Jsonnet snippet to a JSON value.
///
/// String externals become `std.extVar` strings; `ext_codes` entries are
/// evaluated as Jsonnet expressions, which is how non-string profile values
/// (already JSON-serialized by the caller) reach the program.
pub fn evaluate(
    content: &str,
    filename: &str,
    ext_vars: &[(String, String)],
    ext_codes: &[(String, String)],
) -> Result<serde_json::Value> {
    if content.trim().is_empty() {
        return Err(PantheonError::SchemaCompile(
            "jsonnet content cannot be empty".into(),
        ));
    }

    let mut vm = JsonnetVm::new();
    for (key, value) in ext_vars {
        vm.ext_var(key, value);
    }
    for (key, code) in ext_codes {
        vm.ext_code(key, code);
    }

    debug!(filename, ext_vars = ext_vars.len(), ext_codes = ext_codes.len(), "evaluating jsonnet snippet");

    let json = match vm.evaluate_snippet(filename, content) {
        Ok(output) => output.to_string(),
        Err(err) => {
            return Err(PantheonError::SchemaCompile(format!(
                "jsonnet evaluation failed: {err}"
            )));
        }
    };

    serde_json::from_str(&json).map_err(|err| {
        PantheonError::SchemaCompile(format!("jsonnet produced invalid JSON: {err}"))
    })
}
