//! Import preprocessing for Jsonnet assets.
//!
//! Import statements are rewritten to *inlined content* rather than
//! rewritten paths, so evaluation works against a virtual root and never
//! needs the evaluator's own import callback. Relative imports resolve
//! against the importing file's directory; `scheme://` imports go through
//! semantic URI resolution.
//!
//! Known limitation, kept deliberately: the grammar matches the `import`
//! keyword anywhere on a line, including inside string literals.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::PantheonWorkspace;
use crate::error::{PantheonError, Result};
use crate::path_security::validate_import_path;

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\bimport\s+["']([^"']+)["']"#).expect("import grammar is valid")
    })
}

impl PantheonWorkspace {
    /// Resolves every import statement in `content`, inlining the imported
    /// text. Nested imports are processed recursively; cycles fail with
    /// [`PantheonError::CircularImport`] naming the chain.
    pub(crate) fn preprocess_content(&self, content: &str, base_path: &Path) -> Result<String> {
        let mut stack = Vec::new();
        self.preprocess_inner(content, base_path, &mut stack)
    }

    fn preprocess_inner(
        &self,
        content: &str,
        base_path: &Path,
        stack: &mut Vec<String>,
    ) -> Result<String> {
        let base_str = base_path.display().to_string();
        if stack.contains(&base_str) {
            let chain = stack
                .iter()
                .cloned()
                .chain(std::iter::once(base_str))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(PantheonError::CircularImport { chain });
        }
        stack.push(base_str);

        let result = self.inline_imports(content, base_path, stack);
        stack.pop();
        result
    }

    fn inline_imports(
        &self,
        content: &str,
        base_path: &Path,
        stack: &mut Vec<String>,
    ) -> Result<String> {
        let pattern = import_pattern();
        let mut output = String::with_capacity(content.len());
        let mut last_end = 0;

        for captures in pattern.captures_iter(content) {
            let whole = captures.get(0).expect("match always has a group 0");
            let import_path = &captures[1];
            output.push_str(&content[last_end..whole.start()]);

            let resolved = if import_path.contains("://") {
                debug!(uri = import_path, "resolving semantic URI import");
                self.get_resolved_content(import_path)?
            } else {
                validate_import_path(import_path)?;
                let import_file = base_path
                    .parent()
                    .unwrap_or_else(|| Path::new(""))
                    .join(import_path);

                if !self.filesystem().exists(&import_file) {
                    return Err(PantheonError::NotFound(format!(
                        "imported file '{}' could not be found, as imported by '{}'",
                        import_file.display(),
                        base_path.display()
                    )));
                }

                debug!(import = import_path, "inlining relative import");
                let imported = self.filesystem().read_text(&import_file)?;
                self.preprocess_inner(&imported, &import_file, stack)?
            };

            output.push_str(&resolved);
            last_end = whole.end();
        }

        output.push_str(&content[last_end..]);
        Ok(output)
    }
}
