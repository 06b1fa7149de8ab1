//! Rendering environments and shared render plumbing.
//!
//! Two environments exist: a basic one with no loader (placement, naming,
//! patch, routine templates) and an artifact one whose loader chain tries
//! semantic URIs first and falls back to file lookup under the active team
//! root, enabling `{% include 'artifact-template://...' %}`.

use std::sync::Arc;

use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior, Value};
use serde_json::Value as JsonValue;
use tracing::warn;

use super::filters;
use crate::error::{PantheonError, Result};
use crate::path_security::validate_import_path;
use crate::uri::is_semantic_uri;
use crate::workspace::PantheonWorkspace;

/// Variables handed to a template render.
pub type TemplateContext = serde_json::Map<String, JsonValue>;

fn configure(env: &mut Environment<'static>) {
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.set_trim_blocks(false);
    env.set_lstrip_blocks(true);
    env.set_keep_trailing_newline(true);
    filters::register(env);
}

/// Environment without any loader; include statements will fail.
pub fn basic_environment() -> Environment<'static> {
    let mut env = Environment::new();
    configure(&mut env);
    env
}

/// Environment whose loader resolves semantic URIs through the workspace
/// and falls back to files under the active team root.
pub fn artifact_environment(workspace: &Arc<PantheonWorkspace>) -> Environment<'static> {
    let mut env = Environment::new();
    configure(&mut env);

    let ws = Arc::clone(workspace);
    env.set_loader(move |name| {
        if is_semantic_uri(name) {
            return ws.get_resolved_content(name).map(Some).map_err(|err| {
                minijinja::Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("failed to resolve semantic URI '{name}': {err}"),
                )
            });
        }

        if validate_import_path(name).is_err() {
            return Ok(None);
        }

        let path = ws.team_loader_base().join(name);
        match ws.filesystem().read_text(&path) {
            Ok(content) => Ok(Some(content)),
            Err(PantheonError::NotFound(_)) => Ok(None),
            Err(err) => Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("failed to load template '{name}': {err}"),
            )),
        }
    });

    env
}

/// Renders with the basic environment.
pub fn render_template(
    template_str: &str,
    context: &TemplateContext,
    template_name: &str,
) -> Result<String> {
    let env = basic_environment();
    render_with_environment(&env, template_str, context, template_name)
}

/// Renders with a caller-supplied environment (loader chain included).
pub fn render_with_environment(
    env: &Environment<'_>,
    template_str: &str,
    context: &TemplateContext,
    template_name: &str,
) -> Result<String> {
    if template_str.is_empty() {
        return Err(PantheonError::TemplateRender {
            template: template_name.to_owned(),
            message: "template content cannot be empty".into(),
        });
    }

    let template = env
        .template_from_named_str(template_name, template_str)
        .map_err(|err| PantheonError::TemplateRender {
            template: template_name.to_owned(),
            message: err.to_string(),
        })?;

    let rendered = template
        .render(Value::from_serialize(context))
        .map_err(|err| {
            warn!(
                template = template_name,
                available = ?context.keys().collect::<Vec<_>>(),
                "template rendering failed"
            );
            PantheonError::TemplateRender {
                template: template_name.to_owned(),
                message: err.to_string(),
            }
        })?;

    report_undefined_variables(&template, context, template_name);

    Ok(normalize_newlines(rendered))
}

/// Collapses runs of three or more newlines down to exactly two.
pub fn normalize_newlines(mut content: String) -> String {
    while content.contains("\n\n\n") {
        content = content.replace("\n\n\n", "\n\n");
    }
    content
}

/// Warns about template variables that were not supplied, with nearest-name
/// suggestions. Undefined variables render as empty rather than failing.
fn report_undefined_variables(
    template: &minijinja::Template<'_, '_>,
    context: &TemplateContext,
    template_name: &str,
) {
    let undeclared = template.undeclared_variables(false);
    if undeclared.is_empty() {
        return;
    }

    let available: Vec<&str> = context.keys().map(String::as_str).collect();
    for name in undeclared {
        if context.contains_key(&name) {
            continue;
        }
        let suggestions = suggest_similar_variables(&name, &available);
        if suggestions.is_empty() {
            warn!(
                template = template_name,
                variable = name.as_str(),
                "undefined template variable"
            );
        } else {
            warn!(
                template = template_name,
                variable = name.as_str(),
                ?suggestions,
                "undefined template variable, did you mean one of these?"
            );
        }
    }
}

/// Up to three candidates: substring containment, shared `_`-separated
/// words, or a 60% positional character match.
pub(crate) fn suggest_similar_variables(undefined: &str, available: &[&str]) -> Vec<String> {
    let undefined_lower = undefined.to_lowercase();
    let mut suggestions = Vec::new();

    for candidate in available {
        let candidate_lower = candidate.to_lowercase();

        let related = undefined_lower.contains(&candidate_lower)
            || candidate_lower.contains(&undefined_lower)
            || has_common_words(&undefined_lower, &candidate_lower);

        if related {
            suggestions.push((*candidate).to_owned());
        } else if undefined.len() > 3 && candidate.len() > 3 {
            let matches = undefined_lower
                .chars()
                .zip(candidate_lower.chars())
                .filter(|(a, b)| a == b)
                .count();
            let threshold = undefined.len().min(candidate.len()) * 6 / 10;
            if matches >= threshold {
                suggestions.push((*candidate).to_owned());
            }
        }
    }

    suggestions.truncate(3);
    suggestions
}

fn has_common_words(first: &str, second: &str) -> bool {
    first
        .split('_')
        .any(|word| !word.is_empty() && second.split('_').any(|other| other == word))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, JsonValue)]) -> TemplateContext {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), value.clone()))
            .collect()
    }

    #[test]
    fn renders_with_filters() {
        let ctx = context(&[("title", JsonValue::String("Fix Bug".into()))]);
        let out = render_template("{{ title | slugify }}.md", &ctx, "naming.jinja").unwrap();
        assert_eq!(out, "fix-bug.md");
    }

    #[test]
    fn undefined_variables_render_empty() {
        let ctx = context(&[]);
        let out = render_template("before {{ missing }} after", &ctx, "t").unwrap();
        assert_eq!(out, "before  after");
    }

    #[test]
    fn conditionals_and_loops_work() {
        let ctx = context(&[(
            "items",
            serde_json::json!(["a", "b"]),
        )]);
        let out = render_template(
            "{% for item in items %}{{ item }};{% endfor %}",
            &ctx,
            "t",
        )
        .unwrap();
        assert_eq!(out, "a;b;");
    }

    #[test]
    fn newline_runs_are_collapsed() {
        let ctx = context(&[]);
        let out = render_template("a\n\n\n\nb", &ctx, "t").unwrap();
        assert_eq!(out, "a\n\nb");
    }

    #[test]
    fn syntax_errors_surface_as_template_render() {
        let ctx = context(&[]);
        let err = render_template("{% if %}", &ctx, "broken.jinja").unwrap_err();
        assert!(matches!(err, PantheonError::TemplateRender { .. }));
    }

    #[test]
    fn empty_template_is_rejected() {
        let ctx = context(&[]);
        let err = render_template("", &ctx, "t").unwrap_err();
        assert!(matches!(err, PantheonError::TemplateRender { .. }));
    }

    #[test]
    fn html_is_not_escaped() {
        let ctx = context(&[("body", JsonValue::String("<b> & </b>".into()))]);
        let out = render_template("{{ body }}", &ctx, "content.md").unwrap();
        assert_eq!(out, "<b> & </b>");
    }

    #[test]
    fn suggestions_rank_related_names() {
        let available = ["ticket_title", "priority", "created_at"];
        let suggestions = suggest_similar_variables("title", &available);
        assert!(suggestions.contains(&"ticket_title".to_owned()));

        let none = suggest_similar_variables("zzz", &["abc"]);
        assert!(none.is_empty());
    }
}
