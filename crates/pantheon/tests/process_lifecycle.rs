//! Full process lifecycle: CREATE, RETRIEVE, UPDATE, and BUILD through the
//! handler against a real project tree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pantheon::{FileSystem, OsFileSystem, PantheonWorkspace, ProcessHandler};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tempfile::TempDir;

struct TestProject {
    _temp: TempDir,
    root: PathBuf,
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn make_project() -> TestProject {
    init_tracing();
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("project");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(".pantheon_project"), "active_team: dev\n").unwrap();
    TestProject { _temp: temp, root }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, relative: &str) -> String {
    fs::read_to_string(root.join(relative)).unwrap()
}

fn make_handler(project: &TestProject) -> ProcessHandler {
    let workspace = Arc::new(PantheonWorkspace::new(
        &project.root,
        "pantheon-artifacts",
        Arc::new(OsFileSystem::new()) as Arc<dyn FileSystem>,
    ));
    ProcessHandler::new(workspace)
}

fn json_map(value: JsonValue) -> JsonMap<String, JsonValue> {
    value.as_object().cloned().unwrap()
}

fn ticket_templates() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "content".to_owned(),
            "# {{title}}\nPriority: {{priority}}".to_owned(),
        ),
        ("placement".to_owned(), "tasks/{{priority}}".to_owned()),
        ("naming".to_owned(), "{{title|slugify}}.md".to_owned()),
    ])
}

fn seed_create_ticket(project: &TestProject) {
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/routine.md",
        "# Create a ticket\n",
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/schema.jsonnet",
        r#"{ title: { type: "string" }, priority: { type: "string" } }"#,
    );
}

#[test]
fn create_renders_and_saves_the_artifact() {
    let project = make_project();
    seed_create_ticket(&project);
    let handler = make_handler(&project);

    let input = json_map(serde_json::json!({"title": "Fix Bug", "priority": "high"}));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "create-ticket",
        "pantheon_actor": "qa"
    }));

    let outcome = handler
        .execute_create_process(&input, &framework, &ticket_templates())
        .unwrap();

    assert_eq!(outcome.artifact_path.to_string(), "tasks/high/fix-bug.md");
    assert!(outcome.jsonl_path.is_none());
    assert_eq!(outcome.created.len(), 1);

    let body = read(&project.root, "pantheon-artifacts/tasks/high/fix-bug.md");
    assert!(body.starts_with("# Fix Bug\nPriority: high"));
}

#[test]
fn create_rejects_invalid_input() {
    let project = make_project();
    seed_create_ticket(&project);
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/schema.jsonnet",
        r#"{
  properties: { title: { type: "string" } },
  required: ["title"],
}"#,
    );
    let handler = make_handler(&project);

    let input = json_map(serde_json::json!({"priority": "high"}));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "create-ticket",
        "pantheon_actor": "qa"
    }));

    let err = handler
        .execute_create_process(&input, &framework, &ticket_templates())
        .unwrap_err();
    assert!(err.to_string().contains("title"));

    // Nothing was written.
    assert!(!project.root.join("pantheon-artifacts/tasks").exists());
}

#[test]
fn create_twice_increments_the_ledger_by_two() {
    let project = make_project();
    seed_create_ticket(&project);
    let handler = make_handler(&project);

    let framework = json_map(serde_json::json!({
        "pantheon_process": "create-ticket",
        "pantheon_actor": "qa"
    }));
    let templates = BTreeMap::from([
        ("content".to_owned(), "ID {{ pantheon_artifact_id }}".to_owned()),
        ("placement".to_owned(), "tickets".to_owned()),
        (
            "naming".to_owned(),
            "T{{ pantheon_artifact_id }}_{{ title | slugify }}.md".to_owned(),
        ),
    ]);

    for title in ["First", "Second"] {
        let input = json_map(serde_json::json!({"title": title, "priority": "low"}));
        handler
            .execute_create_process(&input, &framework, &templates)
            .unwrap();
    }

    let ledger: JsonValue =
        serde_json::from_str(&read(&project.root, "pantheon-artifacts/.artifact_id.json"))
            .unwrap();
    assert_eq!(ledger["dev"]["create-ticket"], 2);

    assert!(project
        .root
        .join("pantheon-artifacts/tickets/T1_first.md")
        .exists());
    assert!(project
        .root
        .join("pantheon-artifacts/tickets/T2_second.md")
        .exists());
    assert_eq!(
        read(&project.root, "pantheon-artifacts/tickets/T2_second.md"),
        "ID 2"
    );
}

#[test]
fn create_appends_jsonl_sidecar_when_templates_exist() {
    let project = make_project();
    seed_create_ticket(&project);
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/artifact/jsonl_placement.jinja",
        "logs",
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/artifact/jsonl_naming.jinja",
        "tickets.jsonl",
    );
    let handler = make_handler(&project);

    let input = json_map(serde_json::json!({"title": "Fix Bug", "priority": "high"}));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "create-ticket",
        "pantheon_actor": "qa",
        "pantheon_timestamp": "2026-08-01 09:00 AM +00:00"
    }));

    let outcome = handler
        .execute_create_process(&input, &framework, &ticket_templates())
        .unwrap();
    assert_eq!(
        outcome.jsonl_path.as_ref().map(ToString::to_string),
        Some("logs/tickets.jsonl".to_owned())
    );

    let line = read(&project.root, "pantheon-artifacts/logs/tickets.jsonl");
    let record: JsonValue = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(record["title"], "Fix Bug");
    assert_eq!(record["priority"], "high");
    assert_eq!(record["timestamp"], "2026-08-01 09:00 AM +00:00");
    // The record carries only inputs plus the timestamp.
    assert!(record.get("pantheon_actor").is_none());
}

#[test]
fn retrieve_returns_section_map() {
    let project = make_project();
    write(
        &project.root,
        "pantheon-teams/dev/processes/get-ticket/artifact/parser.jsonnet",
        r#"[ { pattern: "^\\s+|\\s+$", replacement: "" } ]"#,
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/get-ticket/artifact/locator.jsonnet",
        r#"{ pattern: "^(" + std.extVar("pantheon_artifact_id") + ")_.*\\.md$" }"#,
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/get-ticket/artifact/sections.jsonnet",
        r#"{
  placeholder: "__EMPTY__",
  sections: { plan: { start: "<!--S:PLAN-->", end: "<!--E:PLAN-->" } },
}"#,
    );
    write(
        &project.root,
        "pantheon-artifacts/T007_fix.md",
        "intro\n<!--S:PLAN-->do the thing<!--E:PLAN-->\n",
    );

    let handler = make_handler(&project);
    let sections = handler
        .execute_retrieve_process("get-ticket", Some(" T007 "), &[])
        .unwrap();

    assert_eq!(sections.get("plan").map(String::as_str), Some("do the thing"));
}

#[test]
fn retrieve_fails_when_nothing_matches() {
    let project = make_project();
    write(
        &project.root,
        "pantheon-teams/dev/processes/get-guide/artifact/locator.jsonnet",
        r#"{ pattern: "^guide\\.md$" }"#,
    );

    let handler = make_handler(&project);
    let err = handler
        .execute_retrieve_process("get-guide", None, &[])
        .unwrap_err();
    assert!(matches!(err, pantheon::PantheonError::NotFound(_)));
}

fn seed_update_plan(project: &TestProject) {
    write(
        &project.root,
        "pantheon-teams/dev/processes/update-plan/schema.jsonnet",
        r#"{ plan_body: { type: "string" } }"#,
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/update-plan/artifact/locator.jsonnet",
        r#"{ pattern: "^plan\\.md$" }"#,
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/update-plan/artifact/target.jsonnet",
        r#"{
  section_start: "<!--S:PLAN-->",
  section_end: "<!--E:PLAN-->",
  placeholder: "__EMPTY__",
}"#,
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/update-plan/artifact/patch.md",
        "{{ plan_body }}",
    );
}

#[test]
fn update_splices_only_the_target_section() {
    let project = make_project();
    seed_update_plan(&project);
    write(
        &project.root,
        "pantheon-artifacts/plan.md",
        "# Plan\n<!--S:PLAN-->old<!--E:PLAN-->\ntrailer\n",
    );

    let handler = make_handler(&project);
    let input = json_map(serde_json::json!({"plan_body": "new"}));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "update-plan",
        "pantheon_actor": "qa"
    }));

    let outcome = handler
        .execute_update_process("update-plan", None, &input, &framework, &[])
        .unwrap();
    assert_eq!(outcome.artifact_path.to_string(), "plan.md");

    let body = read(&project.root, "pantheon-artifacts/plan.md");
    assert_eq!(body, "# Plan\n<!--S:PLAN-->new<!--E:PLAN-->\ntrailer\n");
}

#[test]
fn update_fails_when_the_marker_is_missing() {
    let project = make_project();
    seed_update_plan(&project);
    write(&project.root, "pantheon-artifacts/plan.md", "no markers here\n");

    let handler = make_handler(&project);
    let input = json_map(serde_json::json!({"plan_body": "new"}));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "update-plan",
        "pantheon_actor": "qa"
    }));

    let err = handler
        .execute_update_process("update-plan", None, &input, &framework, &[])
        .unwrap_err();
    assert!(matches!(err, pantheon::PantheonError::MissingSection { .. }));
}

#[test]
fn update_does_not_consume_artifact_ids() {
    let project = make_project();
    seed_update_plan(&project);
    write(
        &project.root,
        "pantheon-artifacts/plan.md",
        "<!--S:PLAN-->old<!--E:PLAN-->",
    );

    let handler = make_handler(&project);
    let input = json_map(serde_json::json!({"plan_body": "new"}));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "update-plan",
        "pantheon_actor": "qa"
    }));
    handler
        .execute_update_process("update-plan", None, &input, &framework, &[])
        .unwrap();

    assert!(!project
        .root
        .join("pantheon-artifacts/.artifact_id.json")
        .exists());
}

fn seed_build_process(project: &TestProject) {
    write(
        &project.root,
        "pantheon-teams/dev/processes/build-team-process/routine.md",
        "# Build a process family\n",
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/build-team-process/build-schema.jsonnet",
        r#"{
  properties: {
    target_team: { type: "string" },
    artifact: { type: "string" },
  },
  required: ["target_team", "artifact"],
}"#,
    );
}

#[test]
fn build_scaffolds_a_single_section_process_family() {
    let project = make_project();
    seed_build_process(&project);
    let handler = make_handler(&project);

    let build_spec = json_map(serde_json::json!({
        "target_team": "built-team",
        "artifact": "note",
        "section_template": [
            {"section": "content", "template": "{{x}}", "schema": {"x": {"type": "string"}}}
        ],
        "artifact_location": {
            "directory": "notes/",
            "filename_template": "N{{ pantheon_artifact_id }}.md"
        }
    }));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "build-team-process",
        "pantheon_actor": "builder"
    }));

    let outcome = handler
        .execute_build_process("build-team-process", &build_spec, &framework)
        .unwrap();
    assert_eq!(
        outcome.bundle_root.to_string(),
        "pantheon-team-builds/built-team/processes"
    );

    let bundle = project
        .root
        .join("pantheon-artifacts/pantheon-team-builds/built-team/processes");

    // CREATE process: content is exactly the section template.
    assert_eq!(
        fs::read_to_string(bundle.join("create-note/artifact/content.md")).unwrap(),
        "{{x}}"
    );
    assert!(bundle.join("create-note/artifact/placement.jinja").exists());
    assert!(bundle.join("create-note/artifact/naming.jinja").exists());
    assert!(bundle.join("create-note/schema.jsonnet").exists());
    assert!(bundle.join("create-note/routine.md").exists());

    // GET process: no sections.jsonnet for single-section artifacts.
    assert!(bundle.join("get-note/artifact/locator.jsonnet").exists());
    assert!(bundle.join("get-note/artifact/parser.jsonnet").exists());
    assert!(!bundle.join("get-note/artifact/sections.jsonnet").exists());

    // UPDATE process: patch replaces the whole body, no target.jsonnet.
    assert_eq!(
        fs::read_to_string(bundle.join("update-note/artifact/patch.md")).unwrap(),
        "{{x}}"
    );
    assert!(!bundle.join("update-note/artifact/target.jsonnet").exists());

    // Routines were rendered with the build variables.
    let routine = fs::read_to_string(bundle.join("create-note/routine.md")).unwrap();
    assert!(routine.contains("CREATE note"));
}

#[test]
fn build_scaffolds_multi_section_assets() {
    let project = make_project();
    seed_build_process(&project);
    let handler = make_handler(&project);

    let build_spec = json_map(serde_json::json!({
        "target_team": "built-team",
        "artifact": "task",
        "section_template": [
            {"section": "description", "template": "# {{ title }}", "schema": {"title": {"type": "string"}}},
            {"section": "implementation", "template": "## Impl\n{{ details }}", "schema": {"details": {"type": "string"}}}
        ],
        "artifact_location": {
            "directory": "tasks/",
            "filename_template": "T{{ pantheon_artifact_id }}_{{ title | slugify }}.md"
        }
    }));
    let framework = json_map(serde_json::json!({
        "pantheon_process": "build-team-process",
        "pantheon_actor": "builder"
    }));

    handler
        .execute_build_process("build-team-process", &build_spec, &framework)
        .unwrap();

    let bundle = project
        .root
        .join("pantheon-artifacts/pantheon-team-builds/built-team/processes");

    // Per-section templates and schemas live under the UPDATE process.
    assert_eq!(
        fs::read_to_string(bundle.join("update-task/artifact/sections/description.md")).unwrap(),
        "# {{ title }}"
    );
    assert!(bundle
        .join("update-task/artifact/sections/implementation.schema.jsonnet")
        .exists());

    // CREATE content template stitches sections with markers and includes.
    let content =
        fs::read_to_string(bundle.join("create-task/artifact/content.md")).unwrap();
    assert!(content.contains("{% set _include_description = true %}"));
    assert!(content.contains("<!-- SECTION:START:DESCRIPTION -->"));
    assert!(content.contains("<!-- SECTION:END:IMPLEMENTATION -->"));
    assert!(content.contains("{% include 'artifact-template://update-task/sections/description' %}"));

    // CREATE schema composes the section schemas via semantic URI imports.
    let schema = fs::read_to_string(bundle.join("create-task/schema.jsonnet")).unwrap();
    assert!(schema.contains("local sections = ["));
    assert!(schema.contains("import \"process-schema://update-task/sections/description\""));

    // GET and UPDATE share the marker definitions.
    let sections =
        fs::read_to_string(bundle.join("get-task/artifact/sections.jsonnet")).unwrap();
    let markers: JsonValue = serde_json::from_str(&sections).unwrap();
    assert_eq!(
        markers["sections"]["description"]["start"],
        "<!-- SECTION:START:DESCRIPTION -->"
    );
    assert!(bundle.join("update-task/artifact/target.jsonnet").exists());
}

#[test]
fn team_data_renders_actor_templates_and_filters() {
    let project = make_project();
    write(
        &project.root,
        "pantheon-teams/dev/team-data.yaml",
        "greeting: \"hello {{ pantheon_actor }}\"\nnested:\n  count: 3\n",
    );

    let handler = make_handler(&project);

    let all = handler.get_team_data("qa", None).unwrap();
    assert_eq!(all["greeting"], "hello qa");
    assert_eq!(all["nested"]["count"], 3);

    let nested = handler.get_team_data("qa", Some("nested.count")).unwrap();
    assert_eq!(nested, 3);

    let err = handler.get_team_data("qa", Some("missing.key")).unwrap_err();
    assert!(matches!(err, pantheon::PantheonError::NotFound(_)));
}

#[test]
fn team_data_rejects_invalid_yaml() {
    let project = make_project();
    write(
        &project.root,
        "pantheon-teams/dev/team-data.yaml",
        ": broken [ yaml",
    );

    let handler = make_handler(&project);
    let err = handler.get_team_data("qa", None).unwrap_err();
    assert!(matches!(err, pantheon::PantheonError::InvalidConfig(_)));
}
