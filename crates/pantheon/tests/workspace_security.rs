//! Sandbox enforcement and import preprocessing against the real
//! filesystem.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pantheon::{
    FileSystem, OsFileSystem, PantheonError, PantheonPath, PantheonWorkspace,
};
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

fn make_project(marker_yaml: &str) -> TestProject {
    init_tracing();
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path().join("project");
    fs::create_dir_all(&root).unwrap();
    fs::write(root.join(".pantheon_project"), marker_yaml).unwrap();
    TestProject { _temp: temp, root }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn make_workspace(project: &TestProject) -> PantheonWorkspace {
    PantheonWorkspace::new(
        &project.root,
        "pantheon-artifacts",
        Arc::new(OsFileSystem::new()) as Arc<dyn FileSystem>,
    )
}

#[test]
fn save_artifact_rejects_traversal_even_after_construction() {
    let project = make_project("active_team: dev\n");
    let workspace = make_workspace(&project);

    // Construction succeeds; the sandbox still refuses it.
    let sneaky = PantheonPath::new("../x").unwrap();
    let err = workspace.save_artifact("escape", &sneaky).unwrap_err();
    assert!(matches!(err, PantheonError::Security(_)));

    let encoded = PantheonPath::new("%2e%2e/x").unwrap();
    let err = workspace.save_artifact("escape", &encoded).unwrap_err();
    assert!(matches!(err, PantheonError::Security(_)));
}

#[test]
fn audit_directory_is_write_and_read_protected() {
    let project = make_project("active_team: dev\naudit_enabled: true\naudit_directory: audits\n");
    let workspace = make_workspace(&project);

    let inside = PantheonPath::new("audits/2026-08-01_cli.jsonl").unwrap();
    assert!(matches!(
        workspace.save_artifact("x", &inside).unwrap_err(),
        PantheonError::Security(_)
    ));
    assert!(matches!(
        workspace
            .append_jsonl_entry(&serde_json::json!({}), &inside)
            .unwrap_err(),
        PantheonError::Security(_)
    ));

    write(
        &project.root,
        "pantheon-artifacts/audits/2026-08-01_cli.jsonl",
        "{}\n",
    );
    assert!(matches!(
        workspace.read_artifact_file(&inside).unwrap_err(),
        PantheonError::Security(_)
    ));

    // The audit writer itself still works.
    workspace.save_audit_log(&serde_json::json!({"action": "test"}));
    let audit_dir = project.root.join("pantheon-artifacts/audits");
    let entries: Vec<_> = fs::read_dir(&audit_dir).unwrap().collect();
    assert!(!entries.is_empty());
}

#[test]
fn artifacts_save_relative_to_sandbox_root() {
    let project = make_project("active_team: dev\n");
    let workspace = make_workspace(&project);

    let saved = workspace
        .save_artifact("content", &PantheonPath::new("a/b/c.md").unwrap())
        .unwrap();
    assert_eq!(saved.to_string(), "a/b/c.md");
    assert_eq!(
        fs::read_to_string(project.root.join("pantheon-artifacts/a/b/c.md")).unwrap(),
        "content"
    );
}

#[test]
fn glob_directories_expand_through_the_filesystem_port() {
    let project = make_project("active_team: dev\n");
    let workspace = make_workspace(&project);

    write(&project.root, "pantheon-artifacts/tasks/high/T001_a.md", "a");
    write(&project.root, "pantheon-artifacts/tasks/low/T002_b.md", "b");
    write(&project.root, "pantheon-artifacts/misc/T003_c.md", "c");

    let matches = workspace.get_matching_artifact(r"^T\d+_.*\.md$", Some("tasks/*"));
    let mut names: Vec<String> = matches.iter().map(ToString::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["tasks/high/T001_a.md", "tasks/low/T002_b.md"]);
}

#[test]
fn import_preprocessing_inlines_files_on_disk() {
    let project = make_project("active_team: dev\n");
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/schema.jsonnet",
        "local shared = import 'shared.jsonnet';\nshared { extra: true }",
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/shared.jsonnet",
        "{ base: 1 }",
    );

    let workspace = make_workspace(&project);
    let preprocessed = workspace.get_process_schema("create-ticket").unwrap();
    assert_eq!(
        preprocessed,
        "local shared = { base: 1 };\nshared { extra: true }"
    );
}

#[test]
fn circular_imports_fail_with_the_chain() {
    let project = make_project("active_team: dev\n");
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/schema.jsonnet",
        "import 'a.jsonnet'",
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/a.jsonnet",
        "import 'b.jsonnet'",
    );
    write(
        &project.root,
        "pantheon-teams/dev/processes/create-ticket/b.jsonnet",
        "import 'a.jsonnet'",
    );

    let workspace = make_workspace(&project);
    let err = workspace.get_process_schema("create-ticket").unwrap_err();
    match err {
        PantheonError::CircularImport { chain } => {
            assert!(chain.contains("a.jsonnet"));
            assert!(chain.contains("b.jsonnet"));
        }
        other => panic!("expected CircularImport, got {other:?}"),
    }
}

#[test]
fn temp_cleanup_honors_the_policy() {
    let project = make_project("active_team: dev\ntemp_file_cleanup: on_failure\n");
    let workspace = make_workspace(&project);

    let temp_path = workspace.create_tempfile(Some(".log"), Some("run"));
    let absolute = project.root.join("pantheon-artifacts").join(temp_path.to_string());
    fs::create_dir_all(absolute.parent().unwrap()).unwrap();
    fs::write(&absolute, "scratch").unwrap();

    // Success keeps the file under the on_failure policy.
    workspace.cleanup_temp_file(&absolute.display().to_string(), true);
    assert!(absolute.exists());

    // Failure removes it.
    workspace.cleanup_temp_file(&absolute.display().to_string(), false);
    assert!(!absolute.exists());

    // Files outside the temp subtree are never touched.
    let outside = project.root.join("pantheon-artifacts/keep.md");
    fs::write(&outside, "keep").unwrap();
    workspace.cleanup_temp_file(&outside.display().to_string(), false);
    assert!(outside.exists());
}

#[test]
fn discover_project_root_walks_ancestors_on_disk() {
    let project = make_project("active_team: dev\n");
    let nested = project.root.join("deep/nested/dir");
    fs::create_dir_all(&nested).unwrap();

    let filesystem = OsFileSystem::new();
    let found = PantheonWorkspace::discover_project_root(&filesystem, &nested).unwrap();
    assert_eq!(found, project.root);
}
