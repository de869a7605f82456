//! End-to-end CLI tests: init → index → docs/search/versions against a
//! freshly indexed local project, driven through the built `codex7` binary.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn codex7_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("codex7");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let docs_dir = root.join("project/docs");
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("routing.md"),
        "## Routing\n\nHow requests are routed to handlers.\n\n```rust\nfn route() {}\n```\n\n\
         ## Data Fetching\n\nLoading data before render. A reasonably long paragraph so the \
         section clears the minimum length threshold for chunking.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/codex7.sqlite"
"#,
        root.display()
    );
    let config_path = config_dir.join("codex7.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_codex7(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = codex7_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run codex7 binary at {binary:?}: {e}"));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn init_creates_database() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, ok) = run_codex7(&config_path, &["init"]);
    assert!(ok, "init failed: {stderr}");
    assert!(stdout.contains("Database initialized"));
}

#[test]
fn index_then_resolve_and_docs_and_search() {
    let (tmp, config_path) = setup_test_env();
    let project_root = tmp.path().join("project");

    let (_stdout, stderr, ok) = run_codex7(
        &config_path,
        &[
            "index",
            project_root.to_str().unwrap(),
            "--org",
            "acme",
            "--project",
            "widgets",
            "--title",
            "Widgets",
        ],
    );
    assert!(ok, "index failed: {stderr}");

    let (stdout, stderr, ok) = run_codex7(&config_path, &["resolve", "widgets"]);
    assert!(ok, "resolve failed: {stderr}");
    let resolved: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(resolved["total"], 1);
    let library_id = resolved["matches"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(resolved["matches"][0]["tool_hint"], "get-local-docs");

    let (stdout, stderr, ok) = run_codex7(
        &config_path,
        &["docs", &library_id, "--topic", "routing", "--tokens", "2000"],
    );
    assert!(ok, "docs failed: {stderr}");
    assert!(stdout.contains("Widgets"));

    let (stdout, stderr, ok) = run_codex7(&config_path, &["search", "routing"]);
    assert!(ok, "search failed: {stderr}");
    let search: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(search["total"].as_u64().unwrap() >= 1);

    let (stdout, stderr, ok) = run_codex7(&config_path, &["versions", &library_id]);
    assert!(ok, "versions failed: {stderr}");
    let versions: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(versions["library_id"], library_id);
}

#[test]
fn reindexing_same_project_is_idempotent() {
    let (tmp, config_path) = setup_test_env();
    let project_root = tmp.path().join("project");

    for _ in 0..2 {
        let (_stdout, stderr, ok) = run_codex7(
            &config_path,
            &[
                "index",
                project_root.to_str().unwrap(),
                "--org",
                "acme",
                "--project",
                "widgets",
            ],
        );
        assert!(ok, "index failed: {stderr}");
    }

    let (stdout, stderr, ok) = run_codex7(&config_path, &["resolve", "widgets"]);
    assert!(ok, "resolve failed: {stderr}");
    let resolved: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(resolved["total"], 1, "re-index must replace, not duplicate");
}
