#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn foreman(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("foreman").unwrap();
    cmd.env("FOREMAN_HOME", home.path())
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("AI_PROVIDER")
        .env_remove("GITHUB_TOKEN");
    cmd
}

fn json_out(home: &TempDir, args: &[&str]) -> Value {
    let output = foreman(home).arg("--json").args(args).output().unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn create_project(home: &TempDir, name: &str) -> String {
    let project = json_out(
        home,
        &["project", "create", "--name", name, "--path", &format!("/code/{name}")],
    );
    project["id"].as_str().unwrap().to_string()
}

fn git_repo(root: &std::path::Path, name: &str) {
    let git = root.join(name).join(".git");
    std::fs::create_dir_all(&git).unwrap();
    std::fs::write(
        git.join("config"),
        format!("[remote \"origin\"]\n\turl = https://github.com/acme/{name}.git\n"),
    )
    .unwrap();
}

// ---------------------------------------------------------------------------
// foreman project
// ---------------------------------------------------------------------------

#[test]
fn empty_home_lists_no_projects() {
    let home = TempDir::new().unwrap();
    foreman(&home)
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No projects"));
    assert!(home.path().join("foreman.db").exists());
}

#[test]
fn project_create_seeds_personas() {
    let home = TempDir::new().unwrap();
    let id = create_project(&home, "shop");

    let agents = json_out(&home, &["agent", "list", &id]);
    assert_eq!(agents.as_array().unwrap().len(), 7);

    foreman(&home)
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shop"));
}

#[test]
fn duplicate_path_is_rejected() {
    let home = TempDir::new().unwrap();
    create_project(&home, "shop");
    foreman(&home)
        .args(["project", "create", "--name", "again", "--path", "/code/shop"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error:"));
}

#[test]
fn unknown_project_fails() {
    let home = TempDir::new().unwrap();
    foreman(&home)
        .args(["project", "show", "missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn merge_folds_source_into_target() {
    let home = TempDir::new().unwrap();
    let target = create_project(&home, "shop");
    let source = create_project(&home, "shop-api");

    let merged = json_out(&home, &["project", "merge", &target, &source]);
    assert_eq!(merged["repositories"][0]["name"], "shop-api");

    foreman(&home)
        .args(["project", "show", &source])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// foreman scan
// ---------------------------------------------------------------------------

#[test]
fn scan_imports_repositories_once() {
    let home = TempDir::new().unwrap();
    let code = TempDir::new().unwrap();
    git_repo(code.path(), "shop-web");
    git_repo(code.path(), "shop-api");

    let first = json_out(&home, &["scan", code.path().to_str().unwrap()]);
    assert_eq!(first["created"].as_array().unwrap().len(), 2);
    assert_eq!(first["parents"][0]["name"], "shop");
    assert_eq!(
        first["created"][0]["parentProjectId"],
        first["parents"][0]["id"]
    );

    let second = json_out(&home, &["scan", code.path().to_str().unwrap()]);
    assert!(second["created"].as_array().unwrap().is_empty());
    assert_eq!(second["skipped"].as_array().unwrap().len(), 2);
}

#[test]
fn scan_of_missing_directory_fails() {
    let home = TempDir::new().unwrap();
    foreman(&home)
        .args(["scan", "/definitely/not/here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read directory"));
}

// ---------------------------------------------------------------------------
// foreman task
// ---------------------------------------------------------------------------

#[test]
fn task_add_move_and_filter() {
    let home = TempDir::new().unwrap();
    let id = create_project(&home, "shop");

    let first = json_out(&home, &["task", "add", &id, "Write", "launch", "post"]);
    assert_eq!(first["title"], "Write launch post");
    assert_eq!(first["order"], 0);
    let second = json_out(&home, &["task", "add", &id, "Fix checkout", "--priority", "high"]);
    assert_eq!(second["order"], 1);
    assert_eq!(second["priority"], "high");

    let task_id = first["id"].as_str().unwrap();
    let moved = json_out(&home, &["task", "move", task_id, "done"]);
    assert_eq!(moved["status"], "done");

    let done = json_out(&home, &["task", "list", &id, "--status", "done"]);
    assert_eq!(done.as_array().unwrap().len(), 1);

    foreman(&home)
        .args(["task", "move", task_id, "finished"])
        .assert()
        .failure();
}

// ---------------------------------------------------------------------------
// foreman kb
// ---------------------------------------------------------------------------

#[test]
fn kb_add_search_and_tags() {
    let home = TempDir::new().unwrap();
    let doc = json_out(
        &home,
        &[
            "kb", "add", "--title", "Deploy Guide", "--content", "Use blue-green rollouts.",
            "--tag", "ops",
        ],
    );
    assert_eq!(doc["slug"], "deploy-guide");

    let again = json_out(
        &home,
        &["kb", "add", "--title", "Deploy Guide", "--content", "Second copy."],
    );
    assert_eq!(again["slug"], "deploy-guide-1");

    let found = json_out(&home, &["kb", "list", "--search", "BLUE-GREEN"]);
    assert_eq!(found.as_array().unwrap().len(), 1);

    foreman(&home)
        .args(["kb", "tags"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ops"));
}

#[test]
fn kb_upload_requires_markdown() {
    let home = TempDir::new().unwrap();
    let files = TempDir::new().unwrap();
    let body = "# Runbook\n\nWhat to do when the checkout queue backs up overnight.\n";

    let txt = files.path().join("runbook.txt");
    std::fs::write(&txt, body).unwrap();
    foreman(&home)
        .args(["kb", "upload", txt.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("markdown"));

    let md = files.path().join("runbook.md");
    std::fs::write(&md, body).unwrap();
    let doc = json_out(&home, &["kb", "upload", md.to_str().unwrap()]);
    assert_eq!(doc["title"], "Runbook");
    assert_eq!(doc["source"], "upload");
    // no provider configured, so the summary falls back to the first line
    assert!(doc["summary"].as_str().unwrap().starts_with("What to do"));
}

// ---------------------------------------------------------------------------
// foreman config
// ---------------------------------------------------------------------------

#[test]
fn config_set_persists_and_masks() {
    let home = TempDir::new().unwrap();
    foreman(&home)
        .args(["config", "set", "orchestration.task_cap", "30"])
        .assert()
        .success();
    foreman(&home)
        .args(["config", "set", "ai.openai_api_key", "sk-test-1234567890abcdef"])
        .assert()
        .success();

    let shown = json_out(&home, &["config", "show"]);
    assert_eq!(shown["orchestration"]["task_cap"], 30);
    assert_eq!(shown["openaiApiKey"], "sk-t…cdef");
    assert_eq!(shown["hasOpenaiKey"], true);

    let raw = std::fs::read_to_string(home.path().join("config.yaml")).unwrap();
    assert!(raw.contains("task_cap: 30"));
}

#[test]
fn config_rejects_unknown_keys() {
    let home = TempDir::new().unwrap();
    foreman(&home)
        .args(["config", "set", "ai.colour", "blue"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown config key"));
}

#[test]
fn analyze_without_keys_reports_the_provider_error() {
    let home = TempDir::new().unwrap();
    let id = create_project(&home, "shop");
    foreman(&home)
        .args(["analyze", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

// ---------------------------------------------------------------------------
// foreman mcp
// ---------------------------------------------------------------------------

#[test]
fn mcp_serves_next_task_over_stdio() {
    let home = TempDir::new().unwrap();
    let id = create_project(&home, "shop");
    json_out(&home, &["task", "add", &id, "Tidy README", "--priority", "low"]);
    json_out(&home, &["task", "add", &id, "Patch XSS", "--priority", "high"]);

    let input = [
        r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#.to_string(),
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#.to_string(),
        format!(
            r#"{{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{{"name":"get_next_task","arguments":{{"project_id":"{id}"}}}}}}"#
        ),
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"create_knowledge_base_document","arguments":{"title":"Agent Notes","content":"Found a flaky test."}}}"#.to_string(),
    ]
    .join("\n");

    let output = foreman(&home)
        .arg("mcp")
        .write_stdin(input)
        .output()
        .unwrap();
    assert!(output.status.success());

    let replies: Vec<Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    // the notification gets no reply
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0]["result"]["serverInfo"]["name"], "foreman");

    let next: Value =
        serde_json::from_str(replies[1]["result"]["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(next["title"], "Patch XSS");
    assert_eq!(replies[2]["result"]["isError"], false);

    let docs = json_out(&home, &["kb", "list"]);
    assert_eq!(docs[0]["slug"], "agent-notes");
    assert_eq!(docs[0]["source"], "mcp");
}
