use std::sync::Arc;

use axum::http::StatusCode;
use foreman_core::config::Config;
use foreman_core::github::GitHubClient;
use foreman_core::Store;
use foreman_server::state::AppState;
use http_body_util::BodyExt;
use llm_agent::{Generate, ScriptedGenerator};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ANALYSIS_REPLY: &str = r#"{"summary": "A shop", "techStack": ["rust"], "projectType": "web app"}"#;

const PERSONA_REPLY: &str = r#"{"insights": ["Checkout is slow"],
    "tasks": [{"title": "Cache product listings", "description": "Add a cache",
               "priority": "high", "reasoning": "Faster pages"}],
    "recommendations": []}"#;

fn scripted() -> ScriptedGenerator {
    ScriptedGenerator::new(PERSONA_REPLY).when("expert software project analyst", ANALYSIS_REPLY)
}

/// State over a throwaway data dir and an in-memory store.
fn test_state(github_base: &str, generator: Arc<dyn Generate>) -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let state = AppState::from_parts(
        dir.path().to_path_buf(),
        Config::default(),
        Arc::new(Store::in_memory().unwrap()),
        generator,
        Arc::new(GitHubClient::new(github_base, None)),
    );
    (dir, state)
}

fn offline_state() -> (TempDir, AppState) {
    test_state("http://127.0.0.1:9", Arc::new(scripted()))
}

async fn send(state: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap())),
        None => builder.body(axum::body::Body::empty()),
    }
    .unwrap();
    let response = foreman_server::build_router(state.clone())
        .oneshot(req)
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

async fn get(state: &AppState, uri: &str) -> (StatusCode, Value) {
    send(state, "GET", uri, None).await
}

async fn post_json(state: &AppState, uri: &str, body: Value) -> (StatusCode, Value) {
    send(state, "POST", uri, Some(body)).await
}

async fn create_project(state: &AppState, name: &str, path: &str) -> String {
    let (status, json) = post_json(
        state,
        "/api/projects",
        json!({ "name": name, "path": path, "repoUrl": format!("https://github.com/acme/{name}") }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["id"].as_str().unwrap().to_string()
}

fn git_repo(root: &std::path::Path, name: &str) {
    let git = root.join(name).join(".git");
    std::fs::create_dir_all(&git).unwrap();
    std::fs::write(
        git.join("config"),
        format!("[remote \"origin\"]\n\turl = git@github.com:acme/{name}.git\n"),
    )
    .unwrap();
    std::fs::write(
        root.join(name).join("README.md"),
        format!("# {name}\n\nPart of the shop platform.\n"),
    )
    .unwrap();
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

#[tokio::test]
async fn projects_start_empty() {
    let (_dir, state) = offline_state();
    let (status, json) = get(&state, "/api/projects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

#[tokio::test]
async fn created_project_has_default_personas() {
    let (_dir, state) = offline_state();
    let id = create_project(&state, "shop", "/code/shop").await;

    let (status, agents) = get(&state, &format!("/api/projects/{id}/agents")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agents.as_array().unwrap().len(), 7);

    let (status, detail) = get(&state, &format!("/api/projects/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["name"], "shop");
    assert!(detail["tasks"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn missing_fields_and_unknown_ids_are_rejected() {
    let (_dir, state) = offline_state();
    let (status, json) = post_json(&state, "/api/projects", json!({ "name": "shop" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("path"));

    let (status, json) = get(&state, "/api/projects/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].is_string());

    let (status, _) = post_json(&state, "/api/projects", json!({ "action": "scan" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn scan_groups_sibling_repositories_under_a_parent() {
    let (_dir, state) = offline_state();
    let code = TempDir::new().unwrap();
    git_repo(code.path(), "shop-web");
    git_repo(code.path(), "shop-api");
    std::fs::create_dir_all(code.path().join("notes")).unwrap();

    let (status, json) = post_json(
        &state,
        "/api/projects",
        json!({ "action": "scan", "dirPath": code.path() }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["scanned"], 2);
    assert_eq!(json["created"].as_array().unwrap().len(), 2);
    assert_eq!(json["parents"][0]["name"], "shop");

    // a second scan only skips
    let (_, again) = post_json(
        &state,
        "/api/projects",
        json!({ "action": "scan", "dirPath": code.path() }),
    )
    .await;
    assert!(again["created"].as_array().unwrap().is_empty());
    assert_eq!(again["skipped"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn analyze_runs_the_pipeline() {
    let (_dir, state) = offline_state();
    let repo = TempDir::new().unwrap();
    std::fs::write(repo.path().join("README.md"), "# Shop\n\nAn online shop.\n").unwrap();
    let id = create_project(&state, "shop", &repo.path().to_string_lossy()).await;

    let (status, summary) = post_json(&state, &format!("/api/projects/{id}/analyze"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{summary}");
    assert_eq!(summary["agentCount"], 7);
    assert_eq!(summary["analysis"]["projectType"], "web app");
    // all seven personas proposed the same title
    assert_eq!(summary["agentTasks"], 1);
    assert_eq!(summary["totalInsights"], 7);

    let (_, detail) = get(&state, &format!("/api/projects/{id}")).await;
    assert_eq!(detail["aiAnalysis"], "A shop");
    assert_eq!(detail["insights"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn generate_tasks_accepts_an_empty_body() {
    let (_dir, state) = offline_state();
    let id = create_project(&state, "shop", "/code/shop").await;
    let (status, json) = send(&state, "POST", &format!("/api/projects/{id}/generate-tasks"), None).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["tasksGenerated"], 1);
    assert_eq!(json["totalTasks"], 1);
    assert_eq!(json["duplicatesSkipped"], 6);
}

#[tokio::test]
async fn generation_failure_maps_to_bad_gateway() {
    let (_dir, state) = test_state("http://127.0.0.1:9", Arc::new(ScriptedGenerator::failing("down")));
    let id = create_project(&state, "shop", "/code/shop").await;
    let (status, json) = post_json(&state, &format!("/api/projects/{id}/generate-tasks"), json!({ "count": 5 })).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap().contains("down"));
}

#[tokio::test]
async fn add_repository_merges_and_rejects_repeats() {
    let (_dir, state) = offline_state();
    let target = create_project(&state, "shop", "/code/shop").await;
    let source = create_project(&state, "shop-api", "/code/shop-api").await;
    let uri = format!("/api/projects/{target}/add-repository");

    let (status, merged) = post_json(&state, &uri, json!({ "sourceProjectId": source })).await;
    assert_eq!(status, StatusCode::OK, "{merged}");
    assert_eq!(merged["repositories"][0]["name"], "shop-api");

    let (status, _) = get(&state, &format!("/api/projects/{source}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_json(&state, &uri, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pull_requests_come_from_github() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/acme/shop/pulls")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([{
                "number": 12,
                "title": "Add wishlist",
                "state": "open",
                "html_url": "https://github.com/acme/shop/pull/12",
                "created_at": "2024-05-01T00:00:00Z",
                "updated_at": "2024-05-02T00:00:00Z",
                "user": { "login": "dana" }
            }])
            .to_string(),
        )
        .create_async()
        .await;
    let (_dir, state) = test_state(&server.url(), Arc::new(scripted()));
    let id = create_project(&state, "shop", "/code/shop").await;

    let (status, prs) = get(&state, &format!("/api/projects/{id}/pull-requests")).await;
    assert_eq!(status, StatusCode::OK, "{prs}");
    assert_eq!(prs[0]["number"], 12);
    mock.assert_async().await;
}

#[tokio::test]
async fn pull_requests_need_a_github_remote() {
    let (_dir, state) = offline_state();
    let (_, project) = post_json(&state, "/api/projects", json!({ "name": "local", "path": "/code/local" })).await;
    let id = project["id"].as_str().unwrap();
    let (status, _) = get(&state, &format!("/api/projects/{id}/pull-requests")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Agents and tasks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn custom_agents_are_validated() {
    let (_dir, state) = offline_state();
    let id = create_project(&state, "shop", "/code/shop").await;
    let uri = format!("/api/projects/{id}/agents");

    let agent = json!({ "type": "security", "name": "Security", "systemPrompt": "You audit." });
    let (status, created) = post_json(&state, &uri, agent.clone()).await;
    assert_eq!(status, StatusCode::OK, "{created}");
    assert_eq!(created["isDefault"], false);

    let (status, _) = post_json(&state, &uri, agent).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let bad = json!({ "type": "Bad Type", "name": "x", "systemPrompt": "y" });
    let (status, _) = post_json(&state, &uri, bad).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let agent_id = created["id"].as_str().unwrap();
    let (status, updated) = send(
        &state,
        "PATCH",
        &format!("/api/agents/{agent_id}"),
        Some(json!({ "isActive": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["isActive"], false);

    let (status, catalog) = get(&state, "/api/agents").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(catalog.as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn tasks_can_be_created_moved_and_deleted() {
    let (_dir, state) = offline_state();
    let id = create_project(&state, "shop", "/code/shop").await;

    let (status, task) = post_json(
        &state,
        &format!("/api/projects/{id}/tasks"),
        json!({ "title": "Write launch post", "priority": "high" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{task}");
    assert_eq!(task["status"], "todo");
    let task_id = task["id"].as_str().unwrap();

    let (status, moved) = send(
        &state,
        "PATCH",
        &format!("/api/tasks/{task_id}"),
        Some(json!({ "status": "done" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["status"], "done");

    let (status, _) = send(&state, "DELETE", &format!("/api/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&state, &format!("/api/tasks/{task_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

#[tokio::test]
async fn knowledge_base_crud_and_search() {
    let (_dir, state) = offline_state();
    let (status, doc) = post_json(
        &state,
        "/api/knowledge-base",
        json!({ "title": "Deploy Guide", "content": "Use the blue-green rollout.", "tags": ["ops"] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{doc}");
    assert_eq!(doc["slug"], "deploy-guide");
    assert_eq!(doc["source"], "manual");

    let (_, found) = get(&state, "/api/knowledge-base?search=BLUE-GREEN").await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    let (_, none) = get(&state, "/api/knowledge-base?search=canary").await;
    assert!(none.as_array().unwrap().is_empty());
    let (_, tagged) = get(&state, "/api/knowledge-base?tag=ops").await;
    assert_eq!(tagged.as_array().unwrap().len(), 1);

    let (status, tags) = get(&state, "/api/knowledge-base/tags").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tags[0]["name"], "ops");

    let (status, updated) = send(
        &state,
        "PATCH",
        "/api/knowledge-base/deploy-guide",
        Some(json!({ "title": "Deployment Guide" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["slug"], "deploy-guide");
    assert_eq!(updated["title"], "Deployment Guide");

    let (status, _) = send(&state, "DELETE", "/api/knowledge-base/deploy-guide", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(&state, "/api/knowledge-base/deploy-guide").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uploads_must_be_markdown() {
    let (_dir, state) = offline_state();
    let content = "# Runbook\n\nWhat to do when the checkout queue backs up at night.";
    let (status, doc) = post_json(
        &state,
        "/api/knowledge-base/upload",
        json!({ "filename": "runbook.md", "content": content }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{doc}");
    assert_eq!(doc["title"], "Runbook");
    assert_eq!(doc["source"], "upload");

    let (status, _) = post_json(
        &state,
        "/api/knowledge-base/upload",
        json!({ "filename": "runbook.pdf", "content": content }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settings_are_masked_and_persisted() {
    let (dir, state) = offline_state();
    let (status, json) = send(
        &state,
        "PUT",
        "/api/settings",
        Some(json!({
            "openaiKey": "sk-test-1234567890abcdef",
            "set": { "orchestration.task_cap": "30", "orchestration.fan_out": "isolate" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["orchestration"]["task_cap"], 30);
    assert_eq!(json["openaiApiKey"], "sk-t…cdef");
    assert_eq!(state.orchestrator.settings().task_cap, 30);

    let saved = Config::load(dir.path()).unwrap();
    assert_eq!(saved.orchestration.task_cap, 30);

    let (status, _) = send(
        &state,
        "PUT",
        "/api/settings",
        Some(json!({ "set": { "no.such_key": "1" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = get(&state, "/api/settings").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["orchestration"]["fan_out"], "isolate");
}
