use std::path::PathBuf;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use foreman_core::github::{parse_repo_url, PullRequest, RepoHost, RepoSlug};
use foreman_core::model::{Insight, NewProject, Project, Task};
use foreman_core::orchestrator::DEFAULT_MORE_TASKS;
use foreman_core::scanner::{import_scan, ScanImport};
use foreman_core::{projects, AnalysisSummary, GenerationSummary, Store};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::join_error;
use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A project with its board and insights.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub tasks: Vec<Task>,
    pub insights: Vec<Insight>,
}

impl ProjectDetail {
    fn load(store: &Store, project: Project) -> foreman_core::Result<Self> {
        Ok(Self {
            tasks: store.list_tasks(&project.id)?,
            insights: store.list_insights(&project.id)?,
            project,
        })
    }
}

/// Either `{action: "scan", dirPath}` or the fields of a single project.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectBody {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub dir_path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub parent_project_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreateProjectResponse {
    Scan(ScanImport),
    Single(Box<ProjectDetail>),
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateTasksBody {
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRepositoryBody {
    #[serde(default)]
    pub source_project_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// GET /api/projects: every project with its tasks and insights.
pub async fn list_projects(
    State(app): State<AppState>,
) -> Result<Json<Vec<ProjectDetail>>, AppError> {
    let store = app.store.clone();
    let result = tokio::task::spawn_blocking(move || {
        store
            .list_projects()?
            .into_iter()
            .map(|p| ProjectDetail::load(&store, p))
            .collect::<foreman_core::Result<Vec<_>>>()
    })
    .await
    .map_err(join_error)??;
    Ok(Json(result))
}

/// POST /api/projects: create one project, or scan a directory and analyze
/// every new repository in the background.
pub async fn create_project(
    State(app): State<AppState>,
    Json(body): Json<CreateProjectBody>,
) -> Result<Json<CreateProjectResponse>, AppError> {
    if body.action.as_deref() == Some("scan") {
        let dir = body
            .dir_path
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| AppError::bad_request("dirPath is required for a scan"))?;
        let import = import_scan(&app.store, &PathBuf::from(dir)).await?;
        info!(
            created = import.created.len(),
            skipped = import.skipped.len(),
            "scan imported"
        );
        for id in &import.to_analyze {
            app.spawn_analysis(id.clone());
        }
        return Ok(Json(CreateProjectResponse::Scan(import)));
    }

    let (name, path) = match (body.name, body.path) {
        (Some(name), Some(path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            (name, path)
        }
        _ => return Err(AppError::bad_request("name and path are required")),
    };
    let input = NewProject {
        name,
        path,
        description: body.description,
        repo_url: body.repo_url,
        parent_project_id: body.parent_project_id,
    };
    let store = app.store.clone();
    let detail = tokio::task::spawn_blocking(move || {
        let project = projects::create_project(&store, &input)?;
        ProjectDetail::load(&store, project)
    })
    .await
    .map_err(join_error)??;
    Ok(Json(CreateProjectResponse::Single(Box::new(detail))))
}

// ---------------------------------------------------------------------------
// Single project
// ---------------------------------------------------------------------------

/// GET /api/projects/:id
pub async fn get_project(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ProjectDetail>, AppError> {
    let store = app.store.clone();
    let detail = tokio::task::spawn_blocking(move || {
        let project = store.get_project(&id)?;
        ProjectDetail::load(&store, project)
    })
    .await
    .map_err(join_error)??;
    Ok(Json(detail))
}

/// DELETE /api/projects/:id: removes the project and everything it owns.
pub async fn delete_project(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    tokio::task::spawn_blocking(move || store.delete_project(&id))
        .await
        .map_err(join_error)??;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// POST /api/projects/:id/analyze: run the full pipeline and wait for it.
pub async fn analyze_project(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisSummary>, AppError> {
    let summary = app.orchestrator.orchestrate_project_analysis(&id).await?;
    Ok(Json(summary))
}

/// POST /api/projects/:id/generate-tasks: body `{count?}`, default 20.
pub async fn generate_tasks(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<GenerationSummary>, AppError> {
    let body: GenerateTasksBody = if body.is_empty() {
        GenerateTasksBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::bad_request(format!("invalid body: {e}")))?
    };
    let count = body.count.unwrap_or(DEFAULT_MORE_TASKS);
    let summary = app.orchestrator.generate_more_tasks(&id, count).await?;
    Ok(Json(summary))
}

/// POST /api/projects/:id/add-repository: body `{sourceProjectId}`.
pub async fn add_repository(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AddRepositoryBody>,
) -> Result<Json<Project>, AppError> {
    let source = body
        .source_project_id
        .ok_or_else(|| AppError::bad_request("sourceProjectId is required"))?;
    let store = app.store.clone();
    let merged =
        tokio::task::spawn_blocking(move || projects::merge_repository(&store, &id, &source))
            .await
            .map_err(join_error)??;
    Ok(Json(merged))
}

fn github_slug(project: &Project) -> Option<RepoSlug> {
    match (&project.github_owner, &project.github_repo) {
        (Some(owner), Some(repo)) => Some(RepoSlug {
            owner: owner.clone(),
            repo: repo.clone(),
        }),
        _ => project.repo_url.as_deref().and_then(parse_repo_url),
    }
}

/// GET /api/projects/:id/pull-requests: open pull requests on GitHub.
pub async fn pull_requests(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PullRequest>>, AppError> {
    let project = app.store.get_project(&id)?;
    let slug = github_slug(&project)
        .ok_or_else(|| AppError::bad_request("project does not have GitHub information"))?;
    let prs = app.github.open_pull_requests(&slug).await?;
    Ok(Json(prs))
}
