use axum::extract::{Path, State};
use axum::Json;
use foreman_core::model::{Agent, AgentUpdate, NewAgent};
use foreman_core::personas;

use super::join_error;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/agents: the built-in persona catalog.
pub async fn list_catalog() -> Json<Vec<NewAgent>> {
    Json(
        personas::catalog()
            .iter()
            .map(|p| p.to_new_agent())
            .collect(),
    )
}

/// GET /api/projects/:id/agents: all of a project's personas, active or not.
pub async fn list_project_agents(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<Agent>>, AppError> {
    let store = app.store.clone();
    let agents = tokio::task::spawn_blocking(move || {
        store.get_project(&project_id)?;
        store.list_agents(&project_id, false)
    })
    .await
    .map_err(join_error)??;
    Ok(Json(agents))
}

/// POST /api/projects/:id/agents: add a custom persona.
pub async fn create_agent(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
    Json(mut body): Json<NewAgent>,
) -> Result<Json<Agent>, AppError> {
    personas::validate_agent_type(&body.agent_type)?;
    if body.name.trim().is_empty() || body.system_prompt.trim().is_empty() {
        return Err(AppError::bad_request("name and systemPrompt are required"));
    }
    body.is_default = false;
    let store = app.store.clone();
    let agent = tokio::task::spawn_blocking(move || store.create_agent(&project_id, &body))
        .await
        .map_err(join_error)??;
    Ok(Json(agent))
}

/// GET /api/agents/:id
pub async fn get_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Agent>, AppError> {
    let store = app.store.clone();
    let agent = tokio::task::spawn_blocking(move || store.get_agent(&id))
        .await
        .map_err(join_error)??;
    Ok(Json(agent))
}

/// PATCH /api/agents/:id: only the fields present are changed.
pub async fn update_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AgentUpdate>,
) -> Result<Json<Agent>, AppError> {
    let store = app.store.clone();
    let agent = tokio::task::spawn_blocking(move || store.update_agent(&id, &body))
        .await
        .map_err(join_error)??;
    Ok(Json(agent))
}

/// DELETE /api/agents/:id
pub async fn delete_agent(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    tokio::task::spawn_blocking(move || store.delete_agent(&id))
        .await
        .map_err(join_error)??;
    Ok(Json(serde_json::json!({ "success": true })))
}
