use axum::extract::{Path, State};
use axum::Json;
use foreman_core::model::{NewTask, Task, TaskUpdate};

use super::join_error;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/projects/:id/tasks: the board in order.
pub async fn list_tasks(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<Task>>, AppError> {
    let store = app.store.clone();
    let tasks = tokio::task::spawn_blocking(move || {
        store.get_project(&project_id)?;
        store.list_tasks(&project_id)
    })
    .await
    .map_err(join_error)??;
    Ok(Json(tasks))
}

/// POST /api/projects/:id/tasks: a hand-written task, appended to the
/// board unless `order` is given.
pub async fn create_task(
    State(app): State<AppState>,
    Path(project_id): Path<String>,
    Json(body): Json<NewTask>,
) -> Result<Json<Task>, AppError> {
    if body.title.trim().is_empty() {
        return Err(AppError::bad_request("title is required"));
    }
    let store = app.store.clone();
    let task = tokio::task::spawn_blocking(move || store.create_task(&project_id, &body))
        .await
        .map_err(join_error)??;
    Ok(Json(task))
}

/// GET /api/tasks/:id
pub async fn get_task(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    let store = app.store.clone();
    let task = tokio::task::spawn_blocking(move || store.get_task(&id))
        .await
        .map_err(join_error)??;
    Ok(Json(task))
}

/// PATCH /api/tasks/:id: status moves, edits and reordering.
pub async fn update_task(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<TaskUpdate>,
) -> Result<Json<Task>, AppError> {
    let store = app.store.clone();
    let task = tokio::task::spawn_blocking(move || store.update_task(&id, &body))
        .await
        .map_err(join_error)??;
    Ok(Json(task))
}

/// DELETE /api/tasks/:id
pub async fn delete_task(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    tokio::task::spawn_blocking(move || store.delete_task(&id))
        .await
        .map_err(join_error)??;
    Ok(Json(serde_json::json!({ "success": true })))
}
