use axum::extract::{Path, Query, State};
use axum::Json;
use foreman_core::knowledge::{self, DocumentInput};
use foreman_core::model::{KbDocument, KbDocumentUpdate, KbTag};
use serde::Deserialize;

use super::join_error;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub project_id: Option<String>,
    pub tag: Option<String>,
    /// Case-insensitive match on title or content.
    pub search: Option<String>,
}

/// A markdown file sent as JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadBody {
    pub filename: String,
    pub content: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn matches_search(doc: &KbDocument, needle: &str) -> bool {
    doc.title.to_lowercase().contains(needle) || doc.content.to_lowercase().contains(needle)
}

/// GET /api/knowledge-base?projectId=&tag=&search=
pub async fn list_documents(
    State(app): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<KbDocument>>, AppError> {
    let needle = query
        .search
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());
    let store = app.store.clone();
    let mut docs = tokio::task::spawn_blocking(move || {
        store.list_documents(query.project_id.as_deref(), query.tag.as_deref())
    })
    .await
    .map_err(join_error)??;
    if let Some(needle) = needle {
        docs.retain(|d| matches_search(d, &needle));
    }
    Ok(Json(docs))
}

/// POST /api/knowledge-base: a hand-written document.
pub async fn create_document(
    State(app): State<AppState>,
    Json(body): Json<DocumentInput>,
) -> Result<Json<KbDocument>, AppError> {
    if body.title.trim().is_empty() || body.content.trim().is_empty() {
        return Err(AppError::bad_request("title and content are required"));
    }
    let store = app.store.clone();
    let doc = tokio::task::spawn_blocking(move || knowledge::create_manual(&store, body))
        .await
        .map_err(join_error)??;
    Ok(Json(doc))
}

/// POST /api/knowledge-base/upload
pub async fn upload_document(
    State(app): State<AppState>,
    Json(body): Json<UploadBody>,
) -> Result<Json<KbDocument>, AppError> {
    let doc = knowledge::upload(
        &app.store,
        app.orchestrator.generator().as_ref(),
        &body.filename,
        body.content,
        body.project_id,
        body.tags,
    )
    .await?;
    Ok(Json(doc))
}

/// GET /api/knowledge-base/:slug
pub async fn get_document(
    State(app): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<KbDocument>, AppError> {
    let store = app.store.clone();
    let doc = tokio::task::spawn_blocking(move || store.get_document(&slug))
        .await
        .map_err(join_error)??;
    Ok(Json(doc))
}

/// PATCH /api/knowledge-base/:slug: the slug stays put when the title
/// changes.
pub async fn update_document(
    State(app): State<AppState>,
    Path(slug): Path<String>,
    Json(body): Json<KbDocumentUpdate>,
) -> Result<Json<KbDocument>, AppError> {
    let store = app.store.clone();
    let doc = tokio::task::spawn_blocking(move || store.update_document(&slug, &body))
        .await
        .map_err(join_error)??;
    Ok(Json(doc))
}

/// DELETE /api/knowledge-base/:slug
pub async fn delete_document(
    State(app): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let store = app.store.clone();
    tokio::task::spawn_blocking(move || store.delete_document(&slug))
        .await
        .map_err(join_error)??;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/knowledge-base/tags: every tag with its document count.
pub async fn list_tags(State(app): State<AppState>) -> Result<Json<Vec<KbTag>>, AppError> {
    let store = app.store.clone();
    let tags = tokio::task::spawn_blocking(move || store.list_tags())
        .await
        .map_err(join_error)??;
    Ok(Json(tags))
}
