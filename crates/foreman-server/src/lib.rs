pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use std::path::PathBuf;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        // Projects
        .route(
            "/api/projects",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/api/projects/{id}",
            get(routes::projects::get_project).delete(routes::projects::delete_project),
        )
        .route(
            "/api/projects/{id}/analyze",
            post(routes::projects::analyze_project),
        )
        .route(
            "/api/projects/{id}/generate-tasks",
            post(routes::projects::generate_tasks),
        )
        .route(
            "/api/projects/{id}/add-repository",
            post(routes::projects::add_repository),
        )
        .route(
            "/api/projects/{id}/pull-requests",
            get(routes::projects::pull_requests),
        )
        // Agents
        .route("/api/agents", get(routes::agents::list_catalog))
        .route(
            "/api/projects/{id}/agents",
            get(routes::agents::list_project_agents).post(routes::agents::create_agent),
        )
        .route(
            "/api/agents/{id}",
            get(routes::agents::get_agent)
                .patch(routes::agents::update_agent)
                .delete(routes::agents::delete_agent),
        )
        // Tasks
        .route(
            "/api/projects/{id}/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/api/tasks/{id}",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        // Knowledge base
        .route(
            "/api/knowledge-base",
            get(routes::knowledge::list_documents).post(routes::knowledge::create_document),
        )
        .route(
            "/api/knowledge-base/upload",
            post(routes::knowledge::upload_document),
        )
        .route("/api/knowledge-base/tags", get(routes::knowledge::list_tags))
        .route(
            "/api/knowledge-base/{slug}",
            get(routes::knowledge::get_document)
                .patch(routes::knowledge::update_document)
                .delete(routes::knowledge::delete_document),
        )
        // Settings
        .route(
            "/api/settings",
            get(routes::settings::get_settings).put(routes::settings::put_settings),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the data directory and serve the API on `port`.
pub async fn serve(data_dir: PathBuf, port: u16, open_browser: bool) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(data_dir, listener, open_browser).await
}

/// Serve on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    data_dir: PathBuf,
    listener: tokio::net::TcpListener,
    open_browser: bool,
) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app_state = state::AppState::open(data_dir)?;
    let app = build_router(app_state);

    tracing::info!("foreman API listening on http://localhost:{actual_port}");

    if open_browser {
        let url = format!("http://localhost:{actual_port}/api/projects");
        if let Err(e) = open::that(&url) {
            tracing::warn!("could not open browser: {e}");
        }
    }

    axum::serve(listener, app).await?;
    Ok(())
}
