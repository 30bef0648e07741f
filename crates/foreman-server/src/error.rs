use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use foreman_core::ForemanError;
use llm_agent::LlmError;

// ---------------------------------------------------------------------------
// Sentinels for statuses no ForemanError variant carries
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Error returned by every handler. Rendered as `{"error": "<message>"}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    pub fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<BadRequestError>().is_some() {
            return StatusCode::BAD_REQUEST;
        }
        match self.0.downcast_ref::<ForemanError>() {
            Some(e) => foreman_status(e),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn foreman_status(e: &ForemanError) -> StatusCode {
    match e {
        ForemanError::ProjectNotFound(_)
        | ForemanError::AgentNotFound(_)
        | ForemanError::TaskNotFound(_)
        | ForemanError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
        ForemanError::AgentExists { .. }
        | ForemanError::ProjectExists(_)
        | ForemanError::RepositoryExists(_)
        | ForemanError::AnalysisInProgress(_) => StatusCode::CONFLICT,
        ForemanError::InvalidAgentType(_)
        | ForemanError::InvalidPriority(_)
        | ForemanError::InvalidStatus(_)
        | ForemanError::InvalidSource(_)
        | ForemanError::InvalidUpload(_)
        | ForemanError::Config(_) => StatusCode::BAD_REQUEST,
        ForemanError::Generation(
            LlmError::MissingKey(_) | LlmError::NoValidKeys | LlmError::UnknownProvider(_),
        ) => StatusCode::UNPROCESSABLE_ENTITY,
        ForemanError::Generation(_) | ForemanError::GitHub(_) => StatusCode::BAD_GATEWAY,
        ForemanError::HomeNotFound
        | ForemanError::Io(_)
        | ForemanError::Yaml(_)
        | ForemanError::Json(_)
        | ForemanError::Sqlite(_)
        | ForemanError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {:#}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
