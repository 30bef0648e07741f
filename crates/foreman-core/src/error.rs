use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForemanError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("agent type '{agent_type}' already exists for project {project_id}")]
    AgentExists {
        project_id: String,
        agent_type: String,
    },

    #[error("a project already exists at {0}")]
    ProjectExists(String),

    #[error("repository '{0}' is already part of this project")]
    RepositoryExists(String),

    #[error("invalid agent type '{0}': must be lowercase alphanumeric with '-' or '_'")]
    InvalidAgentType(String),

    #[error("invalid priority: {0} (expected low, medium or high)")]
    InvalidPriority(String),

    #[error("invalid status: {0} (expected todo, in_progress or done)")]
    InvalidStatus(String),

    #[error("invalid source: {0} (expected manual, upload, markdown or mcp)")]
    InvalidSource(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("analysis already in progress for project {0}")]
    AnalysisInProgress(String),

    #[error("generation failed: {0}")]
    Generation(#[from] llm_agent::LlmError),

    #[error("GitHub request failed: {0}")]
    GitHub(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("home directory not found: set HOME or FOREMAN_HOME")]
    HomeNotFound,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ForemanError>;
