pub mod agents;
pub mod events;
pub mod knowledge;
pub mod projects;
pub mod settings;
pub mod tasks;

use crate::error::AppError;

/// Map a failed `spawn_blocking` join into a 500.
pub(crate) fn join_error(e: tokio::task::JoinError) -> AppError {
    AppError(anyhow::anyhow!("task join error: {e}"))
}
