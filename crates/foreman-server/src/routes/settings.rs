use std::collections::BTreeMap;
use std::sync::PoisonError;

use axum::extract::State;
use axum::Json;
use foreman_core::config::{Config, MaskedSettings};
use serde::Deserialize;
use tracing::info;

use super::join_error;
use crate::error::AppError;
use crate::state::AppState;

/// Shorthand fields for the common keys, plus any dotted config key under
/// `set` (e.g. `"orchestration.task_cap": "30"`). Empty strings clear a key.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub anthropic_key: Option<String>,
    #[serde(default)]
    pub openai_key: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub set: BTreeMap<String, String>,
}

impl SettingsUpdate {
    fn assignments(self) -> Vec<(String, String)> {
        let shorthand = [
            ("ai.provider", self.provider),
            ("ai.anthropic_api_key", self.anthropic_key),
            ("ai.openai_api_key", self.openai_key),
            ("github.token", self.github_token),
        ];
        shorthand
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
            .chain(self.set)
            .collect()
    }
}

/// GET /api/settings: keys masked, plus which providers are usable.
pub async fn get_settings(State(app): State<AppState>) -> Json<MaskedSettings> {
    let config = app.config.lock().unwrap_or_else(PoisonError::into_inner);
    Json(config.masked())
}

/// PUT /api/settings: write the config file and apply the result to the
/// running clients.
pub async fn put_settings(
    State(app): State<AppState>,
    Json(body): Json<SettingsUpdate>,
) -> Result<Json<MaskedSettings>, AppError> {
    let assignments = body.assignments();
    let data_dir = app.data_dir.clone();
    // Only the file's own values are persisted; environment overrides are
    // layered back on afterwards.
    let effective = tokio::task::spawn_blocking(move || {
        let mut file_config = Config::load(&data_dir)?;
        for (key, value) in &assignments {
            file_config.set(key, value)?;
        }
        file_config.save(&data_dir)?;
        let mut effective = file_config;
        effective.apply_env(|name| std::env::var(name).ok());
        Ok::<_, foreman_core::ForemanError>(effective)
    })
    .await
    .map_err(join_error)??;

    if let Some(provider) = &app.provider {
        provider.reconfigure(effective.provider_config());
    }
    app.github.set_token(effective.github.token.clone());
    app.orchestrator.set_settings(effective.orchestration.clone());
    let masked = effective.masked();
    *app.config.lock().unwrap_or_else(PoisonError::into_inner) = effective;
    info!("settings updated");
    Ok(Json(masked))
}
