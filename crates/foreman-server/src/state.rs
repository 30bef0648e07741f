use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use foreman_core::config::Config;
use foreman_core::github::GitHubClient;
use foreman_core::{AnalysisSummary, Orchestrator, Store};
use llm_agent::{Generate, ProviderClient};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Outcome of a background analysis, pushed to `/api/events` subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AnalysisEvent {
    Completed {
        #[serde(rename = "projectId")]
        project_id: String,
        summary: Box<AnalysisSummary>,
    },
    Failed {
        #[serde(rename = "projectId")]
        project_id: String,
        error: String,
    },
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub store: Arc<Store>,
    pub orchestrator: Arc<Orchestrator>,
    pub github: Arc<GitHubClient>,
    /// Present when generation goes through a real provider client, so
    /// settings changes can reach it.
    pub provider: Option<Arc<ProviderClient>>,
    /// Effective configuration: the config file with environment overrides.
    pub config: Arc<Mutex<Config>>,
    pub event_tx: broadcast::Sender<AnalysisEvent>,
}

impl AppState {
    /// Load the config under `data_dir`, open the database and wire up the
    /// provider and GitHub clients.
    pub fn open(data_dir: PathBuf) -> foreman_core::Result<Self> {
        let config = Config::load_with_env(&data_dir)?;
        foreman_core::io::ensure_dir(&data_dir)?;
        let store = Arc::new(Store::open(&config.db_path(&data_dir))?);
        let provider = Arc::new(ProviderClient::new(config.provider_config()));
        let github = Arc::new(GitHubClient::new(
            config.github.api_base.clone(),
            config.github.token.clone(),
        ));
        let mut state = Self::from_parts(data_dir, config, store, provider.clone(), github);
        state.provider = Some(provider);
        Ok(state)
    }

    /// Assemble state around an existing store and generator.
    pub fn from_parts(
        data_dir: PathBuf,
        config: Config,
        store: Arc<Store>,
        generator: Arc<dyn Generate>,
        github: Arc<GitHubClient>,
    ) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            generator,
            github.clone(),
            config.orchestration.clone(),
        ));
        let (event_tx, _) = broadcast::channel(64);
        Self {
            data_dir,
            store,
            orchestrator,
            github,
            provider: None,
            config: Arc::new(Mutex::new(config)),
            event_tx,
        }
    }

    /// Run a full analysis in the background and broadcast its outcome.
    pub fn spawn_analysis(&self, project_id: String) {
        let orchestrator = self.orchestrator.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let event = match orchestrator.orchestrate_project_analysis(&project_id).await {
                Ok(summary) => {
                    info!(project_id, tasks = summary.tasks_created, "background analysis finished");
                    AnalysisEvent::Completed {
                        project_id,
                        summary: Box::new(summary),
                    }
                }
                Err(e) => {
                    warn!(project_id, "background analysis failed: {e}");
                    AnalysisEvent::Failed {
                        project_id,
                        error: e.to_string(),
                    }
                }
            };
            // no subscribers is fine
            let _ = tx.send(event);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_agent::ScriptedGenerator;

    #[tokio::test]
    async fn background_failure_is_broadcast() {
        let state = AppState::from_parts(
            PathBuf::from("/tmp/foreman-test"),
            Config::default(),
            Arc::new(Store::in_memory().unwrap()),
            Arc::new(ScriptedGenerator::new("")),
            Arc::new(GitHubClient::new("http://127.0.0.1:9", None)),
        );
        let mut rx = state.event_tx.subscribe();
        state.spawn_analysis("missing".into());
        match rx.recv().await.unwrap() {
            AnalysisEvent::Failed { project_id, error } => {
                assert_eq!(project_id, "missing");
                assert!(error.contains("not found"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn events_serialize_with_status_tag() {
        let json = serde_json::to_value(AnalysisEvent::Failed {
            project_id: "p1".into(),
            error: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["projectId"], "p1");
    }
}
