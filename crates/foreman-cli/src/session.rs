use anyhow::Context;
use foreman_core::config::Config;
use foreman_core::github::GitHubClient;
use foreman_core::{io, paths, Orchestrator, Store};
use llm_agent::ProviderClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Data directory plus the effective config (file values with environment
/// overrides applied).
pub struct Session {
    pub data_dir: PathBuf,
    pub config: Config,
}

impl Session {
    /// Priority: `--data-dir` / `FOREMAN_HOME`, then `~/.foreman`.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = paths::data_dir(explicit)?;
        let config = Config::load_with_env(&data_dir)
            .with_context(|| format!("failed to load config from {}", data_dir.display()))?;
        Ok(Self { data_dir, config })
    }

    pub fn open_store(&self) -> anyhow::Result<Arc<Store>> {
        io::ensure_dir(&self.data_dir)?;
        let path = self.config.db_path(&self.data_dir);
        let store = Store::open(&path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Ok(Arc::new(store))
    }

    pub fn provider(&self) -> Arc<ProviderClient> {
        Arc::new(ProviderClient::new(self.config.provider_config()))
    }

    /// An orchestrator over the configured provider and GitHub clients.
    pub fn orchestrator(&self, store: Arc<Store>) -> Orchestrator {
        let github = Arc::new(GitHubClient::new(
            self.config.github.api_base.clone(),
            self.config.github.token.clone(),
        ));
        Orchestrator::new(store, self.provider(), github, self.config.orchestration.clone())
    }
}

/// Run `fut` to completion on a fresh multi-threaded runtime.
pub fn block_on<F: std::future::Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new()?;
    Ok(rt.block_on(fut))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn explicit_data_dir_wins() {
        let dir = TempDir::new().unwrap();
        let session = Session::resolve(Some(dir.path())).unwrap();
        assert_eq!(session.data_dir, dir.path());
        assert_eq!(session.config.orchestration.task_cap, 50);
    }

    #[test]
    fn store_lives_under_the_data_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        let session = Session::resolve(Some(&nested)).unwrap();
        session.open_store().unwrap();
        assert!(nested.join(paths::DB_FILE).exists());
    }
}
