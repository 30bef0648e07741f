use crate::error::{ForemanError, Result};
use crate::paths;
use llm_agent::provider::{
    ANTHROPIC_BASE_URL, DEFAULT_ANTHROPIC_MODEL, DEFAULT_MAX_TOKENS, DEFAULT_OPENAI_MODEL,
    OPENAI_BASE_URL,
};
use llm_agent::{is_valid_api_key, Provider, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// AiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,
    #[serde(default = "default_openai_model")]
    pub openai_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
}

fn default_anthropic_model() -> String {
    DEFAULT_ANTHROPIC_MODEL.to_string()
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_anthropic_base_url() -> String {
    ANTHROPIC_BASE_URL.to_string()
}

fn default_openai_base_url() -> String {
    OPENAI_BASE_URL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: None,
            anthropic_model: default_anthropic_model(),
            openai_model: default_openai_model(),
            anthropic_api_key: None,
            openai_api_key: None,
            anthropic_base_url: default_anthropic_base_url(),
            openai_base_url: default_openai_base_url(),
            default_max_tokens: default_max_tokens(),
        }
    }
}

// ---------------------------------------------------------------------------
// GitHubConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_github_api")]
    pub api_base: String,
}

fn default_github_api() -> String {
    crate::github::GITHUB_API_BASE.to_string()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: default_github_api(),
        }
    }
}

// ---------------------------------------------------------------------------
// OrchestrationConfig
// ---------------------------------------------------------------------------

/// What happens to the other personas when one persona's generation call
/// fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOutPolicy {
    /// The whole run fails and nothing from the persona stage is persisted.
    #[default]
    AllOrNothing,
    /// Failed personas are reported; successful ones are persisted.
    Isolate,
}

impl std::fmt::Display for FanOutPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            FanOutPolicy::AllOrNothing => "all_or_nothing",
            FanOutPolicy::Isolate => "isolate",
        })
    }
}

impl std::str::FromStr for FanOutPolicy {
    type Err = ForemanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().replace('-', "_").as_str() {
            "all_or_nothing" => Ok(FanOutPolicy::AllOrNothing),
            "isolate" => Ok(FanOutPolicy::Isolate),
            other => Err(ForemanError::Config(format!(
                "unknown fan_out policy '{other}' (expected all_or_nothing or isolate)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    #[serde(default = "default_task_cap")]
    pub task_cap: usize,
    #[serde(default = "default_markdown_task_cap")]
    pub markdown_task_cap: usize,
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f64,
    #[serde(default = "default_agent_max_tokens")]
    pub agent_max_tokens: u32,
    #[serde(default)]
    pub fan_out: FanOutPolicy,
}

fn default_task_cap() -> usize {
    50
}

fn default_markdown_task_cap() -> usize {
    10
}

fn default_duplicate_threshold() -> f64 {
    crate::similarity::DEFAULT_DUPLICATE_THRESHOLD
}

fn default_agent_max_tokens() -> u32 {
    crate::runner::DEFAULT_AGENT_MAX_TOKENS
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            task_cap: default_task_cap(),
            markdown_task_cap: default_markdown_task_cap(),
            duplicate_threshold: default_duplicate_threshold(),
            agent_max_tokens: default_agent_max_tokens(),
            fan_out: FanOutPolicy::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Load `<data_dir>/config.yaml`, falling back to defaults when absent.
    /// Environment overrides are not applied; see [`Config::apply_env`].
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = paths::config_path(data_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&data)?)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let path = paths::config_path(data_dir);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Load and then apply environment overrides.
    pub fn load_with_env(data_dir: &Path) -> Result<Self> {
        let mut cfg = Self::load(data_dir)?;
        cfg.apply_env(|name| std::env::var(name).ok());
        Ok(cfg)
    }

    /// Apply `AI_PROVIDER`, `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`,
    /// `ANTHROPIC_MODEL`, `OPENAI_MODEL` and `GITHUB_TOKEN`.
    ///
    /// `lookup` abstracts the environment so tests stay hermetic.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(p) = var("AI_PROVIDER") {
            match p.parse() {
                Ok(provider) => self.ai.provider = Some(provider),
                Err(e) => tracing::warn!("ignoring AI_PROVIDER: {e}"),
            }
        }
        if let Some(k) = var("ANTHROPIC_API_KEY") {
            self.ai.anthropic_api_key = Some(k);
        }
        if let Some(k) = var("OPENAI_API_KEY") {
            self.ai.openai_api_key = Some(k);
        }
        if let Some(m) = var("ANTHROPIC_MODEL") {
            self.ai.anthropic_model = m;
        }
        if let Some(m) = var("OPENAI_MODEL") {
            self.ai.openai_model = m;
        }
        if let Some(t) = var("GITHUB_TOKEN") {
            self.github.token = Some(t);
        }
    }

    pub fn db_path(&self, data_dir: &Path) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| paths::default_db_path(data_dir))
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            provider: self.ai.provider,
            anthropic_api_key: self.ai.anthropic_api_key.clone(),
            openai_api_key: self.ai.openai_api_key.clone(),
            anthropic_model: self.ai.anthropic_model.clone(),
            openai_model: self.ai.openai_model.clone(),
            anthropic_base_url: self.ai.anthropic_base_url.clone(),
            openai_base_url: self.ai.openai_base_url.clone(),
            max_tokens: self.ai.default_max_tokens,
        }
    }

    /// Set a dotted key such as `ai.provider` or `orchestration.task_cap`.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let optional = |v: &str| {
            let v = v.trim();
            (!v.is_empty()).then(|| v.to_string())
        };
        let number = |v: &str| -> Result<u64> {
            v.trim()
                .parse()
                .map_err(|_| ForemanError::Config(format!("{key} expects a number, got '{v}'")))
        };
        match key {
            "ai.provider" => {
                self.ai.provider = match optional(value) {
                    Some(p) => Some(
                        p.parse()
                            .map_err(|e: llm_agent::LlmError| ForemanError::Config(e.to_string()))?,
                    ),
                    None => None,
                }
            }
            "ai.anthropic_model" => self.ai.anthropic_model = value.trim().to_string(),
            "ai.openai_model" => self.ai.openai_model = value.trim().to_string(),
            "ai.anthropic_api_key" => self.ai.anthropic_api_key = optional(value),
            "ai.openai_api_key" => self.ai.openai_api_key = optional(value),
            "ai.default_max_tokens" => self.ai.default_max_tokens = to_u32(key, number(value)?)?,
            "github.token" => self.github.token = optional(value),
            "github.api_base" => self.github.api_base = value.trim().to_string(),
            "orchestration.task_cap" => self.orchestration.task_cap = number(value)? as usize,
            "orchestration.markdown_task_cap" => {
                self.orchestration.markdown_task_cap = number(value)? as usize
            }
            "orchestration.duplicate_threshold" => {
                let t: f64 = value.trim().parse().map_err(|_| {
                    ForemanError::Config(format!("{key} expects a number, got '{value}'"))
                })?;
                if !(0.0..=1.0).contains(&t) {
                    return Err(ForemanError::Config(format!(
                        "{key} must be between 0 and 1"
                    )));
                }
                self.orchestration.duplicate_threshold = t;
            }
            "orchestration.agent_max_tokens" => {
                self.orchestration.agent_max_tokens = to_u32(key, number(value)?)?
            }
            "orchestration.fan_out" => self.orchestration.fan_out = value.parse()?,
            "database.path" => self.database.path = optional(value).map(PathBuf::from),
            other => return Err(ForemanError::Config(format!("unknown config key '{other}'"))),
        }
        Ok(())
    }

    /// A view safe to print or return over HTTP.
    pub fn masked(&self) -> MaskedSettings {
        let provider_config = self.provider_config();
        MaskedSettings {
            provider: self.ai.provider,
            active_provider: provider_config.default_provider(),
            anthropic_model: self.ai.anthropic_model.clone(),
            openai_model: self.ai.openai_model.clone(),
            anthropic_api_key: self.ai.anthropic_api_key.as_deref().map(mask_key),
            openai_api_key: self.ai.openai_api_key.as_deref().map(mask_key),
            github_token: self.github.token.as_deref().map(mask_key),
            has_anthropic_key: is_valid_api_key(self.ai.anthropic_api_key.as_deref()),
            has_openai_key: is_valid_api_key(self.ai.openai_api_key.as_deref()),
            has_github_token: self.github.token.as_deref().is_some_and(|t| !t.trim().is_empty()),
            orchestration: self.orchestration.clone(),
        }
    }
}

fn to_u32(key: &str, n: u64) -> Result<u32> {
    u32::try_from(n).map_err(|_| ForemanError::Config(format!("{key} is out of range")))
}

// ---------------------------------------------------------------------------
// Masked settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskedSettings {
    pub provider: Option<Provider>,
    pub active_provider: Provider,
    pub anthropic_model: String,
    pub openai_model: String,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub github_token: Option<String>,
    pub has_anthropic_key: bool,
    pub has_openai_key: bool,
    pub has_github_token: bool,
    pub orchestration: OrchestrationConfig,
}

/// Keep the first and last four characters: `sk-a…wxyz`. Short keys are
/// fully hidden.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
