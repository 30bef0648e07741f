use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::generate::Generate;
use crate::types::{
    AnthropicRequest, AnthropicResponse, ChatMessage, GenerateOptions, Generation,
    OpenAiRequest, OpenAiResponse, Provider,
};
use crate::{LlmError, Result};

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Prefixes left behind by `.env.example` style templates.
const PLACEHOLDER_PREFIXES: &[&str] = &["your_", "replace_", "insert_", "add_"];

/// Phrases providers use in error bodies when the key itself is the problem.
const AUTH_PHRASES: &[&str] = &[
    "authentication",
    "invalid x-api-key",
    "invalid api key",
    "incorrect api key",
    "invalid_api_key",
    "unauthorized",
];

/// A key is usable when it is non-empty and not a template placeholder.
pub fn is_valid_api_key(key: Option<&str>) -> bool {
    match key.map(str::trim) {
        None | Some("") => false,
        Some(k) => {
            let lower = k.to_ascii_lowercase();
            !PLACEHOLDER_PREFIXES.iter().any(|p| lower.starts_with(p))
        }
    }
}

// ─── ProviderConfig ───────────────────────────────────────────────────────

/// Credentials, models and endpoints for both providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Explicit provider choice. `None` means auto-detect from the keys.
    pub provider: Option<Provider>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_model: String,
    pub anthropic_base_url: String,
    pub openai_base_url: String,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: None,
            anthropic_api_key: None,
            openai_api_key: None,
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            anthropic_base_url: ANTHROPIC_BASE_URL.to_string(),
            openai_base_url: OPENAI_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ProviderConfig {
    /// Build a configuration from `AI_PROVIDER`, `ANTHROPIC_API_KEY`,
    /// `OPENAI_API_KEY`, `ANTHROPIC_MODEL` and `OPENAI_MODEL`.
    ///
    /// An unrecognised `AI_PROVIDER` value is ignored with a warning.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        let mut config = Self::default();
        if let Some(p) = var("AI_PROVIDER") {
            match p.parse() {
                Ok(provider) => config.provider = Some(provider),
                Err(e) => warn!("ignoring AI_PROVIDER: {e}"),
            }
        }
        config.anthropic_api_key = var("ANTHROPIC_API_KEY");
        config.openai_api_key = var("OPENAI_API_KEY");
        if let Some(m) = var("ANTHROPIC_MODEL") {
            config.anthropic_model = m;
        }
        if let Some(m) = var("OPENAI_MODEL") {
            config.openai_model = m;
        }
        config
    }

    /// The key for `provider`, only if it passes [`is_valid_api_key`].
    pub fn key_for(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Claude => self.anthropic_api_key.as_deref(),
            Provider::OpenAi => self.openai_api_key.as_deref(),
        };
        key.filter(|k| is_valid_api_key(Some(*k))).map(str::trim)
    }

    pub fn has_valid_key(&self, provider: Provider) -> bool {
        self.key_for(provider).is_some()
    }

    pub fn model_for(&self, provider: Provider) -> &str {
        match provider {
            Provider::Claude => &self.anthropic_model,
            Provider::OpenAi => &self.openai_model,
        }
    }

    fn base_url_for(&self, provider: Provider) -> &str {
        let url = match provider {
            Provider::Claude => &self.anthropic_base_url,
            Provider::OpenAi => &self.openai_base_url,
        };
        url.trim_end_matches('/')
    }

    /// Explicit provider, else OpenAI only when it is the sole usable
    /// provider, else Claude.
    pub fn default_provider(&self) -> Provider {
        if let Some(p) = self.provider {
            return p;
        }
        if !self.has_valid_key(Provider::Claude) && self.has_valid_key(Provider::OpenAi) {
            Provider::OpenAi
        } else {
            Provider::Claude
        }
    }
}

// ─── ProviderClient ───────────────────────────────────────────────────────

/// HTTP client for the Anthropic Messages and OpenAI Chat Completions APIs.
///
/// The configuration can be swapped at runtime with [`reconfigure`]; calls
/// already in flight keep the snapshot they started with.
///
/// [`reconfigure`]: ProviderClient::reconfigure
#[derive(Debug)]
pub struct ProviderClient {
    http: reqwest::Client,
    config: RwLock<ProviderConfig>,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_http(reqwest::Client::new(), config)
    }

    pub fn with_http(http: reqwest::Client, config: ProviderConfig) -> Self {
        Self {
            http,
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> ProviderConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reconfigure(&self, config: ProviderConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    async fn call(
        &self,
        config: &ProviderConfig,
        provider: Provider,
        system: &str,
        user: &str,
        model: Option<&str>,
        max_tokens: u32,
    ) -> Result<Generation> {
        let key = config
            .key_for(provider)
            .ok_or(LlmError::MissingKey(provider))?;
        let model = model.unwrap_or_else(|| config.model_for(provider));
        let base = config.base_url_for(provider);
        debug!(%provider, model, max_tokens, "sending generation request");

        let messages = vec![ChatMessage {
            role: "user",
            content: user,
        }];
        let request = match provider {
            Provider::Claude => self
                .http
                .post(format!("{base}/v1/messages"))
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&AnthropicRequest {
                    model,
                    max_tokens,
                    system: (!system.is_empty()).then_some(system),
                    messages,
                }),
            Provider::OpenAi => {
                let mut all = Vec::with_capacity(2);
                if !system.is_empty() {
                    all.push(ChatMessage {
                        role: "system",
                        content: system,
                    });
                }
                all.extend(messages);
                self.http
                    .post(format!("{base}/v1/chat/completions"))
                    .bearer_auth(key)
                    .json(&OpenAiRequest {
                        model,
                        max_tokens,
                        messages: all,
                    })
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(provider, status.as_u16(), body));
        }

        let text = match provider {
            Provider::Claude => serde_json::from_str::<AnthropicResponse>(&body)
                .map_err(|source| LlmError::Decode { provider, source })?
                .into_text(),
            Provider::OpenAi => serde_json::from_str::<OpenAiResponse>(&body)
                .map_err(|source| LlmError::Decode { provider, source })?
                .into_text(),
        };

        Ok(Generation {
            text,
            provider,
            model: model.to_string(),
        })
    }
}

fn classify_failure(provider: Provider, status: u16, body: String) -> LlmError {
    let lower = body.to_ascii_lowercase();
    if status == 401 || status == 403 || AUTH_PHRASES.iter().any(|p| lower.contains(p)) {
        LlmError::Auth {
            provider,
            status,
            body,
        }
    } else {
        LlmError::Api {
            provider,
            status,
            body,
        }
    }
}

#[async_trait]
impl Generate for ProviderClient {
    /// Generate with the selected provider; on an auth failure retry once on
    /// the other provider if it has a usable key.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<Generation> {
        let config = self.config();
        let provider = opts.provider.unwrap_or_else(|| config.default_provider());
        let max_tokens = opts.max_tokens.unwrap_or(config.max_tokens);

        let first = self
            .call(
                &config,
                provider,
                system_prompt,
                user_prompt,
                opts.model.as_deref(),
                max_tokens,
            )
            .await;

        match first {
            Err(e) if e.is_auth() => {
                let fallback = provider.other();
                if !config.has_valid_key(fallback) {
                    warn!(%provider, "authentication failed and no fallback key: {e}");
                    return Err(LlmError::NoValidKeys);
                }
                warn!(%provider, %fallback, "authentication failed, retrying: {e}");
                // The requested model belongs to the failed provider.
                self.call(
                    &config,
                    fallback,
                    system_prompt,
                    user_prompt,
                    None,
                    max_tokens,
                )
                .await
            }
            other => other,
        }
    }
}
