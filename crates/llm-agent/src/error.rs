use thiserror::Error;

use crate::types::Provider;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} rejected the credentials (HTTP {status}): {body}")]
    Auth {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{provider} API error (HTTP {status}): {body}")]
    Api {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {provider} response: {source}")]
    Decode {
        provider: Provider,
        #[source]
        source: serde_json::Error,
    },

    #[error("No API key configured for {0}")]
    MissingKey(Provider),

    #[error("No valid API keys found. Configure an Anthropic or OpenAI key.")]
    NoValidKeys,

    #[error("Unknown provider '{0}' (expected claude or openai)")]
    UnknownProvider(String),
}

impl LlmError {
    /// True when retrying with different credentials could succeed.
    pub fn is_auth(&self) -> bool {
        matches!(self, LlmError::Auth { .. } | LlmError::MissingKey(_))
    }
}
