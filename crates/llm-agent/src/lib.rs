//! `llm-agent`: text generation over hosted model APIs.
//!
//! Exposes one capability, [`Generate`]: send a system prompt and a user
//! prompt, get text back. [`ProviderClient`] implements it over the
//! Anthropic Messages API and the OpenAI Chat Completions API.
//!
//! # Architecture
//!
//! ```text
//! GenerateOptions
//!     │
//!     ▼
//! ProviderClient  ← picks a provider (explicit → configured → auto-detect)
//!     │              POST /v1/messages | /v1/chat/completions
//!     ▼
//! auth failure?   ← retry once on the other provider if its key is usable
//!     │
//!     ▼
//! Generation      ← first text block / first choice, provider, model
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use llm_agent::{Generate, GenerateOptions, ProviderClient, ProviderConfig};
//!
//! let client = ProviderClient::new(ProviderConfig::from_env());
//! let out = client
//!     .generate("You are terse.", "Name one Rust web framework.", &GenerateOptions::default())
//!     .await?;
//! println!("{} ({})", out.text, out.provider);
//! ```
//!
//! With the `test-util` feature, `ScriptedGenerator` answers from canned
//! rules and records every call.

pub mod error;
pub mod generate;
pub mod provider;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::LlmError;
pub use generate::Generate;
pub use provider::{is_valid_api_key, ProviderClient, ProviderConfig};
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{RecordedCall, ScriptedGenerator};
pub use types::{GenerateOptions, Generation, Provider};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, LlmError>;
