use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::generate::Generate;
use crate::types::{GenerateOptions, Generation, Provider};
use crate::{LlmError, Result};

/// One recorded invocation of a [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub opts: GenerateOptions,
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Offline [`Generate`] implementation returning canned replies.
///
/// Rules are checked in insertion order; the first whose needle appears in
/// either prompt decides the reply. Unmatched calls get the default reply.
#[derive(Debug)]
pub struct ScriptedGenerator {
    rules: Vec<(String, Reply)>,
    default: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    pub fn new(default_text: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default: Reply::Text(default_text.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every unmatched call fails with an upstream error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default: Reply::Fail(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn when(mut self, needle: impl Into<String>, text: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(text.into())));
        self
    }

    pub fn fail_when(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail(message.into())));
        self
    }

    pub fn call_count(&self) -> usize {
        self.lock().len()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reply_for(&self, system_prompt: &str, user_prompt: &str) -> &Reply {
        self.rules
            .iter()
            .find(|(needle, _)| system_prompt.contains(needle) || user_prompt.contains(needle))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default)
    }
}

#[async_trait]
impl Generate for ScriptedGenerator {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<Generation> {
        self.lock().push(RecordedCall {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            opts: opts.clone(),
        });
        let provider = opts.provider.unwrap_or(Provider::Claude);
        match self.reply_for(system_prompt, user_prompt) {
            Reply::Text(text) => Ok(Generation {
                text: text.clone(),
                provider,
                model: opts.model.clone().unwrap_or_else(|| "scripted".to_string()),
            }),
            Reply::Fail(message) => Err(LlmError::Api {
                provider,
                status: 503,
                body: message.clone(),
            }),
        }
    }
}
