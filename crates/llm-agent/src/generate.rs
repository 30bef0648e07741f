use std::sync::Arc;

use async_trait::async_trait;

use crate::types::{GenerateOptions, Generation};
use crate::Result;

/// A source of model completions.
///
/// Implemented by [`ProviderClient`](crate::ProviderClient) for real calls
/// and by `ScriptedGenerator` (feature `test-util`) in tests. Object
/// safe, so callers hold it as `Arc<dyn Generate>`.
#[async_trait]
pub trait Generate: Send + Sync {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<Generation>;
}

#[async_trait]
impl<T: Generate + ?Sized> Generate for Arc<T> {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<Generation> {
        (**self).generate(system_prompt, user_prompt, opts).await
    }
}
