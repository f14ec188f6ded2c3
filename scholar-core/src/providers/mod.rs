//! LLM provider implementations.
//!
//! Every model call in the pipeline goes through an OpenAI-compatible chat
//! completions endpoint (OpenAI, DeepSeek, aihubmix, Ollama, vLLM).
//! Use `create_provider()` to instantiate it from config.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Create an LLM provider based on the configuration.
///
/// Providers other than `openai` are assumed to speak the same protocol; the
/// config validator warns about them.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.provider != "openai" {
        tracing::debug!(
            provider = %config.provider,
            "Treating provider as OpenAI-compatible"
        );
    }
    Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
}

/// Create an LLM provider with an explicit API key, bypassing the environment.
pub fn create_provider_with_key(
    config: &LlmConfig,
    api_key: String,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    Ok(Arc::new(OpenAiCompatibleProvider::new_with_key(
        config, api_key,
    )?))
}
