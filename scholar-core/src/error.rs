//! Error types for the Scholar core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the LLM provider, the literature search upstream, the research
//! pipeline stages, and configuration.

use std::path::PathBuf;

/// Top-level error type for the Scholar core library.
#[derive(Debug, thiserror::Error)]
pub enum ScholarError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Upstream returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
}

/// Errors from the literature search upstream.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SearchError {
    /// A single attempt exceeded its deadline; the in-flight request was dropped.
    #[error("Search for '{keyword}' timed out after {timeout_secs}s")]
    UpstreamSearchTimeout { keyword: String, timeout_secs: u64 },

    /// Non-2xx, non-429 response from the search API.
    #[error("Upstream search failed: {status} {status_text}")]
    UpstreamSearchError { status: u16, status_text: String },

    #[error("Search request failed: {message}")]
    Transport { message: String },

    #[error("Search response parse error: {message}")]
    ResponseParse { message: String },

    /// Retries were exhausted or the error was terminal for this keyword.
    #[error("Keyword '{keyword}' failed after {attempts} attempt(s): {reason}")]
    KeywordSearchFailed {
        keyword: String,
        attempts: u32,
        reason: String,
    },
}

impl SearchError {
    /// Whether this error is a per-attempt timeout (the only retried kind).
    pub fn is_timeout(&self) -> bool {
        matches!(self, SearchError::UpstreamSearchTimeout { .. })
    }
}

/// Errors from the research pipeline stages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("Keyword generation failed: {reason}")]
    KeywordGenerationFailed { reason: String },

    #[error("Summary generation failed for paper {paper_id}: {reason}")]
    SummaryGenerationFailed { paper_id: String, reason: String },

    #[error("Summary batch of {size} exceeds the limit of {limit} papers")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Insight generation failed: {reason}")]
    InsightGenerationFailed { reason: String },

    #[error("Translation failed: {reason}")]
    TranslationFailed { reason: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// A type alias for results using the top-level `ScholarError`.
pub type Result<T> = std::result::Result<T, ScholarError>;
