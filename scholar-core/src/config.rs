//! Configuration system for Scholar.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/scholar/config.toml` and/or `.scholar/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::language::Language;

/// Top-level configuration for Scholar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScholarConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub translation: TranslationConfig,
    pub gateway: GatewayConfig,
}

impl ScholarConfig {
    /// Collect validation warnings from every section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for w in self.llm.validate() {
            warnings.push(format!("[llm] {}", w));
        }
        for w in self.search.validate() {
            warnings.push(format!("[search] {}", w));
        }
        for w in self.pipeline.validate() {
            warnings.push(format!("[pipeline] {}", w));
        }
        for w in self.translation.validate() {
            warnings.push(format!("[translation] {}", w));
        }
        warnings
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name. Only OpenAI-compatible endpoints are supported.
    pub provider: String,
    /// Default model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Explicit API key; takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Maximum tokens for the insight response.
    pub max_tokens: usize,
    /// Per-stage model overrides.
    #[serde(default)]
    pub models: TaskModels,
}

/// Optional per-stage model overrides; `None` falls back to `LlmConfig::model`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskModels {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.7,
            max_tokens: 2000,
            models: TaskModels::default(),
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.temperature < 0.0 || self.temperature > 2.0 {
            warnings.push(format!(
                "temperature ({}) outside [0.0, 2.0]; provider may reject requests",
                self.temperature
            ));
        }
        if self.max_tokens == 0 {
            warnings.push("max_tokens is 0; insights will be empty".to_string());
        }
        if self.provider != "openai" {
            warnings.push(format!(
                "provider '{}' is treated as OpenAI-compatible",
                self.provider
            ));
        }
        warnings
    }
}

/// Literature search upstream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Semantic Scholar graph API base URL.
    pub base_url: String,
    /// Optional environment variable holding an API key (sent as `x-api-key`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Minimum spacing between outbound search requests, process-wide.
    pub min_interval_ms: u64,
    /// Sleep before retrying a request that got HTTP 429.
    pub rate_limit_backoff_ms: u64,
    /// Minimum spacing between single-paper lookups (`/paper/{id}`).
    pub citation_min_interval_ms: u64,
    /// Sleep before retrying a paper lookup that got HTTP 429.
    pub citation_rate_limit_backoff_ms: u64,
    /// Papers requested per keyword.
    pub per_keyword_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.semanticscholar.org/graph/v1".to_string(),
            api_key_env: None,
            min_interval_ms: 300,
            rate_limit_backoff_ms: 5000,
            citation_min_interval_ms: 1000,
            citation_rate_limit_backoff_ms: 2000,
            per_keyword_limit: 4,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.per_keyword_limit == 0 {
            warnings.push("per_keyword_limit is 0; every keyword returns nothing".to_string());
        }
        if self.min_interval_ms == 0 {
            warnings.push("min_interval_ms is 0; requests are not throttled".to_string());
        }
        warnings
    }
}

/// Fan-out orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Deadline for a single search attempt.
    pub attempt_timeout_secs: u64,
    /// Extra attempts after a timeout (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Keywords kept from the generator output.
    pub max_keywords: usize,
    /// Upper bound on papers per summary batch.
    pub summary_batch_limit: usize,
    /// Insight and error-string language.
    pub language: Language,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: 17,
            max_retries: 2,
            max_keywords: 5,
            summary_batch_limit: 10,
            language: Language::En,
        }
    }
}

impl PipelineConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.attempt_timeout_secs == 0 {
            warnings.push("attempt_timeout_secs is 0; every search times out".to_string());
        }
        if self.max_keywords == 0 {
            warnings.push("max_keywords is 0; no searches will run".to_string());
        }
        if self.summary_batch_limit == 0 {
            warnings.push("summary_batch_limit is 0; summaries are disabled".to_string());
        }
        warnings
    }
}

/// Translation overlay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub enabled: bool,
    /// Target language for titles and summaries.
    pub target_lang: Language,
    /// Cache entry lifetime.
    pub ttl_secs: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_lang: Language::Zh,
            ttl_secs: 24 * 60 * 60,
        }
    }
}

impl TranslationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.ttl_secs == 0 {
            warnings.push("ttl_secs is 0; translations are never cached".to_string());
        }
        warnings
    }
}

/// Configuration for the HTTP gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Allow any origin (for a browser client served elsewhere).
    pub permissive_cors: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            permissive_cors: true,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `SCHOLAR_`)
/// 3. Workspace-local config (`.scholar/config.toml`)
/// 4. User config (`~/.config/scholar/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ScholarConfig>,
) -> Result<ScholarConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(ScholarConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "scholar", "scholar") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".scholar").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (SCHOLAR_LLM__MODEL, SCHOLAR_PIPELINE__LANGUAGE, etc.)
    figment = figment.merge(Env::prefixed("SCHOLAR_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
