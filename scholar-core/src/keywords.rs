//! Question to search-keyword decomposition via a single model call.

use crate::brain::LlmProvider;
use crate::error::PipelineError;
use crate::types::CompletionRequest;
use std::sync::Arc;
use tracing::{debug, info};

/// Upper bound on keywords kept from the model output.
pub const MAX_KEYWORDS: usize = 5;

const KEYWORD_SYSTEM_PROMPT: &str = "\
You are a world-class academic literature search expert. The user gives you the \
topic of a popular-science article; reply with up to 5 English search keywords \
suitable for academic paper search engines.

Rules:
- Two or three keywords must closely paraphrase the user's topic.
- If the topic names a specific person or place, keep that name verbatim in every keyword.
- Output ONLY the keywords, separated by commas. No numbering, quotes, or explanation.

Examples:
Input: How to lose weight scientifically?
Output: Obesity Management, Diet and Weight Loss, Exercise and Weight Loss, Caloric Intake and Expenditure

Input: what is the economic future for hongkong
Output: Hong Kong Economy, Hong Kong Economic Development, Hong Kong Economic Policy, Hong Kong Economic Growth, Hong Kong Economic Challenges";

/// Splits comma-separated model output into at most `limit` keywords.
///
/// Accepts ASCII `,` and full-width `，` separators; blank items are dropped.
pub fn parse_keywords(raw: &str, limit: usize) -> Vec<String> {
    raw.split([',', '，', '\n'])
        .map(|k| k.trim().trim_matches('"').trim())
        .filter(|k| !k.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Generates search keywords for a research question.
pub struct KeywordGenerator {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    temperature: f32,
    limit: usize,
}

impl KeywordGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            temperature: 0.7,
            limit: MAX_KEYWORDS,
        }
    }

    /// Use a different model than the provider default.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Keep fewer keywords; values above `MAX_KEYWORDS` are clamped.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_KEYWORDS);
        self
    }

    pub async fn generate(&self, question: &str) -> Result<Vec<String>, PipelineError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::KeywordGenerationFailed {
                reason: "question is empty".to_string(),
            });
        }

        let request = CompletionRequest {
            temperature: self.temperature,
            model: self.model.clone(),
            ..CompletionRequest::with_system(KEYWORD_SYSTEM_PROMPT, question)
        };
        debug!(question_len = question.len(), "Requesting search keywords");

        let response = self.provider.complete(request).await.map_err(|e| {
            PipelineError::KeywordGenerationFailed {
                reason: e.to_string(),
            }
        })?;

        let keywords = parse_keywords(&response.text, self.limit);
        if keywords.is_empty() {
            return Err(PipelineError::KeywordGenerationFailed {
                reason: "model returned no keywords".to_string(),
            });
        }
        info!(count = keywords.len(), keywords = ?keywords, "Generated search keywords");
        Ok(keywords)
    }
}
