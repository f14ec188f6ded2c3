//! One-sentence paper summaries.
//!
//! Each paper with a real abstract gets its own model call. Failures stay
//! with the paper that caused them; a batch never fails as a whole.

use crate::brain::LlmProvider;
use crate::error::PipelineError;
use crate::paper::{Paper, PaperId};
use crate::types::CompletionRequest;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Maximum characters kept from a model summary.
pub const SUMMARY_MAX_CHARS: usize = 200;

/// Default number of papers accepted by `summarize_batch`.
pub const DEFAULT_BATCH_LIMIT: usize = 10;

const SUMMARY_SYSTEM_PROMPT: &str = "\
Summarize academic paper abstracts in one concise, natural, fluent sentence (maximum 200 characters).
Focus on the key methodology and main finding only. Be direct, specific and friendly.";

/// Result of summarizing one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum SummaryOutcome {
    Summary(String),
    /// The paper had no usable abstract; no model call was made.
    NoAbstract,
    Failed(String),
}

impl SummaryOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            SummaryOutcome::Summary(text) => Some(text),
            _ => None,
        }
    }
}

/// Generates per-paper summaries.
pub struct Summarizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    batch_limit: usize,
    in_flight: Arc<InFlightSet>,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            batch_limit: DEFAULT_BATCH_LIMIT,
            in_flight: Arc::new(InFlightSet::default()),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Summarize one paper. Never returns an error; failures become `Failed`.
    pub async fn summarize(&self, paper: &Paper) -> SummaryOutcome {
        let Some(abstract_text) = paper.real_abstract() else {
            return SummaryOutcome::NoAbstract;
        };

        let request = CompletionRequest {
            temperature: 0.3,
            max_tokens: Some(280),
            presence_penalty: Some(0.1),
            frequency_penalty: Some(0.1),
            model: self.model.clone(),
            ..CompletionRequest::with_system(
                SUMMARY_SYSTEM_PROMPT,
                format!(
                    "Please provide a summary (max {} chars):\n\n{}",
                    SUMMARY_MAX_CHARS, abstract_text
                ),
            )
        };

        match self.provider.complete(request).await {
            Ok(response) => {
                let text = cap_chars(response.text.trim(), SUMMARY_MAX_CHARS);
                if text.is_empty() {
                    SummaryOutcome::Failed("model returned an empty summary".to_string())
                } else {
                    debug!(paper_id = %paper.id, "Summary ready");
                    SummaryOutcome::Summary(text)
                }
            }
            Err(e) => {
                let err = PipelineError::SummaryGenerationFailed {
                    paper_id: paper.id.clone(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Summary failed");
                SummaryOutcome::Failed(e.to_string())
            }
        }
    }

    /// Summarize one paper unless a fetch for the same id is already running.
    ///
    /// Returns `None` when the call was suppressed as a duplicate.
    pub async fn summarize_tracked(&self, paper: &Paper) -> Option<SummaryOutcome> {
        let _claim = self.in_flight.try_claim(&paper.id)?;
        Some(self.summarize(paper).await)
    }

    /// Summarize up to `batch_limit` papers concurrently, one outcome per paper
    /// in input order.
    pub async fn summarize_batch(
        &self,
        papers: &[Paper],
    ) -> Result<Vec<(PaperId, SummaryOutcome)>, PipelineError> {
        if papers.len() > self.batch_limit {
            return Err(PipelineError::BatchTooLarge {
                size: papers.len(),
                limit: self.batch_limit,
            });
        }
        let outcomes = join_all(papers.iter().map(|p| self.summarize(p))).await;
        Ok(papers.iter().map(|p| p.id.clone()).zip(outcomes).collect())
    }

    /// Ids with a summary request currently running.
    pub fn in_flight(&self) -> Arc<InFlightSet> {
        self.in_flight.clone()
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn cap_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Paper ids whose summary is currently being fetched.
#[derive(Debug, Default)]
pub struct InFlightSet {
    ids: Mutex<HashSet<PaperId>>,
}

impl InFlightSet {
    /// Claim `id`. Returns `None` if it is already claimed.
    pub fn try_claim(self: &Arc<Self>, id: &str) -> Option<InFlightClaim> {
        let mut ids = self.ids.lock().unwrap_or_else(|p| p.into_inner());
        if !ids.insert(id.to_string()) {
            return None;
        }
        Some(InFlightClaim {
            set: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(id)
    }
}

/// Releases its id from the in-flight set on drop.
#[derive(Debug)]
pub struct InFlightClaim {
    set: Arc<InFlightSet>,
    id: PaperId,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set
            .ids
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.id);
    }
}
