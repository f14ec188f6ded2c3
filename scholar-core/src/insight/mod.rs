//! Streamed, citation-tagged insight synthesis over the aggregated papers.
//!
//! The model stream is split into a reasoning phase and a content phase.
//! `PhaseChange` is emitted exactly once, immediately before the first
//! content delta.

pub mod citation;
pub mod wire;

use crate::brain::LlmProvider;
use crate::error::PipelineError;
use crate::language::Language;
use crate::paper::{Paper, PaperId};
use std::collections::HashMap;
use crate::types::{CompletionRequest, StreamEvent};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use citation::{CitationAction, CitationResolver, InsightSegment};
pub use wire::{InsightEvent, NdjsonDecoder, encode_line};

/// How a synthesis run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightRun {
    /// No paper had a usable abstract; nothing was sent and the model was not called.
    Skipped,
    Streamed { papers_used: usize, events: usize },
}

/// Produces the streamed insight for one question.
pub struct InsightSynthesizer {
    provider: Arc<dyn LlmProvider>,
    model: Option<String>,
    temperature: f32,
    max_tokens: usize,
}

impl InsightSynthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            model: None,
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Stream the insight for `question` over `papers` into `tx`.
    ///
    /// Papers without a real abstract are left out of the prompt. A failure
    /// from the model, before or during streaming, is returned as
    /// `InsightGenerationFailed`.
    pub async fn stream_insight(
        &self,
        question: &str,
        papers: &[Paper],
        language: Language,
        tx: mpsc::Sender<InsightEvent>,
    ) -> Result<InsightRun, PipelineError> {
        let usable = usable_papers(papers);
        if usable.is_empty() {
            debug!("No paper has an abstract; skipping insight");
            return Ok(InsightRun::Skipped);
        }

        let request = CompletionRequest {
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            model: self.model.clone(),
            ..CompletionRequest::with_system(
                insight_system_prompt(language),
                build_insight_prompt(question, &usable),
            )
        };
        info!(papers = usable.len(), language = %language, "Synthesizing insight");

        let (stream_tx, mut stream_rx) = mpsc::channel::<StreamEvent>(64);
        let producer = self.provider.complete_streaming(request, stream_tx);

        let consumer = async move {
            let mut phase_changed = false;
            let mut sent = 0usize;
            while let Some(event) = stream_rx.recv().await {
                let outgoing = match event {
                    StreamEvent::Reasoning(text) => vec![InsightEvent::Reasoning { content: text }],
                    StreamEvent::Token(text) if !phase_changed => {
                        phase_changed = true;
                        vec![InsightEvent::PhaseChange, InsightEvent::Content { content: text }]
                    }
                    StreamEvent::Token(text) => vec![InsightEvent::Content { content: text }],
                    StreamEvent::Done { usage } => {
                        debug!(tokens = usage.total(), "Insight stream finished");
                        break;
                    }
                };
                for event in outgoing {
                    if tx.send(event).await.is_err() {
                        // Client went away; dropping stream_rx stops the producer.
                        return sent;
                    }
                    sent += 1;
                }
            }
            sent
        };

        let (result, events) = tokio::join!(producer, consumer);
        match result {
            Ok(()) => Ok(InsightRun::Streamed {
                papers_used: usable.len(),
                events,
            }),
            Err(e) => {
                warn!(error = %e, events_sent = events, "Insight generation failed");
                Err(PipelineError::InsightGenerationFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn insight_system_prompt(language: Language) -> String {
    format!(
        "You are a research assistant. Using the user's research question and the numbered \
papers provided, write a synthesized research insight:\n\
1. Open with an overview of the research landscape.\n\
2. List the key findings as points; every claim must cite its source paper.\n\
3. Close with research trends and any contradictions between papers.\n\n\
Cite a paper by wrapping its list number in a cite tag carrying its ID exactly as given, \
for example <cite data-paper-id=\"ID\">[n]</cite>. Only cite papers from the list.\n\
Write the answer in {}.",
        language.prompt_name()
    )
}

/// The papers that go into the insight prompt, in prompt order.
pub fn usable_papers(papers: &[Paper]) -> Vec<&Paper> {
    papers.iter().filter(|p| p.has_real_abstract()).collect()
}

/// The list number each usable paper carries in the insight prompt.
///
/// Papers without a real abstract have no entry.
pub fn citation_numbers(papers: &[Paper]) -> HashMap<PaperId, usize> {
    usable_papers(papers)
        .into_iter()
        .enumerate()
        .map(|(index, p)| (p.id.clone(), index + 1))
        .collect()
}

/// Build the user prompt: the question followed by papers numbered from 1.
pub fn build_insight_prompt(question: &str, papers: &[&Paper]) -> String {
    let mut prompt = format!("Research question: {}\n\nPapers:\n", question.trim());
    for (index, paper) in papers.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n{}. {}\nID: {}\n",
            index + 1,
            paper.title,
            paper.id
        );
        let byline = paper.author_line();
        if !byline.is_empty() || paper.year.is_some() {
            let year = paper.year.map(|y| y.to_string()).unwrap_or_default();
            let _ = writeln!(prompt, "Authors: {} {}", byline, year);
        }
        let _ = writeln!(prompt, "Abstract: {}", paper.real_abstract().unwrap_or(""));
    }
    prompt
}
