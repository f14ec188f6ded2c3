//! End-to-end session: keywords, fan-out search, then the streamed insight.

use super::orchestrator::FanOutOrchestrator;
use super::session::{SessionEvent, SessionState};
use crate::brain::LlmProvider;
use crate::config::ScholarConfig;
use crate::error::PipelineError;
use crate::insight::{InsightEvent, InsightRun, InsightSynthesizer};
use crate::keywords::KeywordGenerator;
use crate::language::Language;
use crate::paper::Paper;
use crate::search::SearchBackend;
use crate::summarizer::Summarizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Delay between the phase change and folding the reasoning panel.
pub const REASONING_COLLAPSE_DELAY: Duration = Duration::from_secs(1);

/// Wires the pipeline stages together for one question at a time.
pub struct ResearchPipeline {
    keywords: KeywordGenerator,
    orchestrator: FanOutOrchestrator,
    summarizer: Arc<Summarizer>,
    insight: InsightSynthesizer,
    collapse_delay: Duration,
}

impl ResearchPipeline {
    /// Build every stage from configuration.
    pub fn from_config(
        config: &ScholarConfig,
        provider: Arc<dyn LlmProvider>,
        backend: Arc<dyn SearchBackend>,
    ) -> Self {
        let models = &config.llm.models;
        let summarizer = Arc::new(
            Summarizer::new(provider.clone())
                .with_model(models.summary.clone())
                .with_batch_limit(config.pipeline.summary_batch_limit),
        );
        let orchestrator = FanOutOrchestrator::new(backend)
            .with_pipeline_config(&config.pipeline)
            .with_per_keyword_limit(config.search.per_keyword_limit)
            .with_summarizer(summarizer.clone());

        Self {
            keywords: KeywordGenerator::new(provider.clone())
                .with_model(models.keywords.clone())
                .with_limit(config.pipeline.max_keywords),
            orchestrator,
            summarizer,
            insight: InsightSynthesizer::new(provider)
                .with_model(models.insight.clone())
                .with_sampling(config.llm.temperature, config.llm.max_tokens),
            collapse_delay: REASONING_COLLAPSE_DELAY,
        }
    }

    pub fn summarizer(&self) -> Arc<Summarizer> {
        self.summarizer.clone()
    }

    pub fn keyword_generator(&self) -> &KeywordGenerator {
        &self.keywords
    }

    pub fn insight_synthesizer(&self) -> &InsightSynthesizer {
        &self.insight
    }

    /// Run one session, publishing every state change to `tx`.
    ///
    /// Returns the deduplicated papers, or the keyword error that aborted the
    /// session before any search ran.
    pub async fn handle_search(
        &self,
        question: &str,
        language: Language,
        tx: mpsc::Sender<SessionEvent>,
    ) -> Result<Vec<Paper>, PipelineError> {
        let keywords = match self.keywords.generate(question).await {
            Ok(k) => k,
            Err(e) => {
                warn!(error = %e, "Session aborted before search");
                let _ = tx
                    .send(SessionEvent::KeywordGenerationFailed {
                        message: e.to_string(),
                    })
                    .await;
                let _ = tx.send(SessionEvent::Completed).await;
                return Err(e);
            }
        };
        let _ = tx
            .send(SessionEvent::KeywordsGenerated {
                keywords: keywords.clone(),
            })
            .await;

        let papers = self.orchestrator.run_search(&keywords, tx.clone()).await;

        if papers.is_empty() {
            info!("No papers found; skipping insight");
        } else {
            self.run_insight(question, &papers, language, &tx).await;
        }

        let _ = tx.send(SessionEvent::Completed).await;
        Ok(papers)
    }

    /// Run a session and fold its events into a fresh `SessionState`.
    ///
    /// Returns once every publisher, summary tasks included, has finished.
    pub async fn run(&self, question: &str, language: Language) -> SessionState {
        let (tx, mut rx) = mpsc::channel(256);
        let mut state = SessionState::new(question);

        let collect = async {
            while let Some(event) = rx.recv().await {
                state.apply(&event);
            }
        };
        let (_, ()) = tokio::join!(self.handle_search(question, language, tx), collect);
        state
    }

    async fn run_insight(
        &self,
        question: &str,
        papers: &[Paper],
        language: Language,
        tx: &mpsc::Sender<SessionEvent>,
    ) {
        let (insight_tx, mut insight_rx) = mpsc::channel::<InsightEvent>(64);
        let collapse_delay = self.collapse_delay;

        let forward = async {
            while let Some(event) = insight_rx.recv().await {
                if event == InsightEvent::PhaseChange {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(collapse_delay).await;
                        let _ = tx.send(SessionEvent::ReasoningCollapsed).await;
                    });
                }
                if tx.send(SessionEvent::Insight(event)).await.is_err() {
                    break;
                }
            }
        };
        let synth = self
            .insight
            .stream_insight(question, papers, language, insight_tx);

        let (result, ()) = tokio::join!(synth, forward);
        match result {
            Ok(InsightRun::Streamed { .. }) => {
                let _ = tx.send(SessionEvent::InsightFinished).await;
            }
            Ok(InsightRun::Skipped) => {}
            Err(_) => {
                let _ = tx
                    .send(SessionEvent::InsightFailed {
                        message: language.insight_failed_message().to_string(),
                    })
                    .await;
            }
        }
    }
}
