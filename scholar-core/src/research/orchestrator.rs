//! Concurrent per-keyword search with timeout, bounded retry and
//! session-wide deduplication.

use super::session::SessionEvent;
use crate::config::PipelineConfig;
use crate::error::SearchError;
use crate::paper::{Paper, PaperId};
use crate::search::SearchBackend;
use crate::summarizer::Summarizer;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Seen ids and the flat aggregate, guarded together so check-and-insert
/// and append are one step. Each merged paper remembers the position of
/// the keyword that contributed it.
#[derive(Debug, Default)]
struct Accumulator {
    seen: HashSet<PaperId>,
    papers: Vec<(usize, Paper)>,
}

impl Accumulator {
    /// Keep only papers whose id was not seen before, recording them.
    fn merge(&mut self, keyword_index: usize, incoming: Vec<Paper>) -> Vec<Paper> {
        let fresh: Vec<Paper> = incoming
            .into_iter()
            .filter(|p| self.seen.insert(p.id.clone()))
            .collect();
        self.papers
            .extend(fresh.iter().cloned().map(|p| (keyword_index, p)));
        fresh
    }

    /// The aggregate in keyword order, upstream order within a keyword.
    fn ordered(&self) -> Vec<Paper> {
        let mut entries: Vec<&(usize, Paper)> = self.papers.iter().collect();
        entries.sort_by_key(|(index, _)| *index);
        entries.into_iter().map(|(_, p)| p.clone()).collect()
    }
}

/// Runs one search task per keyword.
pub struct FanOutOrchestrator {
    backend: Arc<dyn SearchBackend>,
    summarizer: Option<Arc<Summarizer>>,
    per_keyword_limit: usize,
    attempt_timeout: Duration,
    max_attempts: u32,
}

impl FanOutOrchestrator {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            backend,
            summarizer: None,
            per_keyword_limit: 4,
            attempt_timeout: defaults.attempt_timeout(),
            max_attempts: defaults.max_attempts(),
        }
    }

    /// Apply timeout and retry settings from configuration.
    pub fn with_pipeline_config(mut self, config: &PipelineConfig) -> Self {
        self.attempt_timeout = config.attempt_timeout();
        self.max_attempts = config.max_attempts().max(1);
        self
    }

    pub fn with_per_keyword_limit(mut self, limit: usize) -> Self {
        self.per_keyword_limit = limit;
        self
    }

    /// Dispatch a summary for every newly merged paper.
    pub fn with_summarizer(mut self, summarizer: Arc<Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Search every keyword concurrently and return the deduplicated aggregate.
    ///
    /// The aggregate lists papers in keyword order regardless of which task
    /// finished first; a duplicate id still belongs to the earliest arrival.
    /// Waits until every keyword task has settled. Summary tasks are not
    /// awaited; they hold their own sender clones and publish when done.
    pub async fn run_search(
        &self,
        keywords: &[String],
        tx: mpsc::Sender<SessionEvent>,
    ) -> Vec<Paper> {
        for keyword in keywords {
            let _ = tx
                .send(SessionEvent::KeywordSearching {
                    keyword: keyword.clone(),
                })
                .await;
        }

        let accumulator = Arc::new(Mutex::new(Accumulator::default()));
        let handles: Vec<_> = keywords
            .iter()
            .cloned()
            .enumerate()
            .map(|(keyword_index, keyword)| {
                let task = KeywordTask {
                    keyword,
                    keyword_index,
                    backend: self.backend.clone(),
                    summarizer: self.summarizer.clone(),
                    accumulator: accumulator.clone(),
                    tx: tx.clone(),
                    limit: self.per_keyword_limit,
                    attempt_timeout: self.attempt_timeout,
                    max_attempts: self.max_attempts,
                };
                tokio::spawn(task.run())
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Keyword task panicked or was cancelled");
            }
        }

        let papers = {
            let acc = accumulator.lock().unwrap_or_else(|p| p.into_inner());
            acc.ordered()
        };
        info!(
            keywords = keywords.len(),
            total = papers.len(),
            "All keyword searches settled"
        );
        let _ = tx
            .send(SessionEvent::SearchSettled {
                total: papers.len(),
            })
            .await;
        papers
    }
}

struct KeywordTask {
    keyword: String,
    keyword_index: usize,
    backend: Arc<dyn SearchBackend>,
    summarizer: Option<Arc<Summarizer>>,
    accumulator: Arc<Mutex<Accumulator>>,
    tx: mpsc::Sender<SessionEvent>,
    limit: usize,
    attempt_timeout: Duration,
    max_attempts: u32,
}

impl KeywordTask {
    async fn run(self) {
        match self.search_with_retry().await {
            Ok(papers) => {
                let fresh = {
                    let mut acc = self.accumulator.lock().unwrap_or_else(|p| p.into_inner());
                    acc.merge(self.keyword_index, papers)
                };
                debug!(keyword = %self.keyword, fresh = fresh.len(), "Keyword search succeeded");

                let _ = self
                    .tx
                    .send(SessionEvent::KeywordSucceeded {
                        keyword: self.keyword.clone(),
                        papers: fresh.clone(),
                    })
                    .await;

                if let Some(summarizer) = &self.summarizer {
                    for paper in fresh {
                        dispatch_summary(summarizer.clone(), paper, self.tx.clone());
                    }
                }
            }
            Err(e) => {
                warn!(keyword = %self.keyword, error = %e, "Keyword search failed");
                let _ = self
                    .tx
                    .send(SessionEvent::KeywordFailed {
                        keyword: self.keyword.clone(),
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Attempt the search up to `max_attempts` times; only timeouts retry.
    async fn search_with_retry(&self) -> Result<Vec<Paper>, SearchError> {
        for attempt in 1..=self.max_attempts {
            if attempt > 1 {
                let _ = self
                    .tx
                    .send(SessionEvent::KeywordRetrying {
                        keyword: self.keyword.clone(),
                        retry: attempt - 1,
                    })
                    .await;
            }

            let call = self.backend.search(&self.keyword, self.limit, 0);
            match tokio::time::timeout(self.attempt_timeout, call).await {
                Ok(Ok(page)) => return Ok(page.papers),
                Ok(Err(e)) => {
                    return Err(SearchError::KeywordSearchFailed {
                        keyword: self.keyword.clone(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    let timeout = SearchError::UpstreamSearchTimeout {
                        keyword: self.keyword.clone(),
                        timeout_secs: self.attempt_timeout.as_secs(),
                    };
                    warn!(attempt, max = self.max_attempts, error = %timeout, "Search attempt timed out");
                }
            }
        }

        Err(SearchError::KeywordSearchFailed {
            keyword: self.keyword.clone(),
            attempts: self.max_attempts,
            reason: "every attempt timed out".to_string(),
        })
    }
}

/// Fire-and-forget summary for one paper.
fn dispatch_summary(summarizer: Arc<Summarizer>, paper: Paper, tx: mpsc::Sender<SessionEvent>) {
    tokio::spawn(async move {
        if let Some(outcome) = summarizer.summarize_tracked(&paper).await {
            let _ = tx
                .send(SessionEvent::SummaryReady {
                    paper_id: paper.id.clone(),
                    outcome,
                })
                .await;
        }
    });
}
