//! Research session state and the events that drive it.
//!
//! The orchestrator never touches `SessionState` directly; it publishes
//! `SessionEvent`s and any consumer folds them with `SessionState::apply`.

use crate::insight::InsightEvent;
use crate::paper::{Paper, PaperId};
use crate::summarizer::SummaryOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Search progress of one keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordStatus {
    Pending,
    Searching,
    /// A retry attempt after a timeout is in flight.
    Retrying,
    Succeeded,
    Failed,
}

impl KeywordStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, KeywordStatus::Succeeded | KeywordStatus::Failed)
    }
}

/// Summary progress of one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum SummaryState {
    Pending,
    Ready(String),
    NoAbstract,
    Failed(String),
}

impl From<SummaryOutcome> for SummaryState {
    fn from(outcome: SummaryOutcome) -> Self {
        match outcome {
            SummaryOutcome::Summary(text) => SummaryState::Ready(text),
            SummaryOutcome::NoAbstract => SummaryState::NoAbstract,
            SummaryOutcome::Failed(reason) => SummaryState::Failed(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightPhase {
    #[default]
    Reasoning,
    Content,
}

/// Streamed insight as the client sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightState {
    pub reasoning_text: String,
    pub content_text: String,
    pub phase: InsightPhase,
    pub done: bool,
    pub reasoning_expanded: bool,
}

impl Default for InsightState {
    fn default() -> Self {
        Self {
            reasoning_text: String::new(),
            content_text: String::new(),
            phase: InsightPhase::Reasoning,
            done: false,
            reasoning_expanded: true,
        }
    }
}

/// Session-level errors shown to the user. Each is independent of the others.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum SessionError {
    KeywordGenerationFailed(String),
    /// Every keyword search failed.
    SearchFailed(String),
    InsightFailed(String),
}

/// Updates published while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    KeywordsGenerated {
        keywords: Vec<String>,
    },
    KeywordGenerationFailed {
        message: String,
    },
    /// First attempt for a keyword started.
    KeywordSearching {
        keyword: String,
    },
    /// Retry number `retry` (1-based) started after a timeout.
    KeywordRetrying {
        keyword: String,
        retry: u32,
    },
    KeywordSucceeded {
        keyword: String,
        papers: Vec<Paper>,
    },
    KeywordFailed {
        keyword: String,
        reason: String,
    },
    SummaryReady {
        paper_id: PaperId,
        outcome: SummaryOutcome,
    },
    /// Every keyword task has settled.
    SearchSettled {
        total: usize,
    },
    Insight(InsightEvent),
    /// The reasoning panel folds away after the phase change.
    ReasoningCollapsed,
    InsightFinished,
    /// `message` is the localized text that replaces the insight content.
    InsightFailed {
        message: String,
    },
    Completed,
}

/// UI-facing state for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub id: Uuid,
    pub question: String,
    pub created_at: DateTime<Utc>,
    pub keywords: Vec<String>,
    pub results_by_keyword: HashMap<String, Vec<Paper>>,
    pub papers: Vec<Paper>,
    pub keyword_status: HashMap<String, KeywordStatus>,
    pub summary_by_paper_id: HashMap<PaperId, SummaryState>,
    /// Present only while a retry is in flight.
    pub retry_count_by_keyword: HashMap<String, u32>,
    pub insight: InsightState,
    pub search_settled: bool,
    pub completed: bool,
    pub error: Option<SessionError>,
}

impl SessionState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            created_at: Utc::now(),
            keywords: Vec::new(),
            results_by_keyword: HashMap::new(),
            papers: Vec::new(),
            keyword_status: HashMap::new(),
            summary_by_paper_id: HashMap::new(),
            retry_count_by_keyword: HashMap::new(),
            insight: InsightState::default(),
            search_settled: false,
            completed: false,
            error: None,
        }
    }

    /// Fold one event into the state.
    pub fn apply(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::KeywordsGenerated { keywords } => {
                self.keywords = keywords.clone();
                for k in keywords {
                    self.keyword_status.insert(k.clone(), KeywordStatus::Pending);
                }
            }
            SessionEvent::KeywordGenerationFailed { message } => {
                self.error = Some(SessionError::KeywordGenerationFailed(message.clone()));
            }
            SessionEvent::KeywordSearching { keyword } => {
                self.keyword_status
                    .insert(keyword.clone(), KeywordStatus::Searching);
            }
            SessionEvent::KeywordRetrying { keyword, retry } => {
                self.keyword_status
                    .insert(keyword.clone(), KeywordStatus::Retrying);
                self.retry_count_by_keyword.insert(keyword.clone(), *retry);
            }
            SessionEvent::KeywordSucceeded { keyword, papers } => {
                self.retry_count_by_keyword.remove(keyword);
                self.keyword_status
                    .insert(keyword.clone(), KeywordStatus::Succeeded);
                for paper in papers {
                    self.summary_by_paper_id
                        .entry(paper.id.clone())
                        .or_insert(SummaryState::Pending);
                }
                self.papers.extend(papers.iter().cloned());
                self.results_by_keyword
                    .insert(keyword.clone(), papers.clone());
            }
            SessionEvent::KeywordFailed { keyword, reason } => {
                self.retry_count_by_keyword.remove(keyword);
                self.keyword_status
                    .insert(keyword.clone(), KeywordStatus::Failed);
                self.results_by_keyword.insert(keyword.clone(), Vec::new());
                if self.all_keywords_failed() {
                    self.error = Some(SessionError::SearchFailed(reason.clone()));
                }
            }
            SessionEvent::SummaryReady { paper_id, outcome } => {
                self.summary_by_paper_id
                    .insert(paper_id.clone(), outcome.clone().into());
            }
            SessionEvent::SearchSettled { .. } => {
                self.search_settled = true;
            }
            SessionEvent::Insight(insight) => match insight {
                InsightEvent::Reasoning { content } => {
                    self.insight.reasoning_text.push_str(content);
                }
                InsightEvent::Content { content } => {
                    self.insight.content_text.push_str(content);
                }
                InsightEvent::PhaseChange => {
                    self.insight.phase = InsightPhase::Content;
                }
            },
            SessionEvent::ReasoningCollapsed => {
                self.insight.reasoning_expanded = false;
            }
            SessionEvent::InsightFinished => {
                self.insight.done = true;
            }
            SessionEvent::InsightFailed { message } => {
                self.insight.content_text = message.clone();
                self.insight.done = true;
                self.error = Some(SessionError::InsightFailed(message.clone()));
            }
            SessionEvent::Completed => {
                self.completed = true;
            }
        }
    }

    /// Total deduplicated result count.
    pub fn total_results(&self) -> usize {
        self.papers.len()
    }

    /// Per-keyword results in keyword-generation order.
    pub fn grouped_results(&self) -> Vec<(&str, &[Paper])> {
        self.keywords
            .iter()
            .map(|k| {
                let papers = self
                    .results_by_keyword
                    .get(k)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                (k.as_str(), papers)
            })
            .collect()
    }

    /// Every paper in display order: grouped by keyword, keyword order first.
    ///
    /// This is the order the search aggregate hands to insight synthesis.
    pub fn papers_in_keyword_order(&self) -> Vec<Paper> {
        self.grouped_results()
            .into_iter()
            .flat_map(|(_, papers)| papers.iter().cloned())
            .collect()
    }

    pub fn status_of(&self, keyword: &str) -> Option<KeywordStatus> {
        self.keyword_status.get(keyword).copied()
    }

    /// Summary texts that are ready, keyed by paper id.
    pub fn ready_summaries(&self) -> HashMap<PaperId, String> {
        self.summary_by_paper_id
            .iter()
            .filter_map(|(id, s)| match s {
                SummaryState::Ready(text) => Some((id.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    fn all_keywords_failed(&self) -> bool {
        !self.keywords.is_empty()
            && self
                .keywords
                .iter()
                .all(|k| self.status_of(k) == Some(KeywordStatus::Failed))
    }
}
