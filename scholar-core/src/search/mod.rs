//! Literature search: the backend abstraction, the Semantic Scholar client,
//! and the throttle gate that spaces outbound requests.

pub mod semantic_scholar;
pub mod throttle;

use crate::error::SearchError;
use crate::paper::Paper;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub use semantic_scholar::SemanticScholarClient;
pub use throttle::{ThrottleGate, ThrottleProfile};

/// One page of normalized search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub papers: Vec<Paper>,
    /// Whether the upstream reported another page.
    pub has_more: bool,
    /// `offset + limit` of the request that produced this page.
    pub next_offset: usize,
}

/// A source of papers for a single keyword query.
///
/// Implementations know nothing about sessions or keyword lists.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, SearchError>;
}

/// Scripted behavior of one `MockSearchBackend` call.
#[derive(Debug, Clone)]
pub enum MockSearchOutcome {
    Papers(Vec<Paper>),
    /// Return the papers after sleeping.
    Delayed(Duration, Vec<Paper>),
    Fail(SearchError),
    /// Never resolve; only a caller-side timeout ends the call.
    Hang,
}

/// A scripted in-memory search backend for tests.
///
/// Each keyword has a queue of outcomes consumed one per call. An exhausted
/// or missing queue yields an empty page.
#[derive(Default)]
pub struct MockSearchBackend {
    scripts: Mutex<HashMap<String, VecDeque<MockSearchOutcome>>>,
    calls: Mutex<Vec<String>>,
}

impl MockSearchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append outcomes to the script for `keyword`.
    pub fn script(&self, keyword: &str, outcomes: Vec<MockSearchOutcome>) {
        lock(&self.scripts)
            .entry(keyword.to_string())
            .or_default()
            .extend(outcomes);
    }

    /// Shorthand for a keyword that succeeds once with `papers`.
    pub fn respond(&self, keyword: &str, papers: Vec<Paper>) {
        self.script(keyword, vec![MockSearchOutcome::Papers(papers)]);
    }

    /// Number of calls made for `keyword`.
    pub fn attempts(&self, keyword: &str) -> usize {
        lock(&self.calls).iter().filter(|k| *k == keyword).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SearchBackend for MockSearchBackend {
    async fn search(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, SearchError> {
        lock(&self.calls).push(keyword.to_string());
        let next = lock(&self.scripts)
            .get_mut(keyword)
            .and_then(|queue| queue.pop_front());

        let page = |papers: Vec<Paper>| SearchPage {
            papers: papers
                .into_iter()
                .map(|p| {
                    if p.search_keyword.is_empty() {
                        p.with_search_keyword(keyword)
                    } else {
                        p
                    }
                })
                .collect(),
            has_more: false,
            next_offset: offset + limit,
        };

        match next {
            None => Ok(page(Vec::new())),
            Some(MockSearchOutcome::Papers(papers)) => Ok(page(papers)),
            Some(MockSearchOutcome::Delayed(delay, papers)) => {
                tokio::time::sleep(delay).await;
                Ok(page(papers))
            }
            Some(MockSearchOutcome::Fail(err)) => Err(err),
            Some(MockSearchOutcome::Hang) => futures::future::pending().await,
        }
    }
}
