//! Semantic Scholar graph API client.
//!
//! Every request passes a throttle gate: keyword searches share the search
//! gate, single-paper lookups the slower lookup gate. HTTP 429 sleeps the
//! gate's backoff, re-passes the gate and tries again with no attempt cap.

use super::throttle::{ThrottleGate, ThrottleProfile};
use super::{SearchBackend, SearchPage};
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::paper::Paper;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const SEARCH_FIELDS: &str =
    "paperId,title,authors,year,abstract,venue,publicationTypes,openAccessPdf,s2FieldsOfStudy";

const PAPER_PAGE_BASE: &str = "https://www.semanticscholar.org/paper";

/// Throttled client for `/paper/search` and `/paper/{id}`.
pub struct SemanticScholarClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    gate: Arc<ThrottleGate>,
    lookup_gate: Arc<ThrottleGate>,
}

impl SemanticScholarClient {
    /// Build a client with its own search-profile gate.
    pub fn new(config: &SearchConfig) -> Result<Self, SearchError> {
        let gate = Arc::new(ThrottleGate::new(ThrottleProfile::search_from_config(
            config,
        )));
        Self::with_gate(config, gate)
    }

    /// Build a client sharing an existing gate, so several clients stay
    /// within one process-wide request budget.
    pub fn with_gate(config: &SearchConfig, gate: Arc<ThrottleGate>) -> Result<Self, SearchError> {
        let client = Client::builder()
            .build()
            .map_err(|e| SearchError::Transport {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            gate,
            lookup_gate: Arc::new(ThrottleGate::new(ThrottleProfile::citation_from_config(
                config,
            ))),
        })
    }

    pub fn gate(&self) -> Arc<ThrottleGate> {
        self.gate.clone()
    }

    /// Gate for single-paper lookups, spaced by the citation profile.
    pub fn lookup_gate(&self) -> Arc<ThrottleGate> {
        self.lookup_gate.clone()
    }

    /// Fetch one paper's details by id through the lookup gate.
    ///
    /// The returned paper is normalized like a search hit, with an empty
    /// search keyword.
    pub async fn paper_details(&self, id: &str) -> Result<Paper, SearchError> {
        let url = format!("{}/paper/{}", self.base_url, id);
        let response = self
            .send_throttled(&self.lookup_gate, || {
                self.client.get(&url).query(&[("fields", SEARCH_FIELDS)])
            })
            .await?;
        debug!(paper_id = %id, "Paper lookup answered");

        let raw: RawPaper = response.json().await.map_err(|e| SearchError::ResponseParse {
            message: e.to_string(),
        })?;
        raw.normalize("").ok_or_else(|| SearchError::ResponseParse {
            message: format!("Paper lookup for {} returned no paper id", id),
        })
    }

    /// Send through `gate`, retrying on HTTP 429 after the gate's backoff.
    /// Any other non-2xx status is an `UpstreamSearchError`.
    async fn send_throttled(
        &self,
        gate: &ThrottleGate,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SearchError> {
        let response = loop {
            gate.acquire().await;
            let mut request = build();
            if let Some(key) = &self.api_key {
                request = request.header("x-api-key", key);
            }
            let response = request.send().await.map_err(|e| SearchError::Transport {
                message: e.to_string(),
            })?;
            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                warn!(
                    backoff_ms = gate.profile().rate_limit_backoff.as_millis() as u64,
                    "Semantic Scholar rate limited; backing off"
                );
                gate.backoff().await;
                continue;
            }
            break response;
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::UpstreamSearchError {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl SearchBackend for SemanticScholarClient {
    async fn search(
        &self,
        keyword: &str,
        limit: usize,
        offset: usize,
    ) -> Result<SearchPage, SearchError> {
        let url = format!("{}/paper/search", self.base_url);
        debug!(keyword = %keyword, offset, limit, "Sending literature search request");
        let response = self
            .send_throttled(&self.gate, || {
                self.client.get(&url).query(&[
                    ("query", keyword.to_string()),
                    ("offset", offset.to_string()),
                    ("limit", limit.to_string()),
                    ("fields", SEARCH_FIELDS.to_string()),
                ])
            })
            .await?;

        let raw: RawSearchResponse =
            response.json().await.map_err(|e| SearchError::ResponseParse {
                message: e.to_string(),
            })?;
        Ok(raw.into_page(keyword, limit, offset))
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSearchResponse {
    #[serde(default)]
    data: Vec<RawPaper>,
    #[serde(default)]
    next: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawPaper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    authors: Vec<RawAuthor>,
    year: Option<i32>,
    venue: Option<String>,
    publication_types: Option<Vec<String>>,
    open_access_pdf: Option<RawPdf>,
    #[serde(rename = "s2FieldsOfStudy")]
    fields_of_study: Option<Vec<RawField>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAuthor {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPdf {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawField {
    category: Option<String>,
}

impl RawSearchResponse {
    fn into_page(self, keyword: &str, limit: usize, offset: usize) -> SearchPage {
        let papers = self
            .data
            .into_iter()
            .filter_map(|raw| raw.normalize(keyword))
            .collect();
        SearchPage {
            papers,
            has_more: self.next.is_some(),
            next_offset: offset + limit,
        }
    }
}

impl RawPaper {
    /// Records without a paper id cannot be deduplicated or cited and are dropped.
    fn normalize(self, keyword: &str) -> Option<Paper> {
        let id = self.paper_id.filter(|id| !id.is_empty())?;
        let non_empty = |s: Option<String>| s.filter(|v| !v.trim().is_empty());

        Some(Paper {
            url: Some(format!("{}/{}", PAPER_PAGE_BASE, id)),
            title: self.title.unwrap_or_default(),
            abstract_text: non_empty(self.abstract_text),
            authors: self.authors.into_iter().filter_map(|a| a.name).collect(),
            year: self.year,
            venue: non_empty(self.venue),
            publication_type: self
                .publication_types
                .and_then(|types| types.into_iter().next()),
            pdf_url: self.open_access_pdf.and_then(|p| non_empty(p.url)),
            keywords: self
                .fields_of_study
                .unwrap_or_default()
                .into_iter()
                .filter_map(|f| f.category)
                .collect(),
            search_keyword: keyword.to_string(),
            id,
        })
    }
}
