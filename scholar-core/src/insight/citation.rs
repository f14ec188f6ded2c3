//! Validation of inline citation markers in model output.
//!
//! The model is asked to cite as `<cite data-paper-id="ID">[n]</cite>`. Its
//! output is untrusted: every marker is checked against the papers the
//! session actually holds before it becomes navigable.

use crate::language::Language;
use crate::paper::{Paper, PaperId};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

/// How long a cited paper row stays highlighted.
pub const HIGHLIGHT_DURATION: Duration = Duration::from_secs(2);

static CITE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<cite\b([^>]*)>(.*?)</cite>").ok());

static PAPER_ID_ATTR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"data-paper-id\s*=\s*(?:"([^"]*)"|'([^']*)')"#).ok());

/// What activating a valid citation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationAction {
    /// Zero-based row of the paper in the aggregate list.
    pub row: usize,
    pub paper_id: PaperId,
    /// Element anchor of the paper row (`paper-{id}`).
    pub anchor: String,
    pub highlight: Duration,
}

/// A piece of rendered insight text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsightSegment {
    Text(String),
    Citation {
        label: String,
        action: CitationAction,
    },
    /// A marker with a missing or unknown paper id.
    CitationError {
        paper_id: Option<String>,
        marker: String,
    },
}

/// Maps paper ids to their rows for one session's paper list.
#[derive(Debug, Clone)]
pub struct CitationResolver {
    rows: HashMap<PaperId, usize>,
    language: Language,
}

impl CitationResolver {
    pub fn new(papers: &[Paper], language: Language) -> Self {
        let mut rows = HashMap::with_capacity(papers.len());
        for (row, paper) in papers.iter().enumerate() {
            rows.entry(paper.id.clone()).or_insert(row);
        }
        Self { rows, language }
    }

    /// Resolve a cited id to its scroll/highlight action.
    pub fn resolve(&self, paper_id: &str) -> Option<CitationAction> {
        let row = *self.rows.get(paper_id)?;
        Some(CitationAction {
            row,
            paper_id: paper_id.to_string(),
            anchor: format!("paper-{}", paper_id),
            highlight: HIGHLIGHT_DURATION,
        })
    }

    /// Split insight text into plain text and validated citation segments.
    pub fn segments(&self, text: &str) -> Vec<InsightSegment> {
        let Some(cite_re) = CITE_RE.as_ref() else {
            return vec![InsightSegment::Text(text.to_string())];
        };

        let mut segments = Vec::new();
        let mut cursor = 0;
        for caps in cite_re.captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > cursor {
                segments.push(InsightSegment::Text(text[cursor..whole.start()].to_string()));
            }
            cursor = whole.end();

            let attrs = caps.get(1).map_or("", |m| m.as_str());
            let label = caps.get(2).map_or("", |m| m.as_str()).trim().to_string();
            let paper_id = extract_paper_id(attrs);

            let segment = match paper_id.as_deref().and_then(|id| self.resolve(id)) {
                Some(action) => InsightSegment::Citation { label, action },
                None => {
                    tracing::warn!(paper_id = ?paper_id, "Citation does not match any paper");
                    InsightSegment::CitationError {
                        paper_id,
                        marker: self.language.citation_error_marker().to_string(),
                    }
                }
            };
            segments.push(segment);
        }
        if cursor < text.len() {
            segments.push(InsightSegment::Text(text[cursor..].to_string()));
        }
        segments
    }
}

fn extract_paper_id(attrs: &str) -> Option<String> {
    let caps = PAPER_ID_ATTR_RE.as_ref()?.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty())
}
