//! The canonical paper record produced by search normalization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upstream placeholders that mean "there is no abstract".
const ABSTRACT_PLACEHOLDERS: &[&str] = &["No abstract provided", "No abstract available"];

/// Opaque upstream paper identifier.
pub type PaperId = String;

/// A normalized paper. Never mutated after normalization; summaries and
/// translations are stored in side maps keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    #[serde(alias = "paperId")]
    pub id: PaperId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    /// First upstream publication type (`JournalArticle`, `Review`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Subject categories.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    /// The search keyword that first produced this paper.
    #[serde(default)]
    pub search_keyword: String,
}

impl Paper {
    /// A bare paper with only the required fields set.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: None,
            authors: Vec::new(),
            year: None,
            venue: None,
            publication_type: None,
            url: None,
            pdf_url: None,
            keywords: BTreeSet::new(),
            search_keyword: String::new(),
        }
    }

    pub fn with_abstract(mut self, text: impl Into<String>) -> Self {
        self.abstract_text = Some(text.into());
        self
    }

    pub fn with_search_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.search_keyword = keyword.into();
        self
    }

    /// The abstract, if it is present, non-blank and not an upstream placeholder.
    pub fn real_abstract(&self) -> Option<&str> {
        self.abstract_text
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty() && !ABSTRACT_PLACEHOLDERS.contains(a))
    }

    pub fn has_real_abstract(&self) -> bool {
        self.real_abstract().is_some()
    }

    /// `Author A, Author B et al.` style byline, at most three names.
    pub fn author_line(&self) -> String {
        match self.authors.len() {
            0 => String::new(),
            1..=3 => self.authors.join(", "),
            _ => format!("{} et al.", self.authors[..3].join(", ")),
        }
    }
}
