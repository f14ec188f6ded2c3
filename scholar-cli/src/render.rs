//! Terminal rendering of a research session.
//!
//! Consumes `SessionEvent`s as they arrive, folds them into a
//! `SessionState`, and produces styled text: keyword lanes with retry
//! indicators, the dimmed reasoning stream, and the insight with citation
//! markers resolved to paper numbers. The paper list with summaries is
//! rendered once every publisher has finished.
//!
//! Paper numbers are the ones the insight prompt assigned: papers with a
//! real abstract, counted in keyword order. A citation and the results row
//! it points at always carry the same number.

use crossterm::style::Stylize;
use scholar_core::insight::{CitationResolver, InsightEvent, InsightSegment, citation_numbers};
use scholar_core::research::{SessionEvent, SessionState, SummaryState};
use scholar_core::{Language, Paper, PaperId, TranslationOverlay};
use std::collections::HashMap;

/// Titles wrap at this many columns.
pub const TITLE_WIDTH: usize = 60;

/// Wrap a title on word boundaries at [`TITLE_WIDTH`] columns.
pub fn wrap_title(title: &str) -> Vec<String> {
    textwrap::wrap(title, TITLE_WIDTH)
        .into_iter()
        .map(|line| line.into_owned())
        .collect()
}

/// Index of the first byte that must be held back because it may begin a
/// citation tag that has not fully arrived.
fn ready_len(buffer: &str) -> usize {
    if let Some(open) = buffer.rfind("<cite") {
        if !buffer[open..].contains("</cite>") {
            return open;
        }
    }
    if let Some(lt) = buffer.rfind('<') {
        let tail = &buffer[lt..];
        if !tail.contains('>') && ("<cite".starts_with(tail) || "</cite>".starts_with(tail)) {
            return lt;
        }
    }
    buffer.len()
}

pub struct SessionRenderer {
    state: SessionState,
    language: Language,
    max_retries: u32,
    resolver: Option<CitationResolver>,
    numbers: HashMap<PaperId, usize>,
    pending_content: String,
    reasoning_started: bool,
}

impl SessionRenderer {
    pub fn new(question: &str, language: Language) -> Self {
        Self {
            state: SessionState::new(question),
            language,
            max_retries: 2,
            resolver: None,
            numbers: HashMap::new(),
            pending_content: String::new(),
            reasoning_started: false,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Fold one event into the session state and return the text to print.
    pub fn handle(&mut self, event: &SessionEvent) -> String {
        self.state.apply(event);
        match event {
            SessionEvent::KeywordsGenerated { keywords } => {
                format!("{} {}\n", "Keywords:".bold(), keywords.join(" | "))
            }
            SessionEvent::KeywordGenerationFailed { message } => {
                format!("{}\n", format!("Keyword generation failed: {message}").red())
            }
            SessionEvent::KeywordSearching { keyword } => {
                format!("  {}\n", format!("… {keyword} searching").dim())
            }
            SessionEvent::KeywordRetrying { keyword, retry } => format!(
                "  {}\n",
                format!("↻ {keyword} retry {retry}/{}", self.max_retries).yellow()
            ),
            SessionEvent::KeywordSucceeded { keyword, papers } => format!(
                "  {}\n",
                format!("✓ {keyword} ({} new papers)", papers.len()).green()
            ),
            SessionEvent::KeywordFailed { keyword, reason } => {
                format!("  {}\n", format!("✗ {keyword}: {reason}").red())
            }
            SessionEvent::SearchSettled { total } => {
                self.index_papers();
                format!("\n{}\n", format!("{total} unique papers found").bold())
            }
            SessionEvent::Insight(InsightEvent::Reasoning { content }) => {
                let mut out = String::new();
                if !self.reasoning_started {
                    self.reasoning_started = true;
                    out.push_str(&format!("\n{}\n", "Reasoning".dim().bold()));
                }
                out.push_str(&content.as_str().dim().to_string());
                out
            }
            SessionEvent::Insight(InsightEvent::PhaseChange) => {
                format!("\n\n{}\n", "Insight".bold())
            }
            SessionEvent::Insight(InsightEvent::Content { content }) => {
                self.pending_content.push_str(content);
                let ready = ready_len(&self.pending_content);
                let text: String = self.pending_content.drain(..ready).collect();
                self.render_content(&text)
            }
            SessionEvent::InsightFinished => {
                let rest = std::mem::take(&mut self.pending_content);
                format!("{}\n", self.render_content(&rest))
            }
            SessionEvent::InsightFailed { message } => {
                self.pending_content.clear();
                format!("\n{}\n", message.as_str().red())
            }
            SessionEvent::SummaryReady { .. }
            | SessionEvent::ReasoningCollapsed
            | SessionEvent::Completed => String::new(),
        }
    }

    fn render_content(&mut self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        if self.resolver.is_none() {
            self.index_papers();
        }
        let Some(resolver) = &self.resolver else {
            return text.to_string();
        };
        resolver
            .segments(text)
            .into_iter()
            .map(|segment| match segment {
                InsightSegment::Text(t) => t,
                InsightSegment::Citation { label, action } => {
                    let shown = match self.numbers.get(&action.paper_id) {
                        Some(number) => format!("[{number}]"),
                        None => label,
                    };
                    shown.cyan().to_string()
                }
                InsightSegment::CitationError { marker, .. } => marker.red().to_string(),
            })
            .collect()
    }

    /// Build the citation resolver and prompt numbers over the papers in
    /// keyword order.
    fn index_papers(&mut self) {
        let papers = self.state.papers_in_keyword_order();
        self.numbers = citation_numbers(&papers);
        self.resolver = Some(CitationResolver::new(&papers, self.language));
    }

    /// Papers grouped by keyword with titles and summaries shown through
    /// `overlay`. Rows carry the number citations use; papers left out of
    /// the insight prompt are listed unnumbered.
    pub fn render_results(&self, overlay: &TranslationOverlay) -> String {
        let numbers = citation_numbers(&self.state.papers_in_keyword_order());

        let mut out = String::new();
        for (keyword, papers) in self.state.grouped_results() {
            out.push_str(&format!("\n{}\n", keyword.bold()));
            if papers.is_empty() {
                let note = match self.state.status_of(keyword) {
                    Some(scholar_core::KeywordStatus::Failed) => "search failed".red(),
                    _ => "no new papers".dim(),
                };
                out.push_str(&format!("  {note}\n"));
                continue;
            }
            for paper in papers {
                let number = numbers.get(&paper.id).copied();
                out.push_str(&self.render_paper(number, paper, overlay));
            }
        }
        out
    }

    fn render_paper(
        &self,
        number: Option<usize>,
        paper: &Paper,
        overlay: &TranslationOverlay,
    ) -> String {
        let mut out = String::new();
        let prefix = match number {
            Some(number) => format!("[{number}] "),
            None => "- ".to_string(),
        };
        let indent = " ".repeat(prefix.chars().count() + 2);
        for (i, line) in wrap_title(overlay.title(paper)).iter().enumerate() {
            if i == 0 {
                out.push_str(&format!("  {}{}\n", prefix.as_str().cyan(), line));
            } else {
                out.push_str(&format!("{indent}{line}\n"));
            }
        }

        let mut meta = paper.author_line();
        if let Some(year) = paper.year {
            if !meta.is_empty() {
                meta.push_str(", ");
            }
            meta.push_str(&year.to_string());
        }
        if !meta.is_empty() {
            out.push_str(&format!("{indent}{}\n", meta.dim()));
        }

        let summary = match self.state.summary_by_paper_id.get(&paper.id) {
            Some(SummaryState::Ready(text)) => overlay.summary(&paper.id, text).to_string(),
            Some(SummaryState::NoAbstract) => self.language.no_abstract_marker().dim().to_string(),
            Some(SummaryState::Failed(_)) => {
                self.language.summary_failed_marker().red().to_string()
            }
            Some(SummaryState::Pending) | None => "…".dim().to_string(),
        };
        out.push_str(&format!("{indent}{summary}\n"));
        out
    }
}
